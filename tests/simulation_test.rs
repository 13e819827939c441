use std::process::{Command, Output};

fn run_simulation(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_street_sim"))
        .args(args)
        .env("RUST_LOG", "warn,street_sim=info")
        .output()
        .expect("Failed to execute simulation")
}

fn logged_count(stderr: &str, label: &str) -> usize {
    let line = stderr
        .lines()
        .find(|line| line.contains(label))
        .unwrap_or_else(|| panic!("Could not find '{}' line", label));

    // Parse the number - handle log format with timestamp
    line.split(label)
        .nth(1)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or_else(|| panic!("Could not parse count from line: {}", line))
}

/// Test that the simulation runs headless without crashing
#[test]
fn test_headless_simulation_runs() {
    let output = run_simulation(&["--ticks", "200", "--seed", "1", "--grid", "1"]);

    assert!(
        output.status.success(),
        "Simulation failed to run. stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("SIMULATION COMPLETE"),
        "Simulation did not complete properly. stderr: {}",
        stderr
    );
}

/// Test that simulation statistics are logged
#[test]
fn test_simulation_statistics_logged() {
    let output = run_simulation(&["--ticks", "200", "--seed", "2", "--vehicles", "4"]);
    assert!(output.status.success(), "Simulation failed to run");

    let stderr = String::from_utf8_lossy(&output.stderr);
    for label in [
        "Total segments:",
        "Total intersections:",
        "Total nodes:",
        "Total arcs:",
        "Total vehicles spawned:",
        "Total vehicles completed:",
        "Active vehicles:",
        "Completion rate:",
    ] {
        assert!(stderr.contains(label), "Missing '{}' statistic", label);
    }

    assert!(logged_count(&stderr, "Total vehicles spawned:") > 0);
    assert!(logged_count(&stderr, "Total arcs:") > 0);
    assert_eq!(logged_count(&stderr, "Unsupported topologies:"), 0);
}

/// Test that the map is printed on request
#[test]
fn test_map_output() {
    let output = run_simulation(&["--ticks", "10", "--grid", "1", "--map"]);
    assert!(output.status.success(), "Simulation failed to run");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Legend:"), "Missing map legend");
}

/// Invalid arguments are rejected before anything runs
#[test]
fn test_invalid_grid_fails() {
    let output = run_simulation(&["--ticks", "10", "--grid", "0"]);
    assert!(!output.status.success());
}
