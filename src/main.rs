use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use log::info;

use street_sim::simulation::{SimConfig, SimWorld};

#[derive(Parser)]
#[command(name = "street_sim")]
#[command(about = "Headless street network and traffic simulation")]
struct Cli {
    /// Number of simulation ticks to run
    #[arg(long, default_value = "1500")]
    ticks: u32,

    /// Time delta per tick in seconds
    #[arg(long, default_value = "0.02")]
    delta: f32,

    /// Vehicles kept driving random routes
    #[arg(long, default_value = "12")]
    vehicles: usize,

    /// Blocks per side of the generated street grid
    #[arg(long, default_value = "2")]
    grid: usize,

    /// Seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Speed limit in km/h
    #[arg(long)]
    max_speed: Option<f32>,

    /// Print the map before and after the run
    #[arg(long)]
    map: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn,street_sim=info")).init();

    let cli = Cli::parse();
    run_headless(&cli)
}

/// Run the simulation in headless mode (no graphics)
fn run_headless(cli: &Cli) -> Result<()> {
    let mut config = SimConfig::default();
    if let Some(max_speed) = cli.max_speed {
        config.vehicle.max_speed_kmh = max_speed;
    }

    info!("Running street simulation in headless mode...");
    info!("Ticks: {}, Delta: {}s", cli.ticks, cli.delta);

    let mut world = match cli.seed {
        Some(seed) => SimWorld::create_test_world_with_seed(config, cli.grid, seed)?,
        None => SimWorld::create_test_world(config, cli.grid)?,
    };
    world.set_demo_population(cli.vehicles);

    if cli.map {
        println!("{}", world.draw_map());
    }

    // Calculate how many ticks equal 1 second of simulation time
    let ticks_per_second = (1.0 / cli.delta).ceil().max(1.0) as u32;

    for tick in 1..=cli.ticks {
        world.tick(cli.delta)?;
        if tick % ticks_per_second == 0 {
            world.log_progress();
        }
    }

    world.check_routes();
    world.log_summary();

    if cli.map {
        println!("{}", world.draw_map());
    }
    Ok(())
}
