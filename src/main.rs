use anyhow::Result;
use clap::Parser;
use cnc_fleet_sim::app::Simulator;
use cnc_fleet_sim::cli::Args;
use cnc_fleet_sim::config::Config;
use cnc_fleet_sim::console::{self, Console, SessionExit};
use std::time::Instant;

fn init_tracing() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,cnc_fleet_sim=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing()?;

    let started_at = Instant::now();
    let mut console = Console::new();
    let mut first_session = true;

    loop {
        let config = Config::from_env()?;
        let mut simulator = Simulator::open(&config).await;
        console::print_banner(&simulator.notices);

        if first_session {
            console::apply_launch_counts(&mut simulator, &args).await;
            first_session = false;
        }

        let exit = if args.headless {
            console::run_headless(&simulator).await
        } else {
            console.run(&mut simulator).await
        };
        simulator.close().await;

        match exit? {
            SessionExit::Restart => {
                tracing::info!("restarting session");
                continue;
            }
            SessionExit::Exit => break,
        }
    }

    println!("Shutting down simulator...");
    println!(
        "Session duration: {}",
        console::format_session_duration(started_at.elapsed())
    );
    Ok(())
}
