use clap::Parser;
use std::num::NonZeroUsize;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "cnc-fleet-sim",
    version,
    about = "Simulate a fleet of CNC machines streaming telemetry over HTTP and MQTT"
)]
pub struct Args {
    /// Start this many HTTP machines as soon as the session is up.
    #[arg(long)]
    pub http: Option<NonZeroUsize>,
    /// Start this many MQTT machines as soon as the session is up.
    #[arg(long)]
    pub mqtt: Option<NonZeroUsize>,
    /// Skip the operator menu and run until Ctrl-C.
    #[arg(long, default_value_t = false)]
    pub headless: bool,
}
