//! Operator-facing text menu. Everything here only reads input and calls
//! into the [`Controller`]; no emission logic lives in this module.

use crate::app::{Controller, Simulator, TransportNotice};
use crate::cli::Args;
use crate::error::SessionError;
use crate::group::TransportKind;
use crate::session::{ToggleOutcome, TransportStatus};
use anyhow::{Context, Result};
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionExit {
    Restart,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuItem {
    Toggle(TransportKind),
    Restart,
    Exit,
}

impl MenuItem {
    fn label(&self, controller: &Controller) -> String {
        match self {
            MenuItem::Toggle(kind) => toggle_label(&controller.status(*kind)),
            MenuItem::Restart => "Restart".to_string(),
            MenuItem::Exit => "Exit".to_string(),
        }
    }
}

pub fn toggle_label(status: &TransportStatus) -> String {
    match status.count {
        Some(count) => format!("Toggle {} [Running] (Current: {} tasks)", status.kind, count),
        None => format!("Toggle {} [Stopped]", status.kind),
    }
}

/// Toggle entries appear only for transports that came up at session start.
pub fn menu_items(controller: &Controller) -> Vec<MenuItem> {
    TransportKind::ALL
        .into_iter()
        .filter(|kind| controller.is_enabled(*kind))
        .map(MenuItem::Toggle)
        .chain([MenuItem::Restart, MenuItem::Exit])
        .collect()
}

pub fn parse_task_count(input: &str) -> Result<NonZeroUsize, &'static str> {
    input
        .trim()
        .parse::<NonZeroUsize>()
        .map_err(|_| "please enter a valid number")
}

pub fn parse_choice(input: &str, items: &[MenuItem]) -> Option<MenuItem> {
    let index = input.trim().parse::<usize>().ok()?;
    items.get(index.checked_sub(1)?).copied()
}

/// Rounds to whole seconds, e.g. `1h2m3s`, `4m0s`, `7s`.
pub fn format_session_duration(elapsed: Duration) -> String {
    let total = (elapsed.as_millis() + 500) / 1000;
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

pub fn print_banner(notices: &[TransportNotice]) {
    println!();
    println!("CNC fleet simulator");
    println!("Simulating industrial machine telemetry via HTTP and MQTT");
    println!();
    for notice in notices {
        match &notice.problem {
            None => println!("[ok] {} transport active", notice.kind),
            Some(problem) => println!("[--] {} transport not active: {problem}", notice.kind),
        }
    }
    if notices.iter().all(|notice| !notice.is_active()) {
        println!();
        println!("No active transports. Start the ingest service or MQTT broker and choose Restart.");
    }
    println!();
}

/// Starts the groups requested on the command line.
pub async fn apply_launch_counts(simulator: &mut Simulator, args: &Args) {
    for (kind, count) in [(TransportKind::Http, args.http), (TransportKind::Mqtt, args.mqtt)] {
        let Some(count) = count else { continue };
        if let Err(err) = simulator.controller.start(kind, count).await {
            tracing::error!(kind=%kind, error=%err, "cannot start requested machines");
        }
    }
}

pub async fn run_headless(simulator: &Simulator) -> Result<SessionExit> {
    for kind in TransportKind::ALL {
        let status = simulator.controller.status(kind);
        if let Some(count) = status.count {
            tracing::info!(kind=%kind, count=count.get(), "running");
        }
    }
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    tracing::info!("shutdown signal received");
    Ok(SessionExit::Exit)
}

pub struct Console {
    lines: Lines<BufReader<Stdin>>,
}

impl Console {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    /// `None` on end of input or Ctrl-C.
    async fn read_line(&mut self) -> Result<Option<String>> {
        tokio::select! {
            line = self.lines.next_line() => line.context("failed to read operator input"),
            _ = tokio::signal::ctrl_c() => Ok(None),
        }
    }

    async fn prompt_count(&mut self, kind: TransportKind) -> Result<Option<NonZeroUsize>> {
        loop {
            println!("Enter {kind} task count:");
            let Some(line) = self.read_line().await? else {
                return Ok(None);
            };
            match parse_task_count(&line) {
                Ok(count) => return Ok(Some(count)),
                Err(message) => println!("{message}"),
            }
        }
    }

    pub async fn run(&mut self, simulator: &mut Simulator) -> Result<SessionExit> {
        loop {
            let items = menu_items(&simulator.controller);
            println!("Select Action:");
            for (idx, item) in items.iter().enumerate() {
                println!("  {}) {}", idx + 1, item.label(&simulator.controller));
            }

            let Some(line) = self.read_line().await? else {
                return Ok(SessionExit::Exit);
            };
            let Some(choice) = parse_choice(&line, &items) else {
                println!("unknown choice {:?}", line.trim());
                continue;
            };

            match choice {
                MenuItem::Toggle(kind) => {
                    let console = &mut *self;
                    let outcome = simulator
                        .controller
                        .toggle(kind, move || console.prompt_count(kind))
                        .await;
                    match outcome {
                        Ok(ToggleOutcome::Stopped) => println!("{kind} stopped"),
                        Ok(ToggleOutcome::Started(count)) => println!("{kind} running with {count} tasks"),
                        Ok(ToggleOutcome::Abandoned) => return Ok(SessionExit::Exit),
                        Err(err) => match err.downcast_ref::<SessionError>() {
                            Some(rejected) => println!("{rejected}"),
                            None => return Err(err),
                        },
                    }
                }
                MenuItem::Restart => return Ok(SessionExit::Restart),
                MenuItem::Exit => return Ok(SessionExit::Exit),
            }
        }
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::GroupOptions;
    use crate::session::SessionController;
    use crate::sink::HttpSink;
    use std::sync::Arc;
    use url::Url;

    fn http_only() -> Controller {
        let sink = HttpSink::new(
            reqwest::Client::new(),
            Url::parse("http://127.0.0.1:1/ingest").unwrap(),
        );
        SessionController::new(Some(Arc::new(sink)), None, GroupOptions::default())
    }

    #[test]
    fn count_must_be_positive_integer() {
        assert_eq!(parse_task_count(" 12 \n"), Ok(NonZeroUsize::new(12).unwrap()));
        assert!(parse_task_count("0").is_err());
        assert!(parse_task_count("-3").is_err());
        assert!(parse_task_count("ten").is_err());
        assert!(parse_task_count("").is_err());
    }

    #[test]
    fn menu_hides_disabled_transports() {
        let controller = http_only();
        let items = menu_items(&controller);
        assert_eq!(
            items,
            vec![
                MenuItem::Toggle(TransportKind::Http),
                MenuItem::Restart,
                MenuItem::Exit
            ]
        );
        assert_eq!(items[0].label(&controller), "Toggle HTTP [Stopped]");
    }

    #[test]
    fn choices_are_one_based() {
        let items = [MenuItem::Toggle(TransportKind::Mqtt), MenuItem::Exit];
        assert_eq!(parse_choice("1", &items), Some(MenuItem::Toggle(TransportKind::Mqtt)));
        assert_eq!(parse_choice("2\n", &items), Some(MenuItem::Exit));
        assert_eq!(parse_choice("0", &items), None);
        assert_eq!(parse_choice("3", &items), None);
        assert_eq!(parse_choice("x", &items), None);
    }

    #[tokio::test]
    async fn running_label_shows_count() {
        let mut controller = http_only();
        controller
            .start(TransportKind::Http, NonZeroUsize::new(7).unwrap())
            .await
            .unwrap();
        assert_eq!(
            toggle_label(&controller.status(TransportKind::Http)),
            "Toggle HTTP [Running] (Current: 7 tasks)"
        );
        controller.shutdown_all();
    }

    #[test]
    fn session_duration_rounds_to_seconds() {
        assert_eq!(format_session_duration(Duration::from_millis(400)), "0s");
        assert_eq!(format_session_duration(Duration::from_millis(7_600)), "8s");
        assert_eq!(format_session_duration(Duration::from_secs(240)), "4m0s");
        assert_eq!(format_session_duration(Duration::from_secs(3_723)), "1h2m3s");
    }
}
