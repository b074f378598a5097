mod config;
mod control;
mod error;
mod log_entry;
mod poller;
mod push_channel;
mod reconciler;
mod session;
mod status;
mod types;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, LevelFilter};
use session::{LogSession, SessionHandle};
use simple_logger::SimpleLogger;
use std::io::{self, Write};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use types::Snapshot;

const HELP: &str = "Comandos: [r] refrescar  [c] limpiar  [t] probar logs  [p] reconectar SSE  [q] salir";

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let cli = config::Cli::parse();

    let level = cli.log_level.parse().unwrap_or(LevelFilter::Warn);
    SimpleLogger::new()
        .with_level(level)
        .env()
        .init()
        .context("Failed to initialise logger")?;

    info!("Starting job-log-viewer");

    // Load configuration
    let config = config::load_config(&cli)?;
    info!("Configuration loaded successfully: {}", config.base_url);

    let (session, handle) = LogSession::new(&config).context("Failed to create log session")?;
    let session_task = tokio::spawn(session.run());

    println!("{}", HELP);
    let result = run_view(&handle).await;

    // Teardown always runs before exit.
    handle.shutdown().await;
    if let Err(e) = session_task.await {
        log::error!("Log session task terminated unexpectedly: {}", e);
    }

    result
}

/// Renders snapshots and forwards operator commands until asked to quit.
async fn run_view(handle: &SessionHandle) -> Result<()> {
    let mut snapshots = handle.snapshots();
    let mut view = View::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    view.render(&snapshots.borrow_and_update(), &mut std::io::stdout())
        .context("Failed to write to stdout")?;

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    info!("Log session closed");
                    return Ok(());
                }
                view.render(&snapshots.borrow_and_update(), &mut std::io::stdout())
                    .context("Failed to write to stdout")?;
            }
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    return Ok(());
                };
                match Command::parse(line.trim()) {
                    Some(Command::Quit) => return Ok(()),
                    Some(command) => {
                        spawn_command(handle.clone(), command);
                    }
                    None if line.trim().is_empty() => {}
                    None => println!("{}", HELP),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                return Ok(());
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Refresh,
    Clear,
    Test,
    Reconnect,
    Quit,
}

impl Command {
    fn parse(input: &str) -> Option<Self> {
        match input {
            "r" => Some(Command::Refresh),
            "c" => Some(Command::Clear),
            "t" => Some(Command::Test),
            "p" => Some(Command::Reconnect),
            "q" => Some(Command::Quit),
            _ => None,
        }
    }
}

/// Runs a command off the view loop so rendering and Ctrl-C stay live while
/// the backend answers. The task prints its own notification and returns it.
fn spawn_command(handle: SessionHandle, command: Command) -> JoinHandle<Option<String>> {
    tokio::spawn(async move {
        let message = match command {
            Command::Refresh => Some(match handle.refresh().await {
                Ok(added) => format!("Logs refrescados ({} nuevos)", added),
                Err(e) => format!("Error refrescando logs: {}", e),
            }),
            Command::Clear => Some(match handle.clear().await {
                Ok(()) => "Logs limpiados".to_string(),
                Err(e) => format!("Error limpiando logs: {}", e),
            }),
            Command::Test => Some(match handle.test().await {
                Ok(confirmation) => format!("Test enviado: {}", confirmation),
                Err(e) => format!("Error en test: {}", e),
            }),
            Command::Reconnect => handle
                .reconnect()
                .await
                .err()
                .map(|e| format!("Error reconectando: {}", e)),
            Command::Quit => None,
        };

        if let Some(ref message) = message {
            notify(message);
        }
        message
    })
}

fn notify(message: &str) {
    println!("{} * {}", chrono::Local::now().format("%H:%M:%S"), message);
}

const EMPTY_HINT: &str = "No hay logs disponibles. Pulse 't' para generar algunos.";

/// Tracks what has already been printed so only changes reach the terminal.
#[derive(Default)]
struct View {
    printed: usize,
    clear_count: u64,
    status: Option<status::Status>,
    last_error: Option<String>,
    footer: Option<(usize, status::Status)>,
    hinted: bool,
}

impl View {
    fn render<W: Write>(&mut self, snapshot: &Snapshot, out: &mut W) -> io::Result<()> {
        if self.status != Some(snapshot.status) {
            writeln!(out, "-- {} --", snapshot.status)?;
            self.status = Some(snapshot.status);
        }

        if self.last_error != snapshot.last_error {
            if let Some(ref error) = snapshot.last_error {
                writeln!(out, "!! {}", error)?;
            }
            self.last_error = snapshot.last_error.clone();
        }

        if self.clear_count != snapshot.clear_count {
            writeln!(out, "-- logs limpiados --")?;
            self.clear_count = snapshot.clear_count;
            self.printed = 0;
        }

        for entry in snapshot.entries.iter().skip(self.printed) {
            writeln!(out, "{}", entry)?;
        }
        self.printed = snapshot.entries.len();

        if snapshot.entries.is_empty() {
            if !self.hinted {
                writeln!(out, "{}", EMPTY_HINT)?;
                self.hinted = true;
            }
        } else {
            self.hinted = false;
        }

        let footer = (snapshot.entries.len(), snapshot.status);
        if self.footer != Some(footer) {
            writeln!(
                out,
                "Total logs: {} | Método: {}",
                footer.0,
                footer.1.method()
            )?;
            self.footer = Some(footer);
        }

        out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::log_entry::{LogEntry, LogLevel};
    use crate::status::Status;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn snapshot(entries: Vec<LogEntry>, status: Status, clear_count: u64) -> Snapshot {
        Snapshot {
            entries,
            status,
            last_error: None,
            clear_count,
        }
    }

    fn render(view: &mut View, snapshot: &Snapshot) -> String {
        let mut out = Vec::new();
        view.render(snapshot, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn parses_known_commands_only() {
        assert_eq!(Command::parse("r"), Some(Command::Refresh));
        assert_eq!(Command::parse("p"), Some(Command::Reconnect));
        assert_eq!(Command::parse("q"), Some(Command::Quit));
        assert_eq!(Command::parse("x"), None);
        assert_eq!(Command::parse(""), None);
    }

    #[test]
    fn empty_view_shows_hint_and_footer() {
        let mut view = View::default();
        let out = render(&mut view, &Snapshot::default());

        assert!(out.contains("-- Desconectado --"));
        assert!(out.contains(EMPTY_HINT));
        assert!(out.contains("Total logs: 0 | Método: Desconectado"));

        // Nothing changed, nothing printed.
        assert_eq!(render(&mut view, &Snapshot::default()), "");
    }

    #[test]
    fn footer_follows_count_and_transport() {
        let mut view = View::default();
        render(&mut view, &Snapshot::default());

        let entries = vec![
            LogEntry::new(LogLevel::Info, "T1", "M1"),
            LogEntry::new(LogLevel::Error, "T2", "M2"),
        ];
        let out = render(&mut view, &snapshot(entries.clone(), Status::ConnectedPush, 0));
        assert!(out.contains("[INFO] [T1] M1"));
        assert!(out.contains("[ERROR] [T2] M2"));
        assert!(out.contains("Total logs: 2 | Método: Server-Sent Events"));
        assert!(!out.contains(EMPTY_HINT));

        let out = render(&mut view, &snapshot(entries, Status::ConnectedPoll, 0));
        assert!(!out.contains("M1"));
        assert!(out.contains("Total logs: 2 | Método: HTTP Polling"));
    }

    #[test]
    fn hint_returns_after_clear() {
        let mut view = View::default();
        let entries = vec![LogEntry::new(LogLevel::Info, "T1", "M1")];
        render(&mut view, &snapshot(entries, Status::ConnectedPoll, 0));

        let out = render(&mut view, &snapshot(Vec::new(), Status::ConnectedPoll, 1));
        assert!(out.contains("-- logs limpiados --"));
        assert!(out.contains(EMPTY_HINT));
        assert!(out.contains("Total logs: 0 | Método: HTTP Polling"));
    }

    #[tokio::test]
    async fn slow_command_does_not_hold_the_caller() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/cliente/logs/stream"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/cliente/logs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "logs": [] })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/cliente/test"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("ok")
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let config = Config {
            base_url: format!("{}/api/cliente", server.uri()),
            poll_interval_ms: 60_000,
            request_timeout_secs: 5,
        };
        let (session, handle) = LogSession::new(&config).unwrap();
        tokio::spawn(session.run());

        let pending = spawn_command(handle.clone(), Command::Test);
        assert!(!pending.is_finished());

        // The session keeps answering while the test request is in flight.
        let added = timeout(Duration::from_millis(400), handle.refresh())
            .await
            .expect("refresh waited on the test request")
            .unwrap();
        assert_eq!(added, 0);

        let message = timeout(Duration::from_secs(5), pending)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.as_deref(), Some("Test enviado: ok"));

        handle.shutdown().await;
    }
}
