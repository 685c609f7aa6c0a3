use std::io::{Stdout, stdout};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use crossterm::event;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use tokio::sync::mpsc;
use tracing::error;
use tracing_subscriber::EnvFilter;

use floodwatch::api::ApiClient;
use floodwatch::auth::SessionStore;
use floodwatch::config::Config;
use floodwatch::ui::{self, App};

#[derive(Debug, Parser)]
#[command(name = "floodwatch", about = "Terminal dashboard for the flood-monitoring backend")]
struct Cli {
    /// Backend base URL.
    #[arg(long, env = "FLOODWATCH_API_BASE", default_value = "http://127.0.0.1:8000")]
    server: String,

    /// Append logs to this file. The terminal is owned by the UI, so
    /// nothing is ever logged to stdout.
    #[arg(long, env = "FLOODWATCH_LOG_FILE")]
    log_file: Option<PathBuf>,
}

/// Raw-mode guard. Restores the terminal on every exit path, including
/// panics unwinding through main.
struct TerminalGuard {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl TerminalGuard {
    fn enter() -> anyhow::Result<Self> {
        enable_raw_mode().context("failed to enable raw mode")?;
        let mut out = stdout();
        crossterm::execute!(out, EnterAlternateScreen)
            .context("failed to enter alternate screen")?;
        let terminal = Terminal::new(CrosstermBackend::new(out))
            .context("failed to initialize terminal")?;
        Ok(Self { terminal })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = crossterm::execute!(self.terminal.backend_mut(), LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}

fn init_logging(log_file: Option<&PathBuf>) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(path) = log_file else {
        return Ok(None);
    };
    let directory = path.parent().filter(|p| !p.as_os_str().is_empty());
    let file_name = path
        .file_name()
        .context("log file path has no file name")?;
    let appender = tracing_appender::rolling::never(
        directory.unwrap_or_else(|| std::path::Path::new(".")),
        file_name,
    );
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(Some(guard))
}

/// Blocking key reader on its own thread. Polls so the thread notices the
/// receiver going away and exits instead of holding stdin forever.
fn spawn_input_reader(tx: mpsc::UnboundedSender<event::Event>) {
    std::thread::spawn(move || {
        loop {
            match event::poll(Duration::from_millis(250)) {
                Ok(true) => match event::read() {
                    Ok(ev) => {
                        if tx.send(ev).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                },
                Ok(false) => {
                    if tx.is_closed() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.log_file.as_ref())?;

    let config = Config::new(&cli.server);
    let endpoints = config.endpoints()?;
    let store = SessionStore::new();
    let api = ApiClient::new(&config, store.clone())?;

    let (channel_tx, channel_rx) = mpsc::unbounded_channel();
    let (fetch_tx, fetch_rx) = mpsc::unbounded_channel();
    let (input_tx, input_rx) = mpsc::unbounded_channel();
    spawn_input_reader(input_tx);

    let app = App::new(api, store, endpoints, channel_tx, fetch_tx);

    let mut guard = TerminalGuard::enter()?;
    let result = ui::run(&mut guard.terminal, app, channel_rx, fetch_rx, input_rx).await;
    drop(guard);

    if let Err(err) = &result {
        error!(target: "main", error = %err, "exited with error");
    }
    result
}
