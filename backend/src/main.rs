use alva_backend::config::HostConfig;
use alva_backend::server;
use clap::Parser;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Alva host process.
#[derive(Debug, Parser)]
#[command(name = "alva-host", version)]
struct Cli {
    /// Address to listen on
    #[arg(long)]
    host: Option<String>,
    /// Port to listen on, 0 for any free port
    #[arg(long)]
    port: Option<u16>,
    /// Token the UI must present
    #[arg(long)]
    token: Option<String>,
    /// Reopen the last project when the UI reloads
    #[arg(long)]
    dev: bool,
    /// Command that builds the script bundle
    #[arg(long)]
    build_command: Option<String>,
    /// Connection store file
    #[arg(long)]
    store: Option<PathBuf>,
}

impl Cli {
    fn apply(self, cfg: &mut HostConfig) {
        if let Some(host) = self.host {
            cfg.host = host;
        }
        if let Some(port) = self.port {
            cfg.port = port;
        }
        if self.token.is_some() {
            cfg.token = self.token;
        }
        cfg.dev_mode |= self.dev;
        if self.build_command.is_some() {
            cfg.build_command = self.build_command;
        }
        if self.store.is_some() {
            cfg.store_path = self.store;
        }
    }
}

/// Console output plus a daily log file in the user data directory.
fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("alva_backend=info,alva_core=info"));
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer());
    match dirs::data_local_dir() {
        Some(dir) => {
            let logs = dir.join("alva").join("logs");
            let appender = tracing_appender::rolling::daily(logs, "alva-host.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            registry.init();
            None
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let _guard = init_tracing();
    let mut cfg = HostConfig::from_env();
    Cli::parse().apply(&mut cfg);
    server::run(cfg).await
}
