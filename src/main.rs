use clap::Parser;
use localserver::{Server, StaticFileHandler, config};
use signal_hook::consts::{SIGINT, SIGQUIT, SIGTERM};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "localserver", version, about = "Multi-listener HTTP/1.1 server")]
struct Args {
    /// Path to the configuration file
    #[arg(default_value = "config/default.conf")]
    config: PathBuf,

    /// Compile the configuration, print it and exit
    #[arg(long)]
    check: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = Args::parse();

    let cfg = match config::parse_config(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Fatal Config Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if args.check {
        print!("{}", cfg);
        return ExitCode::SUCCESS;
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM, SIGQUIT] {
        if let Err(e) = signal_hook::flag::register(signal, Arc::clone(&shutdown)) {
            error!("failed to install signal handler: {}", e);
            return ExitCode::FAILURE;
        }
    }

    let mut server = match Server::new(cfg, StaticFileHandler, shutdown) {
        Ok(s) => s,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = server.bind() {
        error!("{}", e);
        return ExitCode::FAILURE;
    }

    server.run();
    info!("server stopped");
    ExitCode::SUCCESS
}
