mod cli;
mod config;
mod event;
mod flash;
mod logging;
mod paths;
mod watcher;

use clap::Parser;
use tracing::{error, info, warn};

use crate::flash::Flasher;

#[tokio::main]
async fn main() {
    let args = cli::Args::parse();

    // ── Configuration ─────────────────────────────────────────────────────────
    let (file, file_error) = match args.config_file() {
        Ok(file) => (file, None),
        Err(e) => (config::ConfigFile::default(), Some(e)),
    };
    let config = match args.resolve(file) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e:#}");
            std::process::exit(1);
        }
    };

    logging::init(config.verbose);
    if let Some(e) = file_error {
        warn!("{e:#} (using defaults)");
    }

    // ── Watch session ─────────────────────────────────────────────────────────
    let session = match watcher::start(&config) {
        Ok(session) => session,
        Err(e) => {
            error!("{e:#}");
            std::process::exit(1);
        }
    };

    println!("Watching for changes to: {}", config.watch_file.display());
    info!("Subscribed to directory {}", session.watch_dir().display());
    match &config.flash_image {
        Some(image) => println!("Flash image: {}", image.display()),
        None => println!("Flash image: <none>"),
    }
    println!("Flash helper: {}", config.helper);
    println!("Press Ctrl+C to stop...");

    let flasher = Flasher::new(&config);

    // Graceful shutdown on Ctrl+C.
    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => println!("\nStopping file watcher..."),
            Err(e) => {
                error!("Failed to listen for Ctrl+C: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    if let Err(e) = session.run(&flasher, shutdown).await {
        error!("{e:#}");
    }
    info!("File watcher stopped");
}
