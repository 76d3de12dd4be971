mod config;
mod dbus;
mod error;
mod player;
mod uploader;

use crate::config::Config;
use crate::error::App;
use crate::player::{Controller, FileFilter, GstEngine, Notifier};
use crate::uploader::CommandSender;
use clap::Parser;
use flexi_logger::{Cleanup, Criterion, Duplicate, FileSpec, Logger, Naming};
use log::{error, info};
use std::path::PathBuf;
use tokio::{
    fs,
    sync::{mpsc, watch},
    task,
};

#[derive(Parser)]
#[command(name = "amadeus", about = "Amadeus practice instrument.", version)]
struct Args {
    #[arg(short = 'c', long = "config", help = "Config file to use instead of ~/.config/amadeus/config.toml")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), App> {
    let args = Args::parse();
    let home_dir = std::env::var("HOME").map_err(|e| {
        App::Io(
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Failed to get HOME environment variable: {e}"),
            )
            .to_string(),
        )
    })?;

    let log_dir = format!("{home_dir}/.config/amadeus/logs");
    fs::create_dir_all(&log_dir).await?;

    let config_path = args
        .config
        .unwrap_or_else(|| PathBuf::from(format!("{home_dir}/.config/amadeus/config.toml")));
    let (config, created) = Config::load_or_create(&config_path).await?;

    // Logger setup
    let _logger = Logger::try_with_str(&config.log_level)?
        .log_to_file(FileSpec::default().directory(&log_dir))
        .rotate(
            Criterion::Size(1_000_000),
            Naming::Timestamps,
            Cleanup::KeepLogFiles(3),
        )
        .duplicate_to_stderr(Duplicate::None)
        .start()?;

    if created {
        info!("Wrote default config to {}", config_path.display());
    }
    info!(
        "Practice commands go to {}:{}",
        config.peer.host, config.peer.port
    );

    let (action_sender, action_receiver) = mpsc::channel(16);
    let (change_sender, change_receiver) = mpsc::unbounded_channel();
    let (stop_sender, stop_receiver) = watch::channel(());

    let controller = Controller::new(
        GstEngine::new(config.player.open_timeout(), config.player.audio_sink.clone())?,
        FileFilter::parse(&config.player.file_patterns),
        CommandSender::new(config.peer.clone()),
        Notifier::new(change_sender),
    );

    task::spawn({
        let stop_sender = stop_sender.clone();
        async move {
            if let Err(e) = dbus::run_dbus_server(action_sender, stop_sender.clone()).await {
                error!("DBus server error: {}", e);
                let _ = stop_sender.send(());
            }
        }
    });

    task::spawn({
        let stop_sender = stop_sender.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted");
                let _ = stop_sender.send(());
            }
        }
    });

    controller
        .run(action_receiver, change_receiver, stop_receiver)
        .await;
    info!("Amadeus stopped");
    Ok(())
}
