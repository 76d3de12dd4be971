mod error;

use clap::{Parser, Subcommand};
use error::App;
use serde::Deserialize;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use zbus::{proxy, Connection};

type StdResult<T> = std::result::Result<T, App>;

const PLAYHEAD_WIDTH: usize = 40;

#[proxy(
    interface = "org.amadeus.Instrument",
    default_service = "org.amadeus.Instrument",
    default_path = "/org/amadeus/Instrument"
)]
trait Instrument {
    async fn test_connection(&self) -> zbus::Result<()>;
    async fn open(&self, path: &str) -> zbus::Result<bool>;
    async fn play(&self) -> zbus::Result<bool>;
    async fn stop(&self) -> zbus::Result<bool>;
    async fn upload(&self) -> zbus::Result<bool>;
    async fn seek(&self, fraction: f64) -> zbus::Result<bool>;
    async fn status(&self) -> zbus::Result<String>;
    async fn quit(&self) -> zbus::Result<()>;
}

#[derive(Parser)]
#[command(
    name = "amc",
    about = "Control the amadeus practice instrument.",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Start amadeus")]
    Start,

    #[command(about = "Load an audio file")]
    Open(OpenCommand),

    #[command(about = "Start playback")]
    Play,

    #[command(about = "Stop playback")]
    Stop,

    #[command(about = "Send the loaded file to the practice peer")]
    Upload,

    #[command(about = "Move the playhead to a fraction of the track")]
    Seek(SeekCommand),

    #[command(about = "Show transport state and controls")]
    Status,

    #[command(about = "Follow the playhead until interrupted")]
    Watch(WatchCommand),

    #[command(about = "Quit amadeus")]
    Quit,
}

#[derive(Parser)]
struct OpenCommand {
    #[arg(help = "Audio file to load")]
    path: PathBuf,
}

#[derive(Parser)]
struct SeekCommand {
    #[arg(help = "Position between 0.0 (start) and 1.0 (end)")]
    fraction: f64,
}

#[derive(Parser)]
struct WatchCommand {
    #[arg(short = 'i', long = "interval-ms", default_value_t = 40, help = "Redraw interval")]
    interval_ms: u64,
}

#[derive(Deserialize, Debug, PartialEq)]
struct Buttons {
    play: bool,
    stop: bool,
    upload: bool,
}

#[derive(Deserialize, Debug, PartialEq)]
struct Status {
    state: String,
    buttons: Buttons,
    track: Option<String>,
    position: f64,
    length: f64,
    playhead: Option<f64>,
}

#[tokio::main]
async fn main() -> StdResult<()> {
    let cli = Cli::parse();
    let connection = Connection::session().await?;
    let proxy = InstrumentProxy::new(&connection).await?;
    handle_command(cli, proxy).await
}

async fn handle_command(cli: Cli, proxy: InstrumentProxy<'_>) -> StdResult<()> {
    if let Commands::Start = cli.command {
        return start_amadeus(&proxy).await;
    }
    if !is_amadeus_running(&proxy).await? {
        eprintln!("amadeus is not running, start it with `amc start`");
        return Ok(());
    }
    match cli.command {
        Commands::Start => Ok(()),
        Commands::Open(open_cmd) => handle_open_command(open_cmd, &proxy).await,
        Commands::Play => report(proxy.play().await?, "Playing", "Play is not available"),
        Commands::Stop => report(proxy.stop().await?, "Stopping", "Stop is not available"),
        Commands::Upload => report(
            proxy.upload().await?,
            "Practice command sent",
            "Upload failed, is a file loaded and the peer listening?",
        ),
        Commands::Seek(seek_cmd) => handle_seek_command(seek_cmd, &proxy).await,
        Commands::Status => {
            let status = fetch_status(&proxy).await?;
            println!("{}", describe(&status));
            Ok(())
        }
        Commands::Watch(watch_cmd) => watch_playhead(watch_cmd, &proxy).await,
        Commands::Quit => {
            proxy.quit().await?;
            println!("amadeus has quit");
            Ok(())
        }
    }
}

#[allow(clippy::unnecessary_wraps)]
fn report(accepted: bool, done: &str, rejected: &str) -> StdResult<()> {
    if accepted {
        println!("{done}");
    } else {
        eprintln!("{rejected}");
    }
    Ok(())
}

async fn handle_open_command(open_cmd: OpenCommand, proxy: &InstrumentProxy<'_>) -> StdResult<()> {
    // amadeus runs in its own working directory.
    let path = std::path::absolute(&open_cmd.path)?;
    let path_str = path
        .to_str()
        .ok_or_else(|| App::InvalidInput(format!("{} is not valid UTF-8", path.display())))?;
    report(
        proxy.open(path_str).await?,
        &format!("Loaded {path_str}"),
        &format!("Could not open {path_str}"),
    )
}

async fn handle_seek_command(seek_cmd: SeekCommand, proxy: &InstrumentProxy<'_>) -> StdResult<()> {
    if !(0.0..=1.0).contains(&seek_cmd.fraction) {
        return Err(App::InvalidInput(format!(
            "seek position {} is outside 0.0..=1.0",
            seek_cmd.fraction
        )));
    }
    report(
        proxy.seek(seek_cmd.fraction).await?,
        "Playhead moved",
        "Nothing to seek in",
    )
}

async fn fetch_status(proxy: &InstrumentProxy<'_>) -> StdResult<Status> {
    let json = proxy.status().await?;
    Ok(serde_json::from_str(&json)?)
}

async fn watch_playhead(watch_cmd: WatchCommand, proxy: &InstrumentProxy<'_>) -> StdResult<()> {
    let mut ticker = tokio::time::interval(Duration::from_millis(watch_cmd.interval_ms.max(1)));
    let mut stdout = std::io::stdout();
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);
    loop {
        tokio::select! {
            _ = &mut interrupted => break,
            _ = ticker.tick() => {
                let Ok(status) = fetch_status(proxy).await else {
                    eprintln!("\namadeus went away");
                    break;
                };
                print!("\r{}", render_playhead(&status, PLAYHEAD_WIDTH));
                stdout.flush()?;
            }
        }
    }
    println!();
    Ok(())
}

fn describe(status: &Status) -> String {
    let mut controls = Vec::new();
    if status.buttons.play {
        controls.push("play");
    }
    if status.buttons.stop {
        controls.push("stop");
    }
    if status.buttons.upload {
        controls.push("upload");
    }
    format!(
        "state: {}\ntrack: {}\nposition: {} / {}\ncontrols: open{}{}",
        status.state,
        status.track.as_deref().unwrap_or("(none)"),
        format_time(status.position),
        format_time(status.length),
        if controls.is_empty() { "" } else { ", " },
        controls.join(", ")
    )
}

fn render_playhead(status: &Status, width: usize) -> String {
    let bar: String = match status.playhead {
        Some(fraction) => {
            let cells = width.saturating_sub(1);
            #[allow(
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss,
                clippy::cast_precision_loss
            )]
            let head = (fraction.clamp(0.0, 1.0) * cells as f64).round() as usize;
            (0..width)
                .map(|i| match i.cmp(&head) {
                    std::cmp::Ordering::Less => '=',
                    std::cmp::Ordering::Equal => '|',
                    std::cmp::Ordering::Greater => '-',
                })
                .collect()
        }
        None => " ".repeat(width),
    };
    format!(
        "[{bar}] {} / {} {}",
        format_time(status.position),
        format_time(status.length),
        status.state
    )
}

fn format_time(seconds: f64) -> String {
    let whole = Duration::try_from_secs_f64(seconds.max(0.0))
        .unwrap_or_default()
        .as_secs();
    format!("{:02}:{:02}", whole / 60, whole % 60)
}

async fn is_amadeus_running(proxy: &InstrumentProxy<'_>) -> StdResult<bool> {
    match proxy.test_connection().await {
        Ok(()) => Ok(true),
        Err(_) => Ok(false),
    }
}

async fn start_amadeus(proxy: &InstrumentProxy<'_>) -> StdResult<()> {
    if is_amadeus_running(proxy).await? {
        println!("amadeus is already running");
        return Ok(());
    }

    let current_exe_path = std::env::current_exe()?;
    let exe_dir = current_exe_path.parent().ok_or_else(|| {
        App::InvalidInput("Failed to get the directory of the executable".to_string())
    })?;
    let amadeus_path = exe_dir.join("amadeus");

    if !amadeus_path.exists() {
        return Err(App::InvalidInput(
            "amadeus executable not found in the same directory".to_string(),
        ));
    }

    let child = Command::new(amadeus_path).spawn().map_err(App::Io)?;
    println!("amadeus started, process ID: {:?}", child.id());
    Ok(())
}
