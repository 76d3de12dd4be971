mod handler;

use clap::Parser;
use flexi_logger::{FlexiLoggerError, Logger};
use handler::{handle_request, BLOCK_SIZE};
use log::{debug, error, info};
use std::io;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task;

#[derive(Error, Debug)]
enum Peer {
    #[error("I/O operation failed: {0}")]
    Io(#[from] io::Error),
    #[error("Logger initialization error: {0}")]
    Logger(#[from] FlexiLoggerError),
}

#[derive(Parser)]
#[command(
    name = "amadeus-peer",
    about = "Receive practice commands from amadeus.",
    version
)]
struct Args {
    #[arg(long = "host", default_value = "127.0.0.1", help = "Address to listen on")]
    host: String,
    #[arg(short = 'p', long = "port", default_value_t = 8080, help = "Port to listen on")]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Peer> {
    let args = Args::parse();
    let level = std::env::var("LOGLEVEL").unwrap_or_else(|_| "info".to_string());
    let _logger = Logger::try_with_str(level.to_lowercase())?.start()?;

    let listener = TcpListener::bind((args.host.as_str(), args.port)).await?;
    info!("Listening on {}:{}", args.host, args.port);

    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);
    loop {
        tokio::select! {
            _ = &mut interrupted => {
                info!("Interrupted, shutting down peer...");
                return Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok((socket, addr)) => {
                    info!("Connected by {}", addr);
                    task::spawn(serve(socket));
                }
                Err(e) => error!("Accept failed: {}", e),
            }
        }
    }
}

async fn serve(mut socket: TcpStream) {
    let mut block = vec![0; BLOCK_SIZE];
    let read = match socket.read(&mut block).await {
        Ok(read) => read,
        Err(e) => {
            error!("Read failed: {}", e);
            return;
        }
    };
    let response = handle_request(&block[..read]);
    // Senders usually hang up right after writing.
    if let Err(e) = socket.write_all(&response).await {
        debug!("Reply not delivered: {}", e);
    }
}
