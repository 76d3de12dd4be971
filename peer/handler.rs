use amadeus_protocol::{strip_header, CommandKind, CommandMessage, RESPONSE_AOK, RESPONSE_ERR};
use log::{error, info};

/// Largest request read from one connection.
pub const BLOCK_SIZE: usize = 1024;

/// Answers one request block, framed the way the request was.
pub fn handle_request(data: &[u8]) -> Vec<u8> {
    let (framing, payload) = strip_header(data);
    info!(
        "Received request with payload: `{}`",
        String::from_utf8_lossy(payload)
    );
    let response = match parse_request(payload) {
        Some(message) if message.kind() == CommandKind::Practice => {
            info!("practice: {}", message.path());
            RESPONSE_AOK
        }
        Some(message) => {
            error!("Unsupported command: {}", message.kind());
            RESPONSE_ERR
        }
        None => RESPONSE_ERR,
    };
    framing.encode(response)
}

fn parse_request(payload: &[u8]) -> Option<CommandMessage> {
    if payload.is_empty() {
        return None;
    }
    let parsed = std::str::from_utf8(payload)
        .map_err(amadeus_protocol::Protocol::from)
        .and_then(CommandMessage::parse);
    match parsed {
        Ok(message) => Some(message),
        Err(e) => {
            error!("Request can't be parsed correctly: {}", e);
            None
        }
    }
}
