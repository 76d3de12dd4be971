use flexi_logger::FlexiLoggerError;
use glib::BoolError;
use std::io;
use thiserror::Error;
use zbus::Error as ZbusError;

#[derive(Error, Debug, Clone)]
pub enum App {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("GStreamer initialization error: {0}")]
    Init(String),

    #[error("GStreamer element error: {0}")]
    Element(String),

    #[error("GStreamer pipeline error: {0}")]
    Pipeline(String),

    #[error("GStreamer link error: {0}")]
    Link(String),

    #[error("GStreamer state error: {0}")]
    State(String),

    #[error("Unsupported file: {0}")]
    UnsupportedFile(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Connection error: {0}")]
    Connect(String),

    #[error("TOML parsing error: {0}")]
    TomlParsing(String),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(String),

    #[error("Logger initialization error: {0}")]
    Logger(String),

    #[error("ZBus error: {0}")]
    ZBus(String),
}

impl From<io::Error> for App {
    fn from(error: io::Error) -> Self {
        App::Io(error.to_string())
    }
}

impl From<toml::de::Error> for App {
    fn from(error: toml::de::Error) -> Self {
        App::TomlParsing(error.to_string())
    }
}

impl From<toml::ser::Error> for App {
    fn from(error: toml::ser::Error) -> Self {
        App::TomlSerialize(error.to_string())
    }
}

impl From<FlexiLoggerError> for App {
    fn from(error: FlexiLoggerError) -> Self {
        App::Logger(error.to_string())
    }
}

impl From<BoolError> for App {
    fn from(error: BoolError) -> Self {
        App::Pipeline(error.to_string())
    }
}

impl From<ZbusError> for App {
    fn from(error: ZbusError) -> Self {
        App::ZBus(error.to_string())
    }
}
