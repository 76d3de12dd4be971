use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Protocol {
    #[error("Command message requires a file path")]
    EmptyPath,

    #[error("File path is not valid UTF-8: {0}")]
    NonUtf8Path(String),

    #[error("Missing section marker: {0}")]
    MissingSection(&'static str),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Payload is not valid UTF-8")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}
