use crate::error::Protocol;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub const COMMAND_SECTION: &str = "<:COMMAND:>";
pub const FILEPATH_SECTION: &str = "<:FILEPATH:>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Practice,
    Play,
}

impl CommandKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::Practice => "PRACTICE",
            CommandKind::Play => "PLAY",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandKind {
    type Err = Protocol;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PRACTICE" => Ok(CommandKind::Practice),
            "PLAY" => Ok(CommandKind::Play),
            other => Err(Protocol::UnknownCommand(other.to_string())),
        }
    }
}

/// One command for the peer. The path is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandMessage {
    kind: CommandKind,
    path: String,
}

impl CommandMessage {
    /// # Errors
    ///
    /// Returns [`Protocol::EmptyPath`] when `path` is empty.
    pub fn new(kind: CommandKind, path: impl Into<String>) -> Result<Self, Protocol> {
        let path = path.into();
        if path.is_empty() {
            return Err(Protocol::EmptyPath);
        }
        Ok(Self { kind, path })
    }

    /// Builds the practice command sent for the currently loaded track.
    ///
    /// # Errors
    ///
    /// Fails on an empty or non UTF-8 path.
    pub fn practice(path: &Path) -> Result<Self, Protocol> {
        let path = path
            .to_str()
            .ok_or_else(|| Protocol::NonUtf8Path(path.to_string_lossy().into_owned()))?;
        Self::new(CommandKind::Practice, path)
    }

    /// Parses a payload with any framing already removed.
    ///
    /// # Errors
    ///
    /// Fails when a section marker is missing, the command word is unknown or
    /// the path is empty.
    pub fn parse(payload: &str) -> Result<Self, Protocol> {
        let rest = payload
            .strip_prefix(COMMAND_SECTION)
            .ok_or(Protocol::MissingSection(COMMAND_SECTION))?;
        let (command, path) = rest
            .split_once(FILEPATH_SECTION)
            .ok_or(Protocol::MissingSection(FILEPATH_SECTION))?;
        Self::new(command.parse()?, path)
    }

    #[must_use]
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CommandMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{COMMAND_SECTION}{}{FILEPATH_SECTION}{}",
            self.kind, self.path
        )
    }
}
