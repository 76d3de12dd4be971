use crate::error::App;
use log::error;
use std::path::Path;
use tokio::sync::mpsc;

/// Opens files and builds the transport that plays them.
pub trait Engine {
    /// Decoder handle for one file. Dropping it releases the decoder.
    type Source;
    type Transport: Transport<Source = Self::Source>;

    fn open(&self, path: &Path) -> Result<Self::Source, App>;

    fn create_transport(&self, notifier: Notifier) -> Result<Self::Transport, App>;
}

/// Playback cursor over the current source.
///
/// Implementations report every change of [`Transport::is_playing`] through
/// the [`Notifier`] they were created with.
pub trait Transport {
    type Source;

    /// Replaces the current source, stopping playback of the old one.
    fn set_source(&mut self, source: &Self::Source) -> Result<(), App>;

    fn start(&mut self) -> Result<(), App>;

    fn stop(&mut self) -> Result<(), App>;

    fn set_position(&mut self, seconds: f64) -> Result<(), App>;

    fn position(&self) -> f64;

    fn length(&self) -> f64;

    fn is_playing(&self) -> bool;
}

/// Tells the controller that the transport changed.
#[derive(Clone, Debug)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<()>,
}

impl Notifier {
    #[must_use]
    pub fn new(tx: mpsc::UnboundedSender<()>) -> Self {
        Self { tx }
    }

    pub fn notify(&self) {
        if self.tx.send(()).is_err() {
            error!("Transport change dropped, controller is gone");
        }
    }
}

/// Wildcard filter of the open dialog, e.g. `*.wav;*.mp3`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFilter {
    extensions: Vec<String>,
    any: bool,
}

impl FileFilter {
    #[must_use]
    pub fn parse(patterns: &str) -> Self {
        let mut any = false;
        let mut extensions = Vec::new();
        for pattern in patterns.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            match pattern.strip_prefix("*.") {
                Some("*") => any = true,
                Some(ext) => extensions.push(ext.to_ascii_lowercase()),
                None if pattern == "*" => any = true,
                None => {}
            }
        }
        Self { extensions, any }
    }

    #[must_use]
    pub fn matches(&self, path: &Path) -> bool {
        if self.any {
            return true;
        }
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                self.extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(ext))
            })
    }
}
