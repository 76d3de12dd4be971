use serde::Serialize;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Starting,
    Playing,
    Stopping,
}

/// Which controls currently accept clicks. Open is always available.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Buttons {
    pub play: bool,
    pub stop: bool,
    pub upload: bool,
}

/// What the control surface shows: transport state, controls and playhead.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub state: PlaybackState,
    pub buttons: Buttons,
    pub track: Option<String>,
    pub position: f64,
    pub length: f64,
    pub playhead: Option<f64>,
}

impl Snapshot {
    #[must_use]
    pub fn playhead(position: f64, length: f64) -> Option<f64> {
        (length > 0.0).then(|| (position / length).clamp(0.0, 1.0))
    }
}
