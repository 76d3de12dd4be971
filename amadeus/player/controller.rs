use crate::error::App;
use crate::player::state::{Buttons, PlaybackState, Snapshot};
use crate::player::transport::{Engine, FileFilter, Notifier, Transport};
use crate::uploader::CommandSender;
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot, watch};

pub type Reply<T> = oneshot::Sender<T>;

/// Clicks coming from the control surface. Every action answers whether it
/// was accepted.
pub enum Action {
    Open { path: PathBuf, reply: Reply<bool> },
    Play(Reply<bool>),
    Stop(Reply<bool>),
    Upload(Reply<bool>),
    Seek { fraction: f64, reply: Reply<bool> },
    Status(Reply<Snapshot>),
}

struct LoadedTrack<S> {
    path: PathBuf,
    source: S,
}

pub struct Controller<E: Engine> {
    engine: E,
    filter: FileFilter,
    sender: CommandSender,
    notifier: Notifier,
    transport: Option<E::Transport>,
    track: Option<LoadedTrack<E::Source>>,
    state: PlaybackState,
    buttons: Buttons,
}

impl<E: Engine> Controller<E> {
    pub fn new(engine: E, filter: FileFilter, sender: CommandSender, notifier: Notifier) -> Self {
        Self {
            engine,
            filter,
            sender,
            notifier,
            transport: None,
            track: None,
            state: PlaybackState::Stopped,
            buttons: Buttons::default(),
        }
    }

    /// Runs until the stop signal fires or the control surface goes away.
    /// Pending transport changes are applied before the next click.
    pub async fn run(
        mut self,
        mut actions: mpsc::Receiver<Action>,
        mut changes: mpsc::UnboundedReceiver<()>,
        mut stop_receiver: watch::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = stop_receiver.changed() => {
                    info!("Stop signal received, shutting down controller...");
                    break;
                }
                Some(()) = changes.recv() => self.transport_changed(),
                action = actions.recv() => match action {
                    Some(action) => self.handle(action).await,
                    None => {
                        info!("Control surface closed, shutting down controller...");
                        break;
                    }
                },
            }
        }
    }

    pub async fn handle(&mut self, action: Action) {
        // A dropped reply only means the caller stopped waiting.
        match action {
            Action::Open { path, reply } => {
                let _ = reply.send(self.open(&path));
            }
            Action::Play(reply) => {
                let _ = reply.send(self.play_clicked());
            }
            Action::Stop(reply) => {
                let _ = reply.send(self.stop_clicked());
            }
            Action::Upload(reply) => {
                let _ = reply.send(self.upload_clicked().await);
            }
            Action::Seek { fraction, reply } => {
                let _ = reply.send(self.seek(fraction));
            }
            Action::Status(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    pub fn open(&mut self, path: &Path) -> bool {
        match self.load(path) {
            Ok(()) => {
                info!("Loaded {}", path.display());
                true
            }
            Err(e) => {
                warn!("Failed to open {}: {}", path.display(), e);
                self.buttons.play = false;
                self.buttons.upload = false;
                false
            }
        }
    }

    fn load(&mut self, path: &Path) -> Result<(), App> {
        if !self.filter.matches(path) {
            return Err(App::UnsupportedFile(path.display().to_string()));
        }
        let path = std::path::absolute(path)?;
        let source = self.engine.open(&path)?;

        if self.transport.is_none() {
            debug!("Creating transport");
            self.transport = Some(self.engine.create_transport(self.notifier.clone())?);
        }
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| App::Transport("Transport unavailable".to_string()))?;

        let track = LoadedTrack { path, source };
        transport.set_source(&track.source)?;
        // The previous decoder is released here, once.
        self.track = Some(track);

        self.buttons.play = true;
        self.buttons.upload = true;
        self.change_state(PlaybackState::Stopped);
        Ok(())
    }

    pub fn play_clicked(&mut self) -> bool {
        if !self.buttons.play {
            debug!("Play ignored, button disabled");
            return false;
        }
        self.change_state(PlaybackState::Starting);
        true
    }

    pub fn stop_clicked(&mut self) -> bool {
        if !self.buttons.stop {
            debug!("Stop ignored, button disabled");
            return false;
        }
        self.change_state(PlaybackState::Stopping);
        true
    }

    pub async fn upload_clicked(&self) -> bool {
        if !self.buttons.upload {
            debug!("Upload ignored, button disabled");
            return false;
        }
        let Some(track) = &self.track else {
            warn!("Upload requested with no track loaded");
            return false;
        };
        self.sender.send_practice(&track.path).await
    }

    /// Moves the playhead to `fraction` of the track length.
    pub fn seek(&mut self, fraction: f64) -> bool {
        let Some(transport) = self.transport.as_mut() else {
            return false;
        };
        let length = transport.length();
        if length <= 0.0 || !fraction.is_finite() {
            return false;
        }
        match transport.set_position(fraction.clamp(0.0, 1.0) * length) {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to seek: {}", e);
                false
            }
        }
    }

    pub fn transport_changed(&mut self) {
        let Some(transport) = self.transport.as_ref() else {
            return;
        };
        if transport.is_playing() {
            self.change_state(PlaybackState::Playing);
        } else {
            self.change_state(PlaybackState::Stopped);
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let (position, length) = self
            .transport
            .as_ref()
            .map_or((0.0, 0.0), |t| (t.position(), t.length()));
        Snapshot {
            state: self.state,
            buttons: self.buttons,
            track: self.track.as_ref().map(|t| t.path.display().to_string()),
            position,
            length,
            playhead: Snapshot::playhead(position, length),
        }
    }

    fn change_state(&mut self, new_state: PlaybackState) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        if self.state == new_state {
            return;
        }
        debug!("Playback state {:?} -> {:?}", self.state, new_state);
        self.state = new_state;

        match new_state {
            PlaybackState::Stopped => {
                self.buttons.stop = false;
                self.buttons.play = self.track.is_some();
                if let Err(e) = transport.set_position(0.0) {
                    error!("Failed to rewind: {}", e);
                }
            }
            PlaybackState::Starting => {
                self.buttons.play = false;
                if let Err(e) = transport.start() {
                    error!("Failed to start playback: {}", e);
                    self.change_state(PlaybackState::Stopped);
                }
            }
            PlaybackState::Playing => self.buttons.stop = true,
            PlaybackState::Stopping => {
                if let Err(e) = transport.stop() {
                    error!("Failed to stop playback: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
impl<E: Engine> Controller<E> {
    fn state(&self) -> PlaybackState {
        self.state
    }

    fn buttons(&self) -> Buttons {
        self.buttons
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PeerConfig;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[derive(Default, Clone)]
    struct Counters {
        opened: Arc<AtomicUsize>,
        released: Arc<AtomicUsize>,
        transports: Arc<AtomicUsize>,
        starts: Arc<AtomicUsize>,
        stops: Arc<AtomicUsize>,
        rewinds: Arc<AtomicUsize>,
        playing: Arc<AtomicBool>,
        fail_start: Arc<AtomicBool>,
    }

    struct FakeSource {
        length: f64,
        released: Arc<AtomicUsize>,
    }

    impl Drop for FakeSource {
        fn drop(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FakeEngine {
        counters: Counters,
    }

    struct FakeTransport {
        counters: Counters,
        notifier: Notifier,
        position: f64,
        length: f64,
    }

    impl Engine for FakeEngine {
        type Source = FakeSource;
        type Transport = FakeTransport;

        fn open(&self, path: &Path) -> Result<FakeSource, App> {
            if path.to_string_lossy().contains("broken") {
                return Err(App::Decode("no decoder".to_string()));
            }
            self.counters.opened.fetch_add(1, Ordering::SeqCst);
            let length = if path.to_string_lossy().contains("empty") {
                0.0
            } else {
                120.0
            };
            Ok(FakeSource {
                length,
                released: self.counters.released.clone(),
            })
        }

        fn create_transport(&self, notifier: Notifier) -> Result<FakeTransport, App> {
            self.counters.transports.fetch_add(1, Ordering::SeqCst);
            Ok(FakeTransport {
                counters: self.counters.clone(),
                notifier,
                position: 0.0,
                length: 0.0,
            })
        }
    }

    impl Transport for FakeTransport {
        type Source = FakeSource;

        fn set_source(&mut self, source: &FakeSource) -> Result<(), App> {
            self.counters.playing.store(false, Ordering::SeqCst);
            self.length = source.length;
            self.position = 0.0;
            Ok(())
        }

        fn start(&mut self) -> Result<(), App> {
            if self.counters.fail_start.load(Ordering::SeqCst) {
                return Err(App::State("refused".to_string()));
            }
            self.counters.starts.fetch_add(1, Ordering::SeqCst);
            self.counters.playing.store(true, Ordering::SeqCst);
            self.notifier.notify();
            Ok(())
        }

        fn stop(&mut self) -> Result<(), App> {
            self.counters.stops.fetch_add(1, Ordering::SeqCst);
            self.counters.playing.store(false, Ordering::SeqCst);
            self.notifier.notify();
            Ok(())
        }

        fn set_position(&mut self, seconds: f64) -> Result<(), App> {
            if seconds == 0.0 {
                self.counters.rewinds.fetch_add(1, Ordering::SeqCst);
            }
            self.position = seconds;
            Ok(())
        }

        fn position(&self) -> f64 {
            self.position
        }

        fn length(&self) -> f64 {
            self.length
        }

        fn is_playing(&self) -> bool {
            self.counters.playing.load(Ordering::SeqCst)
        }
    }

    fn peer_at(port: u16) -> PeerConfig {
        PeerConfig {
            port,
            connect_timeout_ms: 500,
            ..PeerConfig::default()
        }
    }

    fn controller_with(counters: &Counters, port: u16) -> Controller<FakeEngine> {
        let (tx, _rx) = mpsc::unbounded_channel();
        Controller::new(
            FakeEngine {
                counters: counters.clone(),
            },
            FileFilter::parse("*.wav;*.mp3"),
            CommandSender::new(peer_at(port)),
            Notifier::new(tx),
        )
    }

    fn controller(counters: &Counters) -> Controller<FakeEngine> {
        controller_with(counters, 9)
    }

    #[test]
    fn starts_stopped_with_only_open_available() {
        let controller = controller(&Counters::default());
        assert_eq!(controller.state(), PlaybackState::Stopped);
        assert_eq!(controller.buttons(), Buttons::default());
    }

    #[test]
    fn clicks_without_a_transport_do_nothing() {
        let counters = Counters::default();
        let mut controller = controller(&counters);

        assert!(!controller.play_clicked());
        assert!(!controller.stop_clicked());
        assert!(!controller.seek(0.5));
        controller.transport_changed();

        assert_eq!(controller.state(), PlaybackState::Stopped);
        assert_eq!(counters.transports.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn open_builds_the_transport_lazily_and_enables_controls() {
        let counters = Counters::default();
        let mut controller = controller(&counters);

        assert!(controller.open(Path::new("/tmp/a.wav")));
        assert!(controller.open(Path::new("/tmp/b.mp3")));

        assert_eq!(counters.transports.load(Ordering::SeqCst), 1);
        let buttons = controller.buttons();
        assert!(buttons.play && buttons.upload && !buttons.stop);
        assert_eq!(
            controller.snapshot().track.as_deref(),
            Some("/tmp/b.mp3")
        );
    }

    #[test]
    fn relative_paths_are_made_absolute() {
        let mut controller = controller(&Counters::default());
        assert!(controller.open(Path::new("take.wav")));
        let track = controller.snapshot().track.unwrap();
        assert!(Path::new(&track).is_absolute());
        assert!(track.ends_with("take.wav"));
    }

    #[test]
    fn second_open_releases_the_first_decoder_once() {
        let counters = Counters::default();
        let mut controller = controller(&counters);

        controller.open(Path::new("/tmp/a.wav"));
        assert_eq!(counters.released.load(Ordering::SeqCst), 0);

        controller.open(Path::new("/tmp/b.wav"));
        assert_eq!(counters.released.load(Ordering::SeqCst), 1);

        drop(controller);
        assert_eq!(counters.released.load(Ordering::SeqCst), 2);
        assert_eq!(counters.opened.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failed_open_keeps_state_and_disables_play_and_upload() {
        let counters = Counters::default();
        let mut controller = controller(&counters);
        controller.open(Path::new("/tmp/a.wav"));
        controller.play_clicked();
        controller.transport_changed();
        assert_eq!(controller.state(), PlaybackState::Playing);

        assert!(!controller.open(Path::new("/tmp/broken.wav")));
        assert!(!controller.open(Path::new("/tmp/notes.txt")));

        assert_eq!(controller.state(), PlaybackState::Playing);
        let buttons = controller.buttons();
        assert!(!buttons.play && !buttons.upload);
        assert_eq!(counters.released.load(Ordering::SeqCst), 0);
        assert_eq!(controller.snapshot().track.as_deref(), Some("/tmp/a.wav"));
    }

    #[test]
    fn failed_first_open_never_creates_a_transport() {
        let counters = Counters::default();
        let mut controller = controller(&counters);
        assert!(!controller.open(Path::new("/tmp/broken.wav")));
        assert_eq!(counters.transports.load(Ordering::SeqCst), 0);
        assert!(!controller.play_clicked());
    }

    #[test]
    fn repeated_clicks_never_reenter_the_same_state() {
        let counters = Counters::default();
        let mut controller = controller(&counters);
        controller.open(Path::new("/tmp/a.wav"));

        assert!(controller.play_clicked());
        assert!(!controller.play_clicked());
        assert!(!controller.play_clicked());
        assert_eq!(controller.state(), PlaybackState::Starting);
        assert_eq!(counters.starts.load(Ordering::SeqCst), 1);
        // Stop is only offered once playback is confirmed.
        assert!(!controller.stop_clicked());

        controller.transport_changed();
        controller.transport_changed();
        assert_eq!(controller.state(), PlaybackState::Playing);
        assert!(controller.buttons().stop);

        assert!(controller.stop_clicked());
        assert!(controller.stop_clicked());
        assert_eq!(controller.state(), PlaybackState::Stopping);
        assert_eq!(counters.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn playing_to_stopped_rewinds_once_per_flip() {
        let counters = Counters::default();
        let mut controller = controller(&counters);
        controller.open(Path::new("/tmp/a.wav"));
        let rewinds_after_open = counters.rewinds.load(Ordering::SeqCst);

        for flip in 1..=3 {
            controller.play_clicked();
            controller.transport_changed();
            assert_eq!(controller.state(), PlaybackState::Playing);

            // Track ends on its own.
            counters.playing.store(false, Ordering::SeqCst);
            controller.transport_changed();
            controller.transport_changed();

            assert_eq!(controller.state(), PlaybackState::Stopped);
            assert_eq!(
                counters.rewinds.load(Ordering::SeqCst),
                rewinds_after_open + flip
            );
            let buttons = controller.buttons();
            assert!(buttons.play && !buttons.stop);
        }
    }

    #[test]
    fn open_while_playing_returns_to_stopped() {
        let counters = Counters::default();
        let mut controller = controller(&counters);
        controller.open(Path::new("/tmp/a.wav"));
        controller.play_clicked();
        controller.transport_changed();

        assert!(controller.open(Path::new("/tmp/b.wav")));
        assert_eq!(controller.state(), PlaybackState::Stopped);
        assert!(!controller.buttons().stop);
    }

    #[test]
    fn failed_start_falls_back_to_stopped() {
        let counters = Counters::default();
        let mut controller = controller(&counters);
        controller.open(Path::new("/tmp/a.wav"));
        counters.fail_start.store(true, Ordering::SeqCst);

        assert!(controller.play_clicked());
        assert_eq!(controller.state(), PlaybackState::Stopped);
        assert!(controller.buttons().play);
    }

    #[test]
    fn seek_maps_fraction_onto_track_length() {
        let mut controller = controller(&Counters::default());
        controller.open(Path::new("/tmp/a.wav"));

        assert!(controller.seek(0.25));
        let snapshot = controller.snapshot();
        assert!((snapshot.position - 30.0).abs() < f64::EPSILON);
        assert_eq!(snapshot.playhead, Some(0.25));

        assert!(controller.seek(4.0));
        assert!((controller.snapshot().position - 120.0).abs() < f64::EPSILON);
        assert!(!controller.seek(f64::NAN));
    }

    #[test]
    fn zero_length_track_has_no_playhead_and_ignores_seeks() {
        let counters = Counters::default();
        let mut controller = controller(&counters);
        assert!(controller.open(Path::new("/tmp/empty.wav")));
        let rewinds = counters.rewinds.load(Ordering::SeqCst);

        assert!(!controller.seek(0.5));
        assert!(!controller.seek(0.0));

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.playhead, None);
        assert!(snapshot.length.abs() < f64::EPSILON);
        assert_eq!(counters.rewinds.load(Ordering::SeqCst), rewinds);
    }

    #[tokio::test]
    async fn upload_without_a_track_attempts_no_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let controller = controller_with(&Counters::default(), port);

        assert!(!controller.upload_clicked().await);

        let accepted = tokio::time::timeout(Duration::from_millis(200), listener.accept()).await;
        assert!(accepted.is_err());
    }

    #[tokio::test]
    async fn upload_sends_the_loaded_track() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let reader = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            socket.read_to_end(&mut received).await.unwrap();
            received
        });
        let mut controller = controller_with(&Counters::default(), port);
        controller.open(Path::new("/tmp/a.wav"));

        assert!(controller.upload_clicked().await);
        assert_eq!(
            reader.await.unwrap(),
            b"<:COMMAND:>PRACTICE<:FILEPATH:>/tmp/a.wav"
        );
    }

    #[tokio::test]
    async fn upload_is_rejected_after_a_failed_open() {
        let mut controller = controller(&Counters::default());
        controller.open(Path::new("/tmp/a.wav"));
        controller.open(Path::new("/tmp/broken.wav"));
        assert!(!controller.upload_clicked().await);
    }

    async fn ask<T>(
        actions: &mpsc::Sender<Action>,
        build: impl FnOnce(Reply<T>) -> Action,
    ) -> T {
        let (tx, rx) = oneshot::channel();
        actions.send(build(tx)).await.unwrap();
        rx.await.unwrap()
    }

    #[tokio::test]
    async fn run_loop_follows_transport_notifications() {
        let counters = Counters::default();
        let (action_tx, action_rx) = mpsc::channel(8);
        let (change_tx, change_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(());
        let controller = Controller::new(
            FakeEngine {
                counters: counters.clone(),
            },
            FileFilter::parse("*.wav"),
            CommandSender::new(peer_at(9)),
            Notifier::new(change_tx),
        );
        let running = tokio::spawn(controller.run(action_rx, change_rx, stop_rx));

        let path = PathBuf::from("/tmp/a.wav");
        assert!(ask(&action_tx, |reply| Action::Open { path, reply }).await);
        assert!(ask(&action_tx, Action::Play).await);

        let status = ask(&action_tx, Action::Status).await;
        assert_eq!(status.state, PlaybackState::Playing);
        assert!(status.buttons.stop);

        assert!(ask(&action_tx, Action::Stop).await);
        let status = ask(&action_tx, Action::Status).await;
        assert_eq!(status.state, PlaybackState::Stopped);
        assert_eq!(status.position, 0.0);

        stop_tx.send(()).unwrap();
        running.await.unwrap();
    }

    #[tokio::test]
    async fn run_loop_ends_when_the_surface_closes() {
        let (action_tx, action_rx) = mpsc::channel(1);
        let (change_tx, change_rx) = mpsc::unbounded_channel();
        let (_stop_tx, stop_rx) = watch::channel(());
        let controller = Controller::new(
            FakeEngine {
                counters: Counters::default(),
            },
            FileFilter::parse("*.wav"),
            CommandSender::new(peer_at(9)),
            Notifier::new(change_tx),
        );
        drop(action_tx);
        controller.run(action_rx, change_rx, stop_rx).await;
    }
}
