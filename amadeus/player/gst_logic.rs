use crate::error::App;
use crate::player::transport::{Engine, Notifier, Transport};
use futures_util::stream::StreamExt;
use gstreamer::prelude::*;
use gstreamer::{
    ClockTime, MessageView, Pipeline, SeekFlags, State, StateChangeError, StateChangeSuccess,
};
use log::{debug, error, info};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::task::{self, JoinHandle};

/// Decodes files with `decodebin` and plays them on `sink`, normally
/// `autoaudiosink`.
#[derive(Debug)]
pub struct GstEngine {
    open_timeout: Duration,
    sink: String,
}

impl GstEngine {
    pub fn new(open_timeout: Duration, sink: impl Into<String>) -> Result<Self, App> {
        gstreamer::init().map_err(|e| App::Init(e.to_string()))?;
        info!("GStreamer initialized successfully.");
        Ok(Self {
            open_timeout,
            sink: sink.into(),
        })
    }
}

/// Waits for the preroll to settle without stalling the other runtime workers.
fn wait_for_state(
    pipeline: &Pipeline,
    timeout: ClockTime,
) -> Result<StateChangeSuccess, StateChangeError> {
    let (result, _, _) = match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => task::block_in_place(|| pipeline.state(timeout)),
        _ => pipeline.state(timeout),
    };
    result
}

/// A prerolled pipeline for one file. Dropping it shuts the pipeline down.
#[derive(Debug)]
pub struct GstSource {
    pipeline: Pipeline,
}

impl Drop for GstSource {
    fn drop(&mut self) {
        if let Err(e) = self.pipeline.set_state(State::Null) {
            error!("Failed to release pipeline: {}", e);
        } else {
            debug!("Released pipeline");
        }
    }
}

impl Engine for GstEngine {
    type Source = GstSource;
    type Transport = GstTransport;

    fn open(&self, path: &Path) -> Result<GstSource, App> {
        let location = path
            .to_str()
            .ok_or_else(|| App::UnsupportedFile(path.display().to_string()))?;
        let pipeline = build_file_pipeline(location, &self.sink)?;
        // Owned from here so every early return shuts it down.
        let source = GstSource { pipeline };

        source
            .pipeline
            .set_state(State::Paused)
            .map_err(|_| App::Decode(format!("Failed to preroll {location}")))?;

        let timeout =
            ClockTime::from_mseconds(u64::try_from(self.open_timeout.as_millis()).unwrap_or(u64::MAX));
        match wait_for_state(&source.pipeline, timeout) {
            Ok(StateChangeSuccess::Success | StateChangeSuccess::NoPreroll) => {
                info!("Decoded {}", location);
                Ok(source)
            }
            Ok(StateChangeSuccess::Async) => Err(App::Decode(format!(
                "Timed out decoding {location}"
            ))),
            Err(_) => Err(App::Decode(format!("Cannot decode {location}"))),
        }
    }

    fn create_transport(&self, notifier: Notifier) -> Result<GstTransport, App> {
        Ok(GstTransport {
            notifier,
            pipeline: None,
            ended: Arc::new(AtomicBool::new(false)),
            bus_listener: None,
        })
    }
}

fn build_file_pipeline(location: &str, sink: &str) -> Result<Pipeline, App> {
    let pipeline = Pipeline::new();
    let make = |factory: &str| {
        gstreamer::ElementFactory::make(factory)
            .build()
            .map_err(|_| App::Element(format!("Failed to create {factory} element")))
    };

    let filesrc = make("filesrc")?;
    filesrc.set_property("location", location);
    let decodebin = make("decodebin")?;
    let audioconvert = make("audioconvert")?;
    let audioresample = make("audioresample")?;
    let audiosink = make(sink)?;

    pipeline
        .add_many([&filesrc, &decodebin, &audioconvert, &audioresample, &audiosink])
        .map_err(|_| App::Pipeline("Failed to add elements to pipeline".to_string()))?;
    filesrc
        .link(&decodebin)
        .map_err(|_| App::Link("Failed to link filesrc to decodebin".to_string()))?;
    gstreamer::Element::link_many([&audioconvert, &audioresample, &audiosink])
        .map_err(|_| App::Link("Failed to link audio output chain".to_string()))?;

    let convert_weak = audioconvert.downgrade();
    decodebin.connect_pad_added(move |_, src_pad| {
        let Some(audioconvert) = convert_weak.upgrade() else {
            error!("Failed to upgrade audioconvert reference");
            return;
        };
        let Some(sink_pad) = audioconvert.static_pad("sink") else {
            error!("audioconvert has no sink pad");
            return;
        };
        if sink_pad.is_linked() {
            debug!("Ignoring extra decoded stream");
            return;
        }
        let is_audio = src_pad
            .current_caps()
            .and_then(|caps| {
                caps.structure(0)
                    .map(|s| s.name().as_str().starts_with("audio/"))
            })
            .unwrap_or(false);
        if !is_audio {
            debug!("Ignoring non-audio stream");
            return;
        }
        match src_pad.link(&sink_pad) {
            Ok(_) => info!("Pipeline elements linked successfully"),
            Err(e) => error!("Failed to link decoded stream: {:?}", e),
        }
    });

    Ok(pipeline)
}

/// Plays the current [`GstSource`] and reports playing changes from its bus.
#[derive(Debug)]
pub struct GstTransport {
    notifier: Notifier,
    pipeline: Option<Pipeline>,
    ended: Arc<AtomicBool>,
    bus_listener: Option<JoinHandle<()>>,
}

impl GstTransport {
    fn pipeline(&self) -> Result<&Pipeline, App> {
        self.pipeline
            .as_ref()
            .ok_or_else(|| App::Transport("No source loaded".to_string()))
    }
}

fn listen_to_bus(
    pipeline: &Pipeline,
    notifier: Notifier,
    ended: Arc<AtomicBool>,
) -> Result<JoinHandle<()>, App> {
    let bus = pipeline
        .bus()
        .ok_or_else(|| App::Pipeline("Failed to get GStreamer bus".to_string()))?;
    let mut messages = bus.stream();
    let pipeline = pipeline.clone();

    Ok(task::spawn(async move {
        let pipeline_object = pipeline.clone().upcast::<gstreamer::Object>();
        while let Some(msg) = messages.next().await {
            match msg.view() {
                MessageView::Eos(_) => {
                    info!("EOS message received, pausing.");
                    ended.store(true, Ordering::SeqCst);
                    if let Err(e) = pipeline.set_state(State::Paused) {
                        error!("Failed to pause after EOS: {}", e);
                    }
                    notifier.notify();
                }
                MessageView::StateChanged(change) => {
                    let touches_playing =
                        change.current() == State::Playing || change.old() == State::Playing;
                    if touches_playing && change.src() == Some(&pipeline_object) {
                        notifier.notify();
                    }
                }
                MessageView::Error(err) => {
                    error!("Error from GStreamer pipeline: {}", err.error());
                    ended.store(true, Ordering::SeqCst);
                    notifier.notify();
                }
                _ => (),
            }
        }
    }))
}

impl Drop for GstTransport {
    fn drop(&mut self) {
        if let Some(listener) = self.bus_listener.take() {
            listener.abort();
        }
    }
}

impl Transport for GstTransport {
    type Source = GstSource;

    fn set_source(&mut self, source: &GstSource) -> Result<(), App> {
        // Fresh flag so a late message from the old bus cannot mark the new source.
        let ended = Arc::new(AtomicBool::new(false));
        let listener = listen_to_bus(&source.pipeline, self.notifier.clone(), Arc::clone(&ended))?;

        // Nothing below can fail, the old source stays usable until here.
        if let Some(old) = self.bus_listener.replace(listener) {
            old.abort();
        }
        self.ended = ended;
        self.pipeline = Some(source.pipeline.clone());
        Ok(())
    }

    fn start(&mut self) -> Result<(), App> {
        if self.ended.load(Ordering::SeqCst) {
            self.set_position(0.0)?;
        }
        self.pipeline()?
            .set_state(State::Playing)
            .map_err(|_| App::State("Failed to set pipeline to Playing".to_string()))?;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), App> {
        self.pipeline()?
            .set_state(State::Paused)
            .map_err(|_| App::State("Failed to set pipeline to Paused".to_string()))?;
        Ok(())
    }

    fn set_position(&mut self, seconds: f64) -> Result<(), App> {
        let target = Duration::try_from_secs_f64(seconds.max(0.0)).unwrap_or_default();
        let target = ClockTime::from_nseconds(u64::try_from(target.as_nanos()).unwrap_or(u64::MAX));
        self.pipeline()?
            .seek_simple(SeekFlags::FLUSH | SeekFlags::KEY_UNIT, target)?;
        self.ended.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn position(&self) -> f64 {
        self.pipeline
            .as_ref()
            .and_then(|p| p.query_position::<ClockTime>())
            .map_or(0.0, |t| Duration::from_nanos(t.nseconds()).as_secs_f64())
    }

    fn length(&self) -> f64 {
        self.pipeline
            .as_ref()
            .and_then(|p| p.query_duration::<ClockTime>())
            .map_or(0.0, |t| Duration::from_nanos(t.nseconds()).as_secs_f64())
    }

    fn is_playing(&self) -> bool {
        !self.ended.load(Ordering::SeqCst)
            && self
                .pipeline
                .as_ref()
                .is_some_and(|p| p.current_state() == State::Playing)
    }
}
