use std::path::PathBuf;

use log::info;
use tokio::sync::{mpsc, oneshot, watch};
use zbus::{fdo, interface, ConnectionBuilder};

use crate::error::App;
use crate::player::controller::Reply;
use crate::player::Action;

/// Control surface of the instrument: one method per button plus the
/// waveform overlay's seek and a status query.
#[derive(Clone)]
pub struct InstrumentDBus {
    tx: mpsc::Sender<Action>,
    stop_signal: watch::Sender<()>,
}

impl InstrumentDBus {
    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Action) -> fdo::Result<T> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|e| fdo::Error::Failed(e.to_string()))?;
        response
            .await
            .map_err(|e| fdo::Error::Failed(e.to_string()))
    }
}

#[interface(name = "org.amadeus.Instrument")]
impl InstrumentDBus {
    async fn test_connection(&self) -> fdo::Result<()> {
        Ok(())
    }

    async fn open(&self, path: String) -> fdo::Result<bool> {
        let path = PathBuf::from(path);
        self.request(|reply| Action::Open { path, reply }).await
    }

    async fn play(&self) -> fdo::Result<bool> {
        self.request(Action::Play).await
    }

    async fn stop(&self) -> fdo::Result<bool> {
        self.request(Action::Stop).await
    }

    async fn upload(&self) -> fdo::Result<bool> {
        self.request(Action::Upload).await
    }

    async fn seek(&self, fraction: f64) -> fdo::Result<bool> {
        self.request(|reply| Action::Seek { fraction, reply }).await
    }

    async fn status(&self) -> fdo::Result<String> {
        let snapshot = self.request(Action::Status).await?;
        serde_json::to_string(&snapshot).map_err(|e| fdo::Error::Failed(e.to_string()))
    }

    async fn quit(&self) -> fdo::Result<()> {
        self.stop_signal
            .send(())
            .map_err(|e| fdo::Error::Failed(e.to_string()))
    }
}

pub async fn run_dbus_server(
    action_sender: mpsc::Sender<Action>,
    stop_signal: watch::Sender<()>,
) -> Result<(), App> {
    let instrument_dbus = InstrumentDBus {
        tx: action_sender,
        stop_signal: stop_signal.clone(),
    };

    let _connection = ConnectionBuilder::session()?
        .name("org.amadeus.Instrument")?
        .serve_at("/org/amadeus/Instrument", instrument_dbus)?
        .build()
        .await?;

    let mut stop_receiver = stop_signal.subscribe();

    // Wait for the stop signal
    tokio::select! {
        _ = stop_receiver.changed() => {
            info!("Stop signal received, shutting down DBus server...");
        }
    }

    Ok(())
}
