use crate::error::{ReceiverError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

/// Which part of the device state changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    PowerChanged,
    VolumeChanged,
    MutedChanged,
    SourceChanged,
    SoundFieldChanged,
    PureDirectChanged,
    SoundOptimizerChanged,
    TimerChanged,
    FmTunerChanged,
}

/// A state change, ready for display by a UI or notification layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,

    /// New value of the field, e.g. `true`, `20`, `"bdDvd"` or an object
    pub value: Value,

    /// Text for a notification or status line
    pub display_text: String,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, value: impl Into<Value>, display_text: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
            display_text: display_text.into(),
        }
    }
}

/// Receiver for state change events
pub struct ChangeReceiver {
    rx: broadcast::Receiver<ChangeEvent>,
}

impl ChangeReceiver {
    pub(crate) fn new(rx: broadcast::Receiver<ChangeEvent>) -> Self {
        Self { rx }
    }

    /// Receive the next change event
    ///
    /// Fails with `ConnectionClosed` once the receiver has been dropped.
    pub async fn recv(&mut self) -> Result<ChangeEvent> {
        self.rx.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => ReceiverError::ConnectionClosed,
            broadcast::error::RecvError::Lagged(n) => {
                ReceiverError::ChannelError(format!("Lagged by {} messages", n))
            }
        })
    }

    /// Try to receive a change event without blocking
    ///
    /// Returns `None` if no event is available.
    pub fn try_recv(&mut self) -> Result<Option<ChangeEvent>> {
        match self.rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Closed) => Err(ReceiverError::ConnectionClosed),
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                Err(ReceiverError::ChannelError(format!("Lagged by {} messages", n)))
            }
        }
    }
}
