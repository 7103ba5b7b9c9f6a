//! Rust library for controlling Sony AV receivers over the local network
//!
//! This library provides an async API for finding and controlling Sony AV
//! receivers through their binary control protocol on TCP port 33335. It
//! supports:
//!
//! - Discovery by probing the local /24 network
//! - Power, volume and mute control
//! - Input source and sound field selection
//! - FM tuner channels and presets
//! - Real-time state change subscriptions from device feedback
//!
//! # Quick Start
//!
//! ```no_run
//! use sony_av::{AvReceiver, ReceiverConfig, SoundField};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut receiver = AvReceiver::discover(ReceiverConfig::default()).await?;
//!     println!("Found receiver at {}", receiver.endpoint());
//!
//!     let mut changes = receiver.subscribe();
//!     receiver.set_volume(20).await?;
//!     receiver.select_sound_field(SoundField::MultiStereo).await?;
//!
//!     while let Ok(change) = changes.recv().await {
//!         println!("{}", change.display_text);
//!         break; // Just show one change
//!     }
//!
//!     receiver.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Direct Connection
//!
//! If you know the IP address of the receiver, you can skip discovery:
//!
//! ```no_run
//! use sony_av::{AvReceiver, DeviceEndpoint, ReceiverConfig, Source};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let endpoint = DeviceEndpoint::from_ip("192.168.1.40".parse()?);
//!     let receiver = AvReceiver::connect(endpoint, ReceiverConfig::default());
//!     receiver.select_source(Source::FmTuner).await?;
//!     receiver.fm_tuner_preset_up().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! The library is organized into several layers:
//!
//! - **Discovery**: TCP connect sweep of the local network
//! - **Client**: Wires the layers below to one receiver
//! - **Command**: One short-lived connection per command frame
//! - **Feedback**: Long-lived connection reading device reports, with reconnect
//! - **Decoder**: Turns feedback frames into typed reports
//! - **State**: Canonical device state and change events
//! - **Frames**: Byte-exact protocol tables
//! - **Types**: Domain types and data structures

mod client;
mod command;
mod config;
mod decoder;
mod discovery;
mod error;
mod feedback;
pub mod frames;
mod state;
mod subscription;
mod types;

// Public exports
pub use client::AvReceiver;
pub use command::CommandSender;
pub use config::{ReceiverConfig, DEFAULT_PORT};
pub use decoder::{
    decode_frame, default_decoders, fm_frequency, Feedback, FrameDecoder, SourceStatus,
    TimerReport,
};
pub use discovery::{local_ipv4, Locator};
pub use error::{ReceiverError, Result};
pub use feedback::{FeedbackHandle, FeedbackListener, ListenerState};
pub use frames::{Command, CommandFrame};
pub use state::{PendingChange, Reconciler};
pub use subscription::{ChangeEvent, ChangeKind, ChangeReceiver};
pub use types::{
    DeviceEndpoint, DeviceState, FmTunerState, SoundField, SoundOptimizer, Source, TimerState,
    VolumeLevel, LOW_VOLUME, MAX_VOLUME, MEDIUM_VOLUME, MIN_VOLUME,
};
