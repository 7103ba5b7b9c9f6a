use crate::command::CommandSender;
use crate::config::ReceiverConfig;
use crate::discovery::Locator;
use crate::error::Result;
use crate::feedback::{FeedbackHandle, FeedbackListener, ListenerState};
use crate::frames::Command;
use crate::state::Reconciler;
use crate::subscription::ChangeReceiver;
use crate::types::{DeviceEndpoint, DeviceState, SoundField, Source, VolumeLevel};
use std::sync::Arc;
use tokio::sync::watch;

/// Client for a Sony AV receiver
///
/// Owns the shared device state, the command sender and the feedback
/// listener. Change notifications start once the listener is running.
pub struct AvReceiver {
    config: ReceiverConfig,
    reconciler: Arc<Reconciler>,
    commands: CommandSender,
    feedback: FeedbackHandle,
}

impl AvReceiver {
    /// Find the receiver on the local network and connect to it
    ///
    /// # Example
    ///
    /// ```no_run
    /// use sony_av::{AvReceiver, ReceiverConfig, Source};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let mut receiver = AvReceiver::discover(ReceiverConfig::default()).await?;
    ///     receiver.select_source(Source::Tv).await?;
    ///     receiver.shutdown().await;
    ///     Ok(())
    /// }
    /// ```
    pub async fn discover(config: ReceiverConfig) -> Result<Self> {
        let endpoint = Locator::new(&config).locate().await?;
        Ok(Self::connect(endpoint, config))
    }

    /// Connect to a receiver at a known address
    ///
    /// The feedback connection is opened in the background and retried until
    /// [`shutdown`](Self::shutdown), so this never fails.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use sony_av::{AvReceiver, DeviceEndpoint, ReceiverConfig};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let endpoint = DeviceEndpoint::from_ip("192.168.1.40".parse()?);
    ///     let receiver = AvReceiver::connect(endpoint, ReceiverConfig::default());
    ///     let mut changes = receiver.subscribe();
    ///
    ///     while let Ok(change) = changes.recv().await {
    ///         println!("{}", change.display_text);
    ///     }
    ///     Ok(())
    /// }
    /// ```
    pub fn connect(endpoint: DeviceEndpoint, config: ReceiverConfig) -> Self {
        let reconciler = Arc::new(Reconciler::new(config.event_capacity));
        let commands = CommandSender::new(endpoint, reconciler.clone(), config.volume_step);
        let feedback = FeedbackListener::new(endpoint, reconciler.clone(), &config).spawn();
        reconciler.set_initialized(true);

        tracing::info!(addr = %endpoint, "Connected to receiver");

        Self {
            config,
            reconciler,
            commands,
            feedback,
        }
    }

    pub fn endpoint(&self) -> DeviceEndpoint {
        self.commands.endpoint()
    }

    /// Snapshot of the current device state
    pub fn state(&self) -> DeviceState {
        self.reconciler.snapshot()
    }

    /// Subscribe to state changes
    ///
    /// Multiple subscriptions can be active simultaneously.
    pub fn subscribe(&self) -> ChangeReceiver {
        self.reconciler.subscribe()
    }

    pub fn listener_state(&self) -> ListenerState {
        self.feedback.state()
    }

    pub fn watch_listener_state(&self) -> watch::Receiver<ListenerState> {
        self.feedback.watch_state()
    }

    /// A cloneable sender sharing this receiver's state
    pub fn commands(&self) -> CommandSender {
        self.commands.clone()
    }

    /// Send a raw command without touching the local state
    pub async fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).await
    }

    pub async fn toggle_power(&self) -> Result<()> {
        self.commands.toggle_power().await
    }

    pub async fn set_volume(&self, level: VolumeLevel) -> Result<()> {
        self.commands.set_volume(level).await
    }

    pub async fn volume_up(&self) -> Result<()> {
        self.commands.volume_up().await
    }

    pub async fn volume_down(&self) -> Result<()> {
        self.commands.volume_down().await
    }

    pub async fn volume_min(&self) -> Result<()> {
        self.commands.volume_min().await
    }

    pub async fn volume_max(&self) -> Result<()> {
        self.commands.volume_max().await
    }

    pub async fn mute(&self) -> Result<()> {
        self.commands.mute().await
    }

    pub async fn unmute(&self) -> Result<()> {
        self.commands.unmute().await
    }

    pub async fn toggle_mute(&self) -> Result<()> {
        self.commands.toggle_mute().await
    }

    pub async fn select_source(&self, source: Source) -> Result<()> {
        self.commands.select_source(source).await
    }

    pub async fn select_sound_field(&self, field: SoundField) -> Result<()> {
        self.commands.select_sound_field(field).await
    }

    pub async fn select_fm_channel(&self, index: usize) -> Result<()> {
        self.commands.select_fm_channel(index).await
    }

    pub async fn fm_tuner_preset_up(&self) -> Result<()> {
        self.commands.fm_tuner_preset_up().await
    }

    pub async fn fm_tuner_preset_down(&self) -> Result<()> {
        self.commands.fm_tuner_preset_down().await
    }

    /// Stop notifications and close the feedback connection
    pub async fn shutdown(&mut self) {
        self.reconciler.set_initialized(false);
        self.feedback.shutdown(self.config.shutdown_timeout).await;
        tracing::info!(addr = %self.endpoint(), "Receiver client shut down");
    }
}
