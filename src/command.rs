use crate::error::{ReceiverError, Result};
use crate::frames::{Command, CommandFrame};
use crate::state::{PendingChange, Reconciler};
use crate::types::{DeviceEndpoint, SoundField, Source, VolumeLevel, MAX_VOLUME, MIN_VOLUME};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

/// Sends command frames to the receiver
///
/// Every command uses its own short-lived connection, so concurrent callers
/// never share a socket. Failed sends are reported and never retried.
#[derive(Clone)]
pub struct CommandSender {
    endpoint: DeviceEndpoint,
    reconciler: Arc<Reconciler>,
    volume_step: u8,
}

impl CommandSender {
    pub fn new(endpoint: DeviceEndpoint, reconciler: Arc<Reconciler>, volume_step: u8) -> Self {
        Self {
            endpoint,
            reconciler,
            volume_step,
        }
    }

    pub fn endpoint(&self) -> DeviceEndpoint {
        self.endpoint
    }

    /// Encode and send a single command
    pub async fn send(&self, command: Command) -> Result<()> {
        let frame = command.frame()?;
        self.send_frame(&frame).await
    }

    /// Write a frame on a fresh connection and close it
    pub async fn send_frame(&self, frame: &CommandFrame) -> Result<()> {
        let addr = self.endpoint.to_string();
        let send_failed = |source| ReceiverError::SendFailed {
            addr: addr.clone(),
            source,
        };

        let mut stream = TcpStream::connect(self.endpoint.socket_addr())
            .await
            .map_err(send_failed)?;
        stream.write_all(frame.as_bytes()).await.map_err(send_failed)?;
        stream.shutdown().await.map_err(send_failed)?;

        tracing::debug!(addr = %addr, frame = %frame, "Sent command");
        Ok(())
    }

    // ========== Power ==========

    /// Switch the device off if it is on, on otherwise
    ///
    /// State follows the device's feedback, not this call.
    pub async fn toggle_power(&self) -> Result<()> {
        if self.reconciler.snapshot().power {
            self.send(Command::PowerOff).await
        } else {
            self.send(Command::PowerOn).await
        }
    }

    // ========== Volume ==========

    /// Set the volume; the caller keeps `level` within range
    pub async fn set_volume(&self, level: VolumeLevel) -> Result<()> {
        self.send(Command::SetVolume(level)).await?;
        self.reconciler.update_volume(level);
        Ok(())
    }

    /// Raise the volume by one step unless that would exceed the maximum
    pub async fn volume_up(&self) -> Result<()> {
        let current = self.reconciler.snapshot().volume;
        match current.checked_add(self.volume_step) {
            Some(target) if target <= MAX_VOLUME => self.set_volume(target).await,
            _ => Ok(()),
        }
    }

    /// Lower the volume by one step unless that would go below the minimum
    pub async fn volume_down(&self) -> Result<()> {
        let current = self.reconciler.snapshot().volume;
        match current.checked_sub(self.volume_step) {
            Some(target) if target >= MIN_VOLUME => self.set_volume(target).await,
            _ => Ok(()),
        }
    }

    pub async fn volume_min(&self) -> Result<()> {
        self.send(Command::MinVolume).await
    }

    pub async fn volume_max(&self) -> Result<()> {
        self.send(Command::MaxVolume).await
    }

    // ========== Mute ==========

    pub async fn mute(&self) -> Result<()> {
        if !self.reconciler.is_initialized() {
            return Ok(());
        }
        self.send(Command::Mute).await?;
        self.reconciler.update_muted(true);
        Ok(())
    }

    pub async fn unmute(&self) -> Result<()> {
        if !self.reconciler.is_initialized() {
            return Ok(());
        }
        self.send(Command::Unmute).await?;
        self.reconciler.update_muted(false);
        Ok(())
    }

    /// Mute or unmute, switching the device on first if needed
    pub async fn toggle_mute(&self) -> Result<()> {
        if !self.reconciler.snapshot().power {
            self.toggle_power().await?;
        }
        if self.reconciler.snapshot().muted {
            self.unmute().await
        } else {
            self.mute().await
        }
    }

    // ========== Source / Sound field ==========

    /// Select an input source; re-selecting the active source does nothing
    ///
    /// Change events follow once the frame is sent. A failed send restores
    /// the previous source so the call can be retried.
    pub async fn select_source(&self, source: Source) -> Result<()> {
        let Some(change) = self.reconciler.claim_source(source) else {
            return Ok(());
        };
        self.send_claimed(change, Command::SelectSource(source)).await
    }

    /// Select a sound field; re-selecting the active field does nothing
    pub async fn select_sound_field(&self, field: SoundField) -> Result<()> {
        let Some(change) = self.reconciler.claim_sound_field(field) else {
            return Ok(());
        };
        self.send_claimed(change, Command::SelectSoundField(field)).await
    }

    async fn send_claimed(&self, change: PendingChange, command: Command) -> Result<()> {
        match self.send(command).await {
            Ok(()) => {
                self.reconciler.commit(change);
                Ok(())
            }
            Err(e) => {
                self.reconciler.revert(change);
                Err(e)
            }
        }
    }

    // ========== FM tuner ==========

    /// Select FM channel `index` (0..=2)
    pub async fn select_fm_channel(&self, index: usize) -> Result<()> {
        self.send(Command::FmChannel(index)).await
    }

    pub async fn fm_tuner_preset_up(&self) -> Result<()> {
        self.fm_tuner_preset_step(Command::FmPresetUp).await
    }

    pub async fn fm_tuner_preset_down(&self) -> Result<()> {
        self.fm_tuner_preset_step(Command::FmPresetDown).await
    }

    /// Switch to the FM tuner if another source is active, then step the preset
    async fn fm_tuner_preset_step(&self, step: Command) -> Result<()> {
        if !self.reconciler.is_initialized() {
            return Ok(());
        }
        if self.reconciler.snapshot().source != Some(Source::FmTuner) {
            self.send(Command::SelectSource(Source::FmTuner)).await?;
        }
        self.send(step).await
    }
}
