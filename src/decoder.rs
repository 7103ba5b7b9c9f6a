//! Feedback frame decoders
//!
//! Each decoder recognizes one family of feedback frames by prefix and length
//! and turns it into a typed [`Feedback`] value. Decoders never touch device
//! state; the listener hands their output to the reconciler.

use crate::frames::{
    FM_TUNER_MONO, FM_TUNER_PREFIX, PURE_DIRECT_OFF, PURE_DIRECT_ON, SOUND_FIELD_FEEDBACK,
    SOUND_OPTIMIZER_FEEDBACK, SOURCE_FEEDBACK, STATUS_MUTE_OFF, STATUS_MUTE_ON, STATUS_POWER_OFF,
    TIMER_OFF, TIMER_PREFIX, TIMER_SET, TIMER_UPDATE, VOLUME_PREFIX,
};
use crate::types::{SoundField, SoundOptimizer, Source, VolumeLevel};

/// Kind of timer report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerReport {
    /// The timer was (re)set
    Set,
    /// Periodic countdown of a running timer
    Update,
    /// The timer was cancelled
    Off,
}

/// Power/mute sub-state carried by a source report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus {
    PowerOff,
    /// Powered on and unmuted
    Unmuted,
    /// Powered on and muted
    Muted,
}

/// A decoded feedback frame
#[derive(Debug, Clone, PartialEq)]
pub enum Feedback {
    Timer {
        hours: u8,
        minutes: u8,
        report: TimerReport,
    },
    Source {
        source: Source,
        status: Option<SourceStatus>,
    },
    SoundField(SoundField),
    PureDirect(bool),
    SoundOptimizer(SoundOptimizer),
    FmTuner {
        preset: u8,
        stereo: bool,
        frequency_mhz: f64,
    },
    Volume(VolumeLevel),
}

/// Recognizes one family of feedback frames
pub trait FrameDecoder: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Decode the frame, or `None` if it does not belong to this decoder
    fn decode(&self, frame: &[u8]) -> Option<Feedback>;
}

/// Decoders in dispatch priority order
pub fn default_decoders() -> Vec<Box<dyn FrameDecoder>> {
    vec![
        Box::new(TimerDecoder),
        Box::new(SourceDecoder),
        Box::new(SoundFieldDecoder),
        Box::new(PureDirectDecoder),
        Box::new(SoundOptimizerDecoder),
        Box::new(FmTunerDecoder),
        Box::new(VolumeDecoder),
    ]
}

/// Run the decoders in order; the first one that recognizes the frame wins
pub fn decode_frame(decoders: &[Box<dyn FrameDecoder>], frame: &[u8]) -> Option<Feedback> {
    decoders.iter().find_map(|decoder| {
        let feedback = decoder.decode(frame)?;
        tracing::trace!(decoder = decoder.name(), ?feedback, "Decoded frame");
        Some(feedback)
    })
}

/// `frame` without its last `n` bytes, if it is long enough
fn strip_tail(frame: &[u8], n: usize) -> Option<&[u8]> {
    frame.len().checked_sub(n).map(|len| &frame[..len])
}

pub struct TimerDecoder;

impl FrameDecoder for TimerDecoder {
    fn name(&self) -> &'static str {
        "timer"
    }

    fn decode(&self, frame: &[u8]) -> Option<Feedback> {
        if strip_tail(frame, 3)? != TIMER_PREFIX {
            return None;
        }
        let &[hours, minutes, kind] = &frame[frame.len() - 3..] else {
            return None;
        };
        let report = match kind {
            TIMER_SET => TimerReport::Set,
            TIMER_UPDATE => TimerReport::Update,
            TIMER_OFF => TimerReport::Off,
            _ => return None,
        };
        Some(Feedback::Timer {
            hours,
            minutes,
            report,
        })
    }
}

pub struct SourceDecoder;

impl FrameDecoder for SourceDecoder {
    fn name(&self) -> &'static str {
        "source"
    }

    fn decode(&self, frame: &[u8]) -> Option<Feedback> {
        let prefix = strip_tail(frame, 2)?;

        // Every entry is checked and the last match applies. The table has no
        // overlapping prefixes today, but nothing guarantees that.
        let source = SOURCE_FEEDBACK
            .iter()
            .filter(|(_, feedback)| prefix == feedback)
            .map(|(source, _)| *source)
            .last()?;

        let status = match frame[frame.len() - 2] {
            STATUS_POWER_OFF => Some(SourceStatus::PowerOff),
            STATUS_MUTE_OFF => Some(SourceStatus::Unmuted),
            STATUS_MUTE_ON => Some(SourceStatus::Muted),
            _ => None,
        };
        Some(Feedback::Source { source, status })
    }
}

pub struct SoundFieldDecoder;

impl FrameDecoder for SoundFieldDecoder {
    fn name(&self) -> &'static str {
        "sound field"
    }

    fn decode(&self, frame: &[u8]) -> Option<Feedback> {
        SOUND_FIELD_FEEDBACK
            .iter()
            .filter(|(_, feedback)| frame == feedback)
            .map(|(field, _)| Feedback::SoundField(*field))
            .last()
    }
}

pub struct PureDirectDecoder;

impl FrameDecoder for PureDirectDecoder {
    fn name(&self) -> &'static str {
        "pure direct"
    }

    fn decode(&self, frame: &[u8]) -> Option<Feedback> {
        if frame == PURE_DIRECT_ON {
            Some(Feedback::PureDirect(true))
        } else if frame == PURE_DIRECT_OFF {
            Some(Feedback::PureDirect(false))
        } else {
            None
        }
    }
}

pub struct SoundOptimizerDecoder;

impl FrameDecoder for SoundOptimizerDecoder {
    fn name(&self) -> &'static str {
        "sound optimizer"
    }

    fn decode(&self, frame: &[u8]) -> Option<Feedback> {
        SOUND_OPTIMIZER_FEEDBACK
            .iter()
            .find(|(_, feedback)| frame == feedback)
            .map(|(optimizer, _)| Feedback::SoundOptimizer(*optimizer))
    }
}

pub struct FmTunerDecoder;

impl FrameDecoder for FmTunerDecoder {
    fn name(&self) -> &'static str {
        "fm tuner"
    }

    fn decode(&self, frame: &[u8]) -> Option<Feedback> {
        if frame.len() < 9 || frame[..5] != FM_TUNER_PREFIX {
            return None;
        }
        Some(Feedback::FmTuner {
            preset: frame[5],
            stereo: frame[6] != FM_TUNER_MONO,
            frequency_mhz: fm_frequency(frame[7], frame[8]),
        })
    }
}

/// Frequency in MHz from the two frequency bytes, rounded to one decimal
pub fn fm_frequency(high: u8, low: u8) -> f64 {
    let raw = (f64::from(high) * 255.0 + f64::from(low)) / 99.5 - 0.1;
    (raw * 10.0).round() / 10.0
}

pub struct VolumeDecoder;

impl FrameDecoder for VolumeDecoder {
    fn name(&self) -> &'static str {
        "volume"
    }

    fn decode(&self, frame: &[u8]) -> Option<Feedback> {
        if strip_tail(frame, 1)? != VOLUME_PREFIX {
            return None;
        }
        frame.last().map(|level| Feedback::Volume(*level))
    }
}
