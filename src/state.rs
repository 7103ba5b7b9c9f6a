//! Canonical device state and change detection
//!
//! [`Reconciler`] is the only writer of [`DeviceState`]. Feedback from the
//! device and optimistic updates from the command side both go through its
//! typed update operations, which run under one mutex and report the fields
//! that actually changed as [`ChangeEvent`]s.

use crate::decoder::{Feedback, SourceStatus, TimerReport};
use crate::subscription::{ChangeEvent, ChangeKind, ChangeReceiver};
use crate::types::{DeviceState, FmTunerState, SoundField, SoundOptimizer, Source, TimerState, VolumeLevel};
use serde_json::json;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

/// Remaining minutes below which every timer countdown is reported
const TIMER_WARNING_MINUTES: u8 = 15;

struct Inner {
    state: DeviceState,
    /// Until set, updates change the state silently
    initialized: bool,
}

/// Owner of the canonical device state
pub struct Reconciler {
    inner: Mutex<Inner>,
    events: broadcast::Sender<ChangeEvent>,
}

impl Reconciler {
    /// Create a reconciler with default state, not yet initialized
    pub fn new(event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            inner: Mutex::new(Inner {
                state: DeviceState::default(),
                initialized: false,
            }),
            events,
        }
    }

    /// Subscribe to change events
    pub fn subscribe(&self) -> ChangeReceiver {
        ChangeReceiver::new(self.events.subscribe())
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> DeviceState {
        self.lock().state.clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().initialized
    }

    /// Enable or disable change notifications
    pub fn set_initialized(&self, initialized: bool) {
        self.lock().initialized = initialized;
    }

    pub fn update_power(&self, power: bool) {
        self.transact(|tx| tx.power(power));
    }

    /// Raising the volume above the previous level also clears mute
    pub fn update_volume(&self, level: VolumeLevel) {
        self.transact(|tx| tx.volume(level));
    }

    pub fn update_muted(&self, muted: bool) {
        self.transact(|tx| tx.muted(muted));
    }

    /// Selecting a source implies the device is powered on
    pub fn update_source(&self, source: Source) {
        self.transact(|tx| {
            tx.source(source);
            tx.power(true);
        });
    }

    pub fn update_sound_field(&self, field: SoundField) {
        self.transact(|tx| tx.sound_field(field));
    }

    pub fn update_pure_direct(&self, enabled: bool) {
        self.transact(|tx| tx.pure_direct(enabled));
    }

    pub fn update_sound_optimizer(&self, optimizer: SoundOptimizer) {
        self.transact(|tx| tx.sound_optimizer(optimizer));
    }

    pub fn update_timer(&self, hours: u8, minutes: u8, report: TimerReport) {
        self.transact(|tx| tx.timer(hours, minutes, report));
    }

    pub fn update_fm_tuner(&self, preset: u8, stereo: bool, frequency_mhz: f64) {
        self.transact(|tx| tx.fm_tuner(preset, stereo, frequency_mhz));
    }

    /// Switch to `source` ahead of sending the command for it
    ///
    /// The initialized check, the comparison and the update happen under one
    /// lock, so of several concurrent callers only one gets the change.
    /// `None` means there is nothing to send.
    pub fn claim_source(&self, source: Source) -> Option<PendingChange> {
        let mut inner = self.lock();
        if !inner.initialized || inner.state.source == Some(source) {
            return None;
        }
        let undo = Undo::Source {
            claimed: source,
            previous: inner.state.source,
            power: inner.state.power,
        };
        let events = Transaction::record(&mut inner.state, true, |tx| {
            tx.source(source);
            tx.power(true);
        });
        Some(PendingChange { events, undo })
    }

    /// Sound field counterpart of [`claim_source`](Self::claim_source)
    pub fn claim_sound_field(&self, field: SoundField) -> Option<PendingChange> {
        let mut inner = self.lock();
        if !inner.initialized || inner.state.sound_field == Some(field) {
            return None;
        }
        let undo = Undo::SoundField {
            claimed: field,
            previous: inner.state.sound_field,
        };
        let events = Transaction::record(&mut inner.state, true, |tx| tx.sound_field(field));
        Some(PendingChange { events, undo })
    }

    /// The command went out; publish the change
    pub fn commit(&self, change: PendingChange) {
        self.publish(change.events);
    }

    /// The command failed; restore the previous value without notifying
    ///
    /// Feedback that arrived in the meantime wins over the restore.
    pub fn revert(&self, change: PendingChange) {
        tracing::debug!(undo = ?change.undo, "Reverting unsent change");
        let mut inner = self.lock();
        match change.undo {
            Undo::Source {
                claimed,
                previous,
                power,
            } => {
                if inner.state.source == Some(claimed) {
                    inner.state.source = previous;
                    inner.state.power = power;
                }
            }
            Undo::SoundField { claimed, previous } => {
                if inner.state.sound_field == Some(claimed) {
                    inner.state.sound_field = previous;
                }
            }
        }
    }

    /// Apply a decoded feedback frame
    pub fn apply(&self, feedback: Feedback) {
        self.transact(|tx| match feedback {
            Feedback::Timer {
                hours,
                minutes,
                report,
            } => tx.timer(hours, minutes, report),
            Feedback::Source { source, status } => {
                tx.source(source);
                match status {
                    Some(SourceStatus::PowerOff) => tx.power(false),
                    Some(SourceStatus::Unmuted) => {
                        tx.power(true);
                        tx.muted(false);
                    }
                    Some(SourceStatus::Muted) => {
                        tx.power(true);
                        tx.muted(true);
                    }
                    None => tx.power(true),
                }
            }
            Feedback::SoundField(field) => tx.sound_field(field),
            Feedback::PureDirect(enabled) => tx.pure_direct(enabled),
            Feedback::SoundOptimizer(optimizer) => tx.sound_optimizer(optimizer),
            Feedback::FmTuner {
                preset,
                stereo,
                frequency_mhz,
            } => {
                tx.fm_tuner(preset, stereo, frequency_mhz);
                tx.source(Source::FmTuner);
                tx.power(true);
            }
            Feedback::Volume(level) => tx.volume(level),
        });
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` under the lock, then publish what it changed
    fn transact(&self, f: impl FnOnce(&mut Transaction<'_>)) {
        let events = {
            let mut inner = self.lock();
            let notify = inner.initialized;
            Transaction::record(&mut inner.state, notify, f)
        };
        self.publish(events);
    }

    fn publish(&self, events: Vec<ChangeEvent>) {
        for event in events {
            tracing::debug!(kind = ?event.kind, value = %event.value, "{}", event.display_text);
            // No subscribers is fine
            let _ = self.events.send(event);
        }
    }
}

/// A change applied ahead of its command
///
/// Its events are published by [`Reconciler::commit`] once the device has
/// accepted the command; [`Reconciler::revert`] drops them and restores the
/// previous value.
#[must_use = "a pending change must be committed or reverted"]
#[derive(Debug)]
pub struct PendingChange {
    events: Vec<ChangeEvent>,
    undo: Undo,
}

#[derive(Debug)]
enum Undo {
    Source {
        claimed: Source,
        previous: Option<Source>,
        power: bool,
    },
    SoundField {
        claimed: SoundField,
        previous: Option<SoundField>,
    },
}

/// Mutations made while holding the state lock
struct Transaction<'a> {
    state: &'a mut DeviceState,
    notify: bool,
    events: Vec<ChangeEvent>,
}

impl Transaction<'_> {
    /// Run `f` against `state` and return the events it produced
    fn record(
        state: &mut DeviceState,
        notify: bool,
        f: impl FnOnce(&mut Transaction<'_>),
    ) -> Vec<ChangeEvent> {
        let mut tx = Transaction {
            state,
            notify,
            events: Vec::new(),
        };
        f(&mut tx);
        tx.events
    }

    fn emit(&mut self, event: ChangeEvent) {
        if self.notify {
            self.events.push(event);
        }
    }

    fn power(&mut self, power: bool) {
        let changed = self.state.power != power;
        self.state.power = power;
        if changed {
            let text = if power { "Power ON" } else { "Power OFF" };
            self.emit(ChangeEvent::new(ChangeKind::PowerChanged, power, text));
        }
    }

    fn volume(&mut self, level: VolumeLevel) {
        let previous = self.state.volume;
        self.state.volume = level;
        if level != previous {
            self.emit(ChangeEvent::new(
                ChangeKind::VolumeChanged,
                level,
                format!("Volume {}", level),
            ));
        }
        if level > previous {
            self.muted(false);
        }
    }

    fn muted(&mut self, muted: bool) {
        let changed = self.state.muted != muted;
        self.state.muted = muted;
        if changed {
            let text = if muted { "Muted" } else { "Unmuted" };
            self.emit(ChangeEvent::new(ChangeKind::MutedChanged, muted, text));
        }
    }

    fn source(&mut self, source: Source) {
        let changed = self.state.source != Some(source);
        self.state.source = Some(source);
        if changed {
            self.emit(ChangeEvent::new(
                ChangeKind::SourceChanged,
                source.name(),
                source.display_name(),
            ));
        }
    }

    fn sound_field(&mut self, field: SoundField) {
        let changed = self.state.sound_field != Some(field);
        self.state.sound_field = Some(field);
        if changed {
            self.emit(ChangeEvent::new(
                ChangeKind::SoundFieldChanged,
                field.name(),
                field.display_name(),
            ));
        }
    }

    // Pure direct, sound optimizer and FM tuner reports are only sent by the
    // device when the user touches the setting, so each one is reported.

    fn pure_direct(&mut self, enabled: bool) {
        self.state.pure_direct = enabled;
        let text = if enabled { "Pure Direct ON" } else { "Pure Direct OFF" };
        self.emit(ChangeEvent::new(ChangeKind::PureDirectChanged, enabled, text));
    }

    fn sound_optimizer(&mut self, optimizer: SoundOptimizer) {
        self.state.sound_optimizer = Some(optimizer);
        self.emit(ChangeEvent::new(
            ChangeKind::SoundOptimizerChanged,
            optimizer.name(),
            optimizer.display_name(),
        ));
    }

    fn fm_tuner(&mut self, preset: u8, stereo: bool, frequency_mhz: f64) {
        self.state.fm_tuner = FmTunerState {
            preset: Some(preset),
            stereo,
            frequency_mhz,
        };
        self.emit(ChangeEvent::new(
            ChangeKind::FmTunerChanged,
            json!({ "preset": preset, "stereo": stereo, "frequencyMHz": frequency_mhz }),
            format!("Preset {} ({:.2} MHz)", preset, frequency_mhz),
        ));
    }

    /// Countdown updates arrive every minute; only the last quarter hour is reported
    fn timer(&mut self, hours: u8, minutes: u8, report: TimerReport) {
        let was_active = self.state.timer.active;
        let active = report != TimerReport::Off;
        self.state.timer = TimerState {
            active,
            hours,
            minutes,
        };

        let report_it = match report {
            TimerReport::Off => was_active,
            TimerReport::Set => true,
            TimerReport::Update => hours == 0 && minutes < TIMER_WARNING_MINUTES,
        };
        if report_it {
            let text = if active {
                format!("Device will shutdown in {}:{:02} h", hours, minutes)
            } else {
                "Timer OFF".to_string()
            };
            self.emit(ChangeEvent::new(
                ChangeKind::TimerChanged,
                json!({ "active": active, "hours": hours, "minutes": minutes }),
                text,
            ));
        }
    }
}
