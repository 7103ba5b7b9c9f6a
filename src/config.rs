use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::time::Duration;

/// Default control port of the receiver
pub const DEFAULT_PORT: u16 = 33335;

/// Runtime settings for discovery, commands and the feedback connection
///
/// Every field has a default, so a partial document (JSON, TOML, ...) loaded
/// by the embedding application only needs to name what it overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiverConfig {
    /// TCP control port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Per-host connect timeout used while scanning the subnet
    #[serde(default = "default_probe_timeout", with = "millis")]
    pub probe_timeout: Duration,

    /// Local address whose /24 network is scanned; detected when unset
    #[serde(default)]
    pub local_address: Option<Ipv4Addr>,

    /// Volume change applied by `volume_up` / `volume_down`
    #[serde(default = "default_volume_step")]
    pub volume_step: u8,

    /// Size of a single feedback read
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,

    /// Pause before reopening a failed feedback connection
    #[serde(default = "default_reconnect_delay", with = "millis")]
    pub reconnect_delay: Duration,

    /// Capacity of the change-event broadcast channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// How long `shutdown` waits for the feedback task to finish
    #[serde(default = "default_shutdown_timeout", with = "millis")]
    pub shutdown_timeout: Duration,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_volume_step() -> u8 {
    2
}

fn default_read_buffer_size() -> usize {
    1024
}

fn default_reconnect_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_event_capacity() -> usize {
    100
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(8)
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            probe_timeout: default_probe_timeout(),
            local_address: None,
            volume_step: default_volume_step(),
            read_buffer_size: default_read_buffer_size(),
            reconnect_delay: default_reconnect_delay(),
            event_capacity: default_event_capacity(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

impl ReceiverConfig {
    /// Set the control port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the per-host discovery timeout
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Scan the network of this address instead of detecting it
    pub fn with_local_address(mut self, addr: Ipv4Addr) -> Self {
        self.local_address = Some(addr);
        self
    }

    /// Set the volume step
    pub fn with_volume_step(mut self, step: u8) -> Self {
        self.volume_step = step;
        self
    }

    /// Set the pause between feedback reconnect attempts
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set the change-event channel capacity
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}

/// Durations are stored as whole milliseconds
mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
