use crate::config::DEFAULT_PORT;
use crate::error::{ReceiverError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

/// Volume level value as reported by the device
pub type VolumeLevel = u8;

pub const MIN_VOLUME: VolumeLevel = 0;
pub const LOW_VOLUME: VolumeLevel = 15;
pub const MEDIUM_VOLUME: VolumeLevel = 30;
pub const MAX_VOLUME: VolumeLevel = 45;

/// Declares a fieldless enum together with its wire name, display name and
/// string lookup. Unknown names fail with `UnknownCommandKind`.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $($(#[$vmeta:meta])* $variant:ident => ($wire:literal, $display:literal)),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $wire)]
                $variant,
            )+
        }

        impl $name {
            /// Every variant, in menu order
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Protocol-level name, e.g. `"bdDvd"`
            pub fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }

            /// Human-readable name, as shown in menus and notifications
            pub fn display_name(self) -> &'static str {
                match self {
                    $($name::$variant => $display),+
                }
            }
        }

        impl FromStr for $name {
            type Err = ReceiverError;

            fn from_str(s: &str) -> Result<Self> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.name() == s)
                    .ok_or_else(|| {
                        ReceiverError::UnknownCommandKind(format!("{} '{}'", stringify!($name), s))
                    })
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

wire_enum! {
    /// Input source of zone 1
    Source {
        BdDvd => ("bdDvd", "Blueray / DVD"),
        Game => ("game", "Game"),
        SatCaTv => ("satCaTV", "Sat / Cable"),
        /// Also reported while Google Cast or Bluetooth is playing
        Video => ("video", "Video"),
        Tv => ("tv", "TV"),
        SaCd => ("saCd", "CD"),
        FmTuner => ("fmTuner", "FM Tuner"),
        Bluetooth => ("bluetooth", "Bluetooth"),
        Usb => ("usb", "USB"),
        HomeNetwork => ("homeNetwork", "Home Network"),
        ScreenMirroring => ("screenMirroring", "Screen Mirroring"),
    }
}

wire_enum! {
    /// Sound field (surround decoding / DSP program)
    SoundField {
        TwoChannelStereo => ("twoChannelStereo", "2 Channels"),
        AnalogDirect => ("analogDirect", "Analog Direct"),
        MultiStereo => ("multiStereo", "Multi Stereo"),
        Afd => ("afd", "A.F.D."),
        Pl2Movie => ("pl2Movie", "PL-II Movie"),
        Neo6Cinema => ("neo6Cinema", "Neo 6: Cinema"),
        HdDcs => ("hdDcs", "HD DCS"),
        Pl2Music => ("pl2Music", "PL-II Music"),
        Neo6Music => ("neo6Music", "Neo 6: Music"),
        ConcertHallA => ("concertHallA", "Concert Hall A"),
        ConcertHallB => ("concertHallB", "Concert Hall B"),
        ConcertHallC => ("concertHallC", "Concert Hall C"),
        JazzClub => ("jazzClub", "Jazz Club"),
        LiveConcert => ("liveConcert", "Live Concert"),
        Stadium => ("stadium", "Stadium"),
        Sports => ("sports", "Sports"),
        PortableAudio => ("portableAudio", "Portable Audio"),
    }
}

wire_enum! {
    /// Sound optimizer setting
    SoundOptimizer {
        Off => ("off", "Off"),
        Normal => ("normal", "Normal"),
        Low => ("low", "Low"),
    }
}

/// Network address of the receiver's control port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceEndpoint {
    pub ip: IpAddr,
    pub port: u16,
}

impl DeviceEndpoint {
    /// Endpoint on an explicit port
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }

    /// Endpoint on the default control port (33335)
    pub fn from_ip(ip: IpAddr) -> Self {
        Self::new(ip, DEFAULT_PORT)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

impl fmt::Display for DeviceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Sleep timer state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerState {
    pub active: bool,
    pub hours: u8,
    pub minutes: u8,
}

/// FM tuner state
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FmTunerState {
    /// Preset number, unknown until the tuner reports one
    pub preset: Option<u8>,
    pub stereo: bool,
    pub frequency_mhz: f64,
}

/// Canonical state of the receiver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    pub power: bool,
    pub volume: VolumeLevel,
    pub muted: bool,
    pub source: Option<Source>,
    pub sound_field: Option<SoundField>,
    pub pure_direct: bool,
    pub sound_optimizer: Option<SoundOptimizer>,
    pub timer: TimerState,
    pub fm_tuner: FmTunerState,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            power: true,
            volume: LOW_VOLUME,
            muted: false,
            source: None,
            sound_field: None,
            pure_direct: false,
            sound_optimizer: None,
            timer: TimerState::default(),
            fm_tuner: FmTunerState::default(),
        }
    }
}

impl DeviceState {
    /// Short status text: power, source and, for the FM tuner, the frequency
    pub fn status_label(&self) -> String {
        if !self.power {
            return "Power Off".to_string();
        }
        match self.source {
            Some(Source::FmTuner) if self.fm_tuner.preset.is_some() => {
                format!("{} ({})", Source::FmTuner.display_name(), self.fm_tuner.frequency_mhz)
            }
            Some(source) => source.display_name().to_string(),
            None => String::new(),
        }
    }
}
