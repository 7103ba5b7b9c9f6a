//! Static command and feedback frame tables
//!
//! Frames are laid out as `0x02, <length>, <category>, <command>, <zone/param>...,
//! <payload>, <trailing>`. The trailing byte is a checksum for some commands
//! and always zero for others, so every frame is stored verbatim.

use crate::error::{ReceiverError, Result};
use crate::types::{SoundField, SoundOptimizer, Source, VolumeLevel};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// First byte of every frame
pub const FRAME_MARKER: u8 = 0x02;

// ========== Outbound ==========

// Byte 4 is the zone: 0x00 zone 1, 0x01 zone 2, 0x02 zone 3
pub const SOURCE_COMMANDS: [(Source, [u8; 7]); 11] = [
    (Source::BdDvd, [0x02, 0x04, 0xA0, 0x42, 0x00, 0x1B, 0x00]),
    (Source::Game, [0x02, 0x04, 0xA0, 0x42, 0x00, 0x1C, 0x00]),
    (Source::SatCaTv, [0x02, 0x04, 0xA0, 0x42, 0x00, 0x16, 0x00]),
    (Source::Video, [0x02, 0x04, 0xA0, 0x42, 0x00, 0x10, 0x00]),
    (Source::Tv, [0x02, 0x04, 0xA0, 0x42, 0x00, 0x1A, 0x00]),
    (Source::SaCd, [0x02, 0x04, 0xA0, 0x42, 0x00, 0x02, 0x00]),
    (Source::FmTuner, [0x02, 0x04, 0xA0, 0x42, 0x00, 0x2E, 0x00]),
    (Source::Bluetooth, [0x02, 0x04, 0xA0, 0x42, 0x00, 0x33, 0x00]),
    (Source::Usb, [0x02, 0x04, 0xA0, 0x42, 0x00, 0x34, 0x00]),
    (Source::HomeNetwork, [0x02, 0x04, 0xA0, 0x42, 0x00, 0x3D, 0x00]),
    (Source::ScreenMirroring, [0x02, 0x04, 0xA0, 0x42, 0x00, 0x40, 0x00]),
];

pub const SOUND_FIELD_COMMANDS: [(SoundField, [u8; 6]); 17] = [
    (SoundField::TwoChannelStereo, [0x02, 0x03, 0xA3, 0x42, 0x00, 0x00]),
    (SoundField::AnalogDirect, [0x02, 0x03, 0xA3, 0x42, 0x02, 0x00]),
    (SoundField::MultiStereo, [0x02, 0x03, 0xA3, 0x42, 0x27, 0x00]),
    (SoundField::Afd, [0x02, 0x03, 0xA3, 0x42, 0x21, 0x00]),
    (SoundField::Pl2Movie, [0x02, 0x03, 0xA3, 0x42, 0x23, 0x00]),
    (SoundField::Neo6Cinema, [0x02, 0x03, 0xA3, 0x42, 0x25, 0x00]),
    (SoundField::HdDcs, [0x02, 0x03, 0xA3, 0x42, 0x33, 0x00]),
    (SoundField::Pl2Music, [0x02, 0x03, 0xA3, 0x42, 0x24, 0x00]),
    (SoundField::Neo6Music, [0x02, 0x03, 0xA3, 0x42, 0x26, 0x00]),
    (SoundField::ConcertHallA, [0x02, 0x03, 0xA3, 0x42, 0x1E, 0x00]),
    (SoundField::ConcertHallB, [0x02, 0x03, 0xA3, 0x42, 0x1F, 0x00]),
    (SoundField::ConcertHallC, [0x02, 0x03, 0xA3, 0x42, 0x38, 0x00]),
    (SoundField::JazzClub, [0x02, 0x03, 0xA3, 0x42, 0x16, 0x00]),
    (SoundField::LiveConcert, [0x02, 0x03, 0xA3, 0x42, 0x19, 0x00]),
    (SoundField::Stadium, [0x02, 0x03, 0xA3, 0x42, 0x1B, 0x00]),
    (SoundField::Sports, [0x02, 0x03, 0xA3, 0x42, 0x20, 0x00]),
    (SoundField::PortableAudio, [0x02, 0x03, 0xA3, 0x42, 0x30, 0x00]),
];

/// FM tuner channel selector, indexed 0..=2
pub const FM_CHANNEL_COMMANDS: [[u8; 7]; 3] = [
    [0x02, 0x04, 0xA1, 0x42, 0x01, 0x01, 0x17],
    [0x02, 0x04, 0xA1, 0x42, 0x01, 0x02, 0x16],
    [0x02, 0x04, 0xA1, 0x42, 0x01, 0x03, 0x15],
];

pub const FM_PRESET_UP: [u8; 6] = [0x02, 0x02, 0xA1, 0x0B, 0x52, 0x00];
pub const FM_PRESET_DOWN: [u8; 6] = [0x02, 0x02, 0xA1, 0x0C, 0x51, 0x00];

pub const MIN_VOLUME: [u8; 9] = [0x02, 0x06, 0xA0, 0x52, 0x00, 0x03, 0x00, 0x00, 0x00];
pub const MAX_VOLUME: [u8; 9] = [0x02, 0x06, 0xA0, 0x52, 0x00, 0x03, 0x00, 0x4A, 0x00];

/// Volume frame; the level goes at `VOLUME_PAYLOAD_OFFSET`
pub const VOLUME_TEMPLATE: [u8; 9] = [0x02, 0x06, 0xA0, 0x52, 0x00, 0x03, 0x00, 0x00, 0x00];
pub const VOLUME_PAYLOAD_OFFSET: usize = 7;

pub const MUTE: [u8; 7] = [0x02, 0x04, 0xA0, 0x53, 0x00, 0x01, 0x00];
pub const UNMUTE: [u8; 7] = [0x02, 0x04, 0xA0, 0x53, 0x00, 0x00, 0x00];

pub const POWER_ON: [u8; 7] = [0x02, 0x04, 0xA0, 0x60, 0x00, 0x01, 0x00];
pub const POWER_OFF: [u8; 7] = [0x02, 0x04, 0xA0, 0x60, 0x00, 0x00, 0x00];

// ========== Inbound ==========

/// Source report prefixes; a status byte and a trailing byte follow.
/// "video" is reported with code 0xFF.
pub const SOURCE_FEEDBACK: [(Source, [u8; 7]); 11] = [
    (Source::BdDvd, [0x02, 0x07, 0xA8, 0x82, 0x00, 0x1B, 0x00]),
    (Source::Game, [0x02, 0x07, 0xA8, 0x82, 0x00, 0x1C, 0x00]),
    (Source::SatCaTv, [0x02, 0x07, 0xA8, 0x82, 0x00, 0x16, 0x00]),
    (Source::Video, [0x02, 0x07, 0xA8, 0x82, 0x00, 0xFF, 0x00]),
    (Source::Tv, [0x02, 0x07, 0xA8, 0x82, 0x00, 0x1A, 0x00]),
    (Source::SaCd, [0x02, 0x07, 0xA8, 0x82, 0x00, 0x02, 0x00]),
    (Source::FmTuner, [0x02, 0x07, 0xA8, 0x82, 0x00, 0x2E, 0x00]),
    (Source::Bluetooth, [0x02, 0x07, 0xA8, 0x82, 0x00, 0x33, 0x00]),
    (Source::Usb, [0x02, 0x07, 0xA8, 0x82, 0x00, 0x34, 0x00]),
    (Source::HomeNetwork, [0x02, 0x07, 0xA8, 0x82, 0x00, 0x3D, 0x00]),
    (Source::ScreenMirroring, [0x02, 0x07, 0xA8, 0x82, 0x00, 0x40, 0x00]),
];

/// Status byte of a source report
pub const STATUS_POWER_OFF: u8 = 0x10;
pub const STATUS_MUTE_OFF: u8 = 0x11;
pub const STATUS_MUTE_ON: u8 = 0x13;

pub const SOUND_FIELD_FEEDBACK: [(SoundField, [u8; 6]); 17] = [
    (SoundField::TwoChannelStereo, [0x02, 0x04, 0xAB, 0x82, 0x00, 0x00]),
    (SoundField::AnalogDirect, [0x02, 0x04, 0xAB, 0x82, 0x02, 0x00]),
    (SoundField::MultiStereo, [0x02, 0x04, 0xAB, 0x82, 0x27, 0x00]),
    (SoundField::Afd, [0x02, 0x04, 0xAB, 0x82, 0x21, 0x00]),
    (SoundField::Pl2Movie, [0x02, 0x04, 0xAB, 0x82, 0x23, 0x00]),
    (SoundField::Neo6Cinema, [0x02, 0x04, 0xAB, 0x82, 0x25, 0x00]),
    (SoundField::HdDcs, [0x02, 0x04, 0xAB, 0x82, 0x33, 0x00]),
    (SoundField::Pl2Music, [0x02, 0x04, 0xAB, 0x82, 0x24, 0x00]),
    (SoundField::Neo6Music, [0x02, 0x04, 0xAB, 0x82, 0x26, 0x00]),
    (SoundField::ConcertHallA, [0x02, 0x04, 0xAB, 0x82, 0x1E, 0x00]),
    (SoundField::ConcertHallB, [0x02, 0x04, 0xAB, 0x82, 0x1F, 0x00]),
    (SoundField::ConcertHallC, [0x02, 0x04, 0xAB, 0x82, 0x38, 0x00]),
    (SoundField::JazzClub, [0x02, 0x04, 0xAB, 0x82, 0x16, 0x00]),
    (SoundField::LiveConcert, [0x02, 0x04, 0xAB, 0x82, 0x19, 0x00]),
    (SoundField::Stadium, [0x02, 0x04, 0xAB, 0x82, 0x1B, 0x00]),
    (SoundField::Sports, [0x02, 0x04, 0xAB, 0x82, 0x20, 0x00]),
    (SoundField::PortableAudio, [0x02, 0x04, 0xAB, 0x82, 0x30, 0x00]),
];

pub const PURE_DIRECT_ON: [u8; 5] = [0x02, 0x03, 0xAB, 0x98, 0x01];
pub const PURE_DIRECT_OFF: [u8; 5] = [0x02, 0x03, 0xAB, 0x98, 0x00];

pub const SOUND_OPTIMIZER_FEEDBACK: [(SoundOptimizer, [u8; 6]); 3] = [
    (SoundOptimizer::Off, [0x02, 0x04, 0xAB, 0x92, 0x48, 0x00]),
    (SoundOptimizer::Normal, [0x02, 0x04, 0xAB, 0x92, 0x48, 0x01]),
    (SoundOptimizer::Low, [0x02, 0x04, 0xAB, 0x92, 0x48, 0x02]),
];

/// Timer report: prefix, hours, minutes, sub-kind
pub const TIMER_PREFIX: [u8; 4] = [0x02, 0x05, 0xA8, 0x90];
pub const TIMER_SET: u8 = 0x00;
pub const TIMER_UPDATE: u8 = 0x3B;
pub const TIMER_OFF: u8 = 0xFF;

/// FM tuner report: prefix, preset, stereo flag, frequency (2 bytes)
pub const FM_TUNER_PREFIX: [u8; 5] = [0x02, 0x07, 0xA9, 0x82, 0x80];
pub const FM_TUNER_MONO: u8 = 0x80;

/// Volume report: prefix, level
pub const VOLUME_PREFIX: [u8; 7] = [0x02, 0x06, 0xA8, 0x8B, 0x00, 0x03, 0x00];

/// Look up the command frame for a source
pub fn source_command(source: Source) -> Result<&'static [u8]> {
    SOURCE_COMMANDS
        .iter()
        .find(|(s, _)| *s == source)
        .map(|(_, frame)| &frame[..])
        .ok_or_else(|| ReceiverError::UnknownCommandKind(format!("source '{}'", source)))
}

/// Look up the command frame for a sound field
pub fn sound_field_command(field: SoundField) -> Result<&'static [u8]> {
    SOUND_FIELD_COMMANDS
        .iter()
        .find(|(f, _)| *f == field)
        .map(|(_, frame)| &frame[..])
        .ok_or_else(|| ReceiverError::UnknownCommandKind(format!("sound field '{}'", field)))
}

/// Look up the FM channel selector frame
pub fn fm_channel_command(index: usize) -> Result<&'static [u8]> {
    FM_CHANNEL_COMMANDS
        .get(index)
        .map(|frame| &frame[..])
        .ok_or_else(|| ReceiverError::UnknownCommandKind(format!("FM channel {}", index)))
}

/// Build the volume frame for a level
pub fn volume_command(level: VolumeLevel) -> Vec<u8> {
    let mut frame = VOLUME_TEMPLATE.to_vec();
    frame[VOLUME_PAYLOAD_OFFSET] = level;
    frame
}

/// Bytes as `0x02, 0x04, ...`, the format used in logs
pub fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("0x{:02X}", b))
        .collect::<Vec<_>>()
        .join(", ")
}

/// A semantic command that can be encoded into a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    PowerOn,
    PowerOff,
    Mute,
    Unmute,
    MinVolume,
    MaxVolume,
    SetVolume(VolumeLevel),
    SelectSource(Source),
    SelectSoundField(SoundField),
    FmChannel(usize),
    FmPresetUp,
    FmPresetDown,
}

impl Command {
    /// Encode the command
    pub fn frame(&self) -> Result<CommandFrame> {
        let frame = match *self {
            Command::PowerOn => CommandFrame::fixed(&POWER_ON),
            Command::PowerOff => CommandFrame::fixed(&POWER_OFF),
            Command::Mute => CommandFrame::fixed(&MUTE),
            Command::Unmute => CommandFrame::fixed(&UNMUTE),
            Command::MinVolume => CommandFrame::fixed(&MIN_VOLUME),
            Command::MaxVolume => CommandFrame::fixed(&MAX_VOLUME),
            Command::SetVolume(level) => CommandFrame::owned(volume_command(level)),
            Command::SelectSource(source) => CommandFrame::fixed(source_command(source)?),
            Command::SelectSoundField(field) => CommandFrame::fixed(sound_field_command(field)?),
            Command::FmChannel(index) => CommandFrame::fixed(fm_channel_command(index)?),
            Command::FmPresetUp => CommandFrame::fixed(&FM_PRESET_UP),
            Command::FmPresetDown => CommandFrame::fixed(&FM_PRESET_DOWN),
        };
        Ok(frame)
    }
}

/// Parses action names such as `powerOn`, `volume:20`, `source:bdDvd`,
/// `soundField:afd` or `fmChannel:1`
impl FromStr for Command {
    type Err = ReceiverError;

    fn from_str(s: &str) -> Result<Self> {
        let unknown = || ReceiverError::UnknownCommandKind(s.to_string());

        if let Some((kind, arg)) = s.split_once(':') {
            return match kind {
                "volume" => arg.parse().map(Command::SetVolume).map_err(|_| unknown()),
                "source" => arg.parse().map(Command::SelectSource),
                "soundField" => arg.parse().map(Command::SelectSoundField),
                "fmChannel" => {
                    let index: usize = arg.parse().map_err(|_| unknown())?;
                    fm_channel_command(index)?;
                    Ok(Command::FmChannel(index))
                }
                _ => Err(unknown()),
            };
        }

        match s {
            "powerOn" => Ok(Command::PowerOn),
            "powerOff" => Ok(Command::PowerOff),
            "mute" => Ok(Command::Mute),
            "unmute" => Ok(Command::Unmute),
            "minVolume" => Ok(Command::MinVolume),
            "maxVolume" => Ok(Command::MaxVolume),
            "fmPresetUp" => Ok(Command::FmPresetUp),
            "fmPresetDown" => Ok(Command::FmPresetDown),
            _ => Err(unknown()),
        }
    }
}

/// Encoded command bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame(Cow<'static, [u8]>);

impl CommandFrame {
    pub fn fixed(bytes: &'static [u8]) -> Self {
        Self(Cow::Borrowed(bytes))
    }

    pub fn owned(bytes: Vec<u8>) -> Self {
        Self(Cow::Owned(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_frame_starts_with_marker() {
        let fixed: [&[u8]; 10] = [
            &FM_PRESET_UP,
            &FM_PRESET_DOWN,
            &MIN_VOLUME,
            &MAX_VOLUME,
            &MUTE,
            &UNMUTE,
            &POWER_ON,
            &POWER_OFF,
            &PURE_DIRECT_ON,
            &VOLUME_PREFIX,
        ];
        let tables = SOURCE_COMMANDS
            .iter()
            .map(|(_, f)| &f[..])
            .chain(SOUND_FIELD_COMMANDS.iter().map(|(_, f)| &f[..]))
            .chain(SOURCE_FEEDBACK.iter().map(|(_, f)| &f[..]))
            .chain(SOUND_FIELD_FEEDBACK.iter().map(|(_, f)| &f[..]))
            .chain(FM_CHANNEL_COMMANDS.iter().map(|f| &f[..]));

        for frame in fixed.into_iter().chain(tables) {
            assert_eq!(frame[0], FRAME_MARKER, "frame {}", hex(frame));
        }
    }

    #[test]
    fn tables_cover_every_variant() {
        for source in Source::ALL {
            assert!(source_command(*source).is_ok());
            assert!(SOURCE_FEEDBACK.iter().any(|(s, _)| s == source));
        }
        for field in SoundField::ALL {
            assert!(sound_field_command(*field).is_ok());
            assert!(SOUND_FIELD_FEEDBACK.iter().any(|(f, _)| f == field));
        }
    }

    #[test]
    fn volume_frame_carries_level() {
        let frame = Command::SetVolume(20).frame().unwrap();
        assert_eq!(
            frame.as_bytes(),
            &[0x02, 0x06, 0xA0, 0x52, 0x00, 0x03, 0x00, 20, 0x00]
        );
    }

    #[test]
    fn fm_channel_out_of_range() {
        assert_eq!(fm_channel_command(2).unwrap()[6], 0x15);
        assert!(matches!(
            fm_channel_command(3),
            Err(ReceiverError::UnknownCommandKind(_))
        ));
        assert!(Command::FmChannel(7).frame().is_err());
    }

    #[test]
    fn parses_action_names() {
        assert_eq!("powerOff".parse::<Command>().unwrap(), Command::PowerOff);
        assert_eq!("volume:30".parse::<Command>().unwrap(), Command::SetVolume(30));
        assert_eq!(
            "source:screenMirroring".parse::<Command>().unwrap(),
            Command::SelectSource(Source::ScreenMirroring)
        );
        assert_eq!(
            "soundField:jazzClub".parse::<Command>().unwrap(),
            Command::SelectSoundField(SoundField::JazzClub)
        );
        assert_eq!("fmChannel:0".parse::<Command>().unwrap(), Command::FmChannel(0));
    }

    #[test]
    fn rejects_unknown_action_names() {
        for name in ["reboot", "source:amTuner", "volume:loud", "fmChannel:5", "tone:bass"] {
            assert!(
                matches!(name.parse::<Command>(), Err(ReceiverError::UnknownCommandKind(_))),
                "{} should be rejected",
                name
            );
        }
    }

    #[test]
    fn hex_format() {
        assert_eq!(hex(&POWER_ON), "0x02, 0x04, 0xA0, 0x60, 0x00, 0x01, 0x00");
    }
}
