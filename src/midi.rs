//! MIDI byte-level vocabulary
//!
//! Status constants, message length rules and log formatting.

/// Standard MIDI serial baud rate
pub const MIDI_BAUD_RATE: u32 = 31_250;

// Channel voice status bytes (lower nibble is the channel)
pub const NOTE_OFF: u8 = 0x80;
pub const NOTE_ON: u8 = 0x90;
pub const POLY_PRESSURE: u8 = 0xA0;
pub const CONTROL_CHANGE: u8 = 0xB0;
pub const PROGRAM_CHANGE: u8 = 0xC0;
pub const CHANNEL_PRESSURE: u8 = 0xD0;
pub const PITCH_BEND: u8 = 0xE0;

// System messages
pub const SYSEX_START: u8 = 0xF0;
pub const TIME_CODE: u8 = 0xF1;
pub const SONG_POSITION: u8 = 0xF2;
pub const SONG_SELECT: u8 = 0xF3;
pub const TUNE_REQUEST: u8 = 0xF6;
pub const SYSEX_STOP: u8 = 0xF7;
pub const CLOCK: u8 = 0xF8;
pub const START: u8 = 0xFA;
pub const CONTINUE: u8 = 0xFB;
pub const STOP: u8 = 0xFC;
pub const ACTIVE_SENSING: u8 = 0xFE;
pub const SYSTEM_RESET: u8 = 0xFF;

/// Controller number of the "All Notes Off" channel mode message
pub const ALL_NOTES_OFF_CC: u8 = 123;

/// Number of MIDI channels
pub const NUM_CHANNELS: usize = 16;

/// True for any byte with the high bit set
#[inline]
pub fn is_status(byte: u8) -> bool {
    byte & 0x80 != 0
}

/// True for single-byte system realtime messages (0xF8-0xFF)
#[inline]
pub fn is_realtime(byte: u8) -> bool {
    byte >= CLOCK
}

/// True for channel voice status bytes (0x80-0xEF)
#[inline]
pub fn is_channel_voice(status: u8) -> bool {
    (0x80..0xF0).contains(&status)
}

/// Status byte with the channel nibble stripped for channel voice messages
#[inline]
pub fn message_kind(status: u8) -> u8 {
    if is_channel_voice(status) {
        status & 0xF0
    } else {
        status
    }
}

/// Number of data bytes following a status byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataLength {
    Fixed(u8),
    /// System exclusive: unbounded until the next non-realtime status
    Streaming,
}

/// Data length of the message started by `status`
pub fn data_length(status: u8) -> DataLength {
    match message_kind(status) {
        NOTE_OFF | NOTE_ON | POLY_PRESSURE | CONTROL_CHANGE | PITCH_BEND => DataLength::Fixed(2),
        PROGRAM_CHANGE | CHANNEL_PRESSURE => DataLength::Fixed(1),
        SYSEX_START => DataLength::Streaming,
        TIME_CODE | SONG_SELECT => DataLength::Fixed(1),
        SONG_POSITION => DataLength::Fixed(2),
        _ => DataLength::Fixed(0),
    }
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Human-readable name of the message in `data`, if it is complete
fn message_name(data: &[u8]) -> Option<String> {
    let (&status, rest) = data.split_first()?;
    if !is_status(status) {
        return None;
    }
    if status == SYSEX_START {
        let len = rest.iter().position(|&b| b == SYSEX_STOP)?;
        return Some(format!("SysEx {} bytes", len));
    }
    let DataLength::Fixed(len) = data_length(status) else {
        return None;
    };
    if rest.len() < len as usize {
        return None;
    }
    let ch = (status & 0x0F) + 1;
    let name = match message_kind(status) {
        NOTE_OFF => format!("NoteOff ch:{} n:{} v:{}", ch, rest[0], rest[1]),
        NOTE_ON => format!("NoteOn ch:{} n:{} v:{}", ch, rest[0], rest[1]),
        POLY_PRESSURE => format!("PolyPressure ch:{} n:{} p:{}", ch, rest[0], rest[1]),
        CONTROL_CHANGE => format!("CC ch:{} cc:{} v:{}", ch, rest[0], rest[1]),
        PROGRAM_CHANGE => format!("ProgramChange ch:{} p:{}", ch, rest[0]),
        CHANNEL_PRESSURE => format!("ChannelPressure ch:{} p:{}", ch, rest[0]),
        PITCH_BEND => {
            let value = (rest[1] as u16) << 7 | rest[0] as u16;
            format!("PitchBend ch:{} v:{}", ch, value)
        }
        SONG_POSITION => format!("SongPosition {}", (rest[1] as u16) << 7 | rest[0] as u16),
        TIME_CODE => format!("TimeCode {:02X}", rest[0]),
        SONG_SELECT => format!("SongSelect {}", rest[0]),
        TUNE_REQUEST => "TuneRequest".to_string(),
        CLOCK => "Clock".to_string(),
        START => "Start".to_string(),
        CONTINUE => "Continue".to_string(),
        STOP => "Stop".to_string(),
        ACTIVE_SENSING => "ActiveSensing".to_string(),
        SYSTEM_RESET => "SystemReset".to_string(),
        _ => return None,
    };
    Some(name)
}

/// Describe raw bytes for log output: hex dump plus the message name if any
pub fn describe(data: &[u8]) -> String {
    let hex = format_hex(data);
    match message_name(data) {
        Some(name) => format!("{} => {}", hex, name),
        None => hex,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_lengths() {
        assert_eq!(data_length(0x93), DataLength::Fixed(2));
        assert_eq!(data_length(0xC5), DataLength::Fixed(1));
        assert_eq!(data_length(0xD0), DataLength::Fixed(1));
        assert_eq!(data_length(SYSEX_START), DataLength::Streaming);
        assert_eq!(data_length(SONG_POSITION), DataLength::Fixed(2));
        assert_eq!(data_length(SONG_SELECT), DataLength::Fixed(1));
        assert_eq!(data_length(TUNE_REQUEST), DataLength::Fixed(0));
        assert_eq!(data_length(SYSEX_STOP), DataLength::Fixed(0));
        assert_eq!(data_length(CLOCK), DataLength::Fixed(0));
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(&[0x91, 0x3C, 0x40]), "91 3C 40 => NoteOn ch:2 n:60 v:64");
        assert_eq!(describe(&[0x3C]), "3C");
        assert_eq!(describe(&[0x90, 0x3C]), "90 3C");
        assert_eq!(describe(&[0xE0, 0x00, 0x40]), "E0 00 40 => PitchBend ch:1 v:8192");
        assert_eq!(describe(&[0xF0, 0x7E, 0x01, 0xF7]), "F0 7E 01 F7 => SysEx 2 bytes");
        assert_eq!(describe(&[0xF8]), "F8 => Clock");
    }
}
