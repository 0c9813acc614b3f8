//! USRP wire format
//!
//! ```text
//! ┌──────┬─────┬────────┬───────┬───────────┬──────┬───────┬──────────┐
//! │ USRP │ seq │ memory │ keyup │ talkgroup │ type │ mpxid │ reserved │
//! └──────┴─────┴────────┴───────┴───────────┴──────┴───────┴──────────┘
//!   4 B    u32    u32      u32       u32       u32     u32      u32
//! ```
//!
//! All integers are big endian. The header is followed by a type
//! specific body: 160 PCM samples for voice, metadata for text, a
//! talkgroup for DTMF.

use bytes::{BufMut, Bytes, BytesMut};

use crate::constants::{USRP_AUDIO_FRAME_LEN, USRP_HEADER_LEN};
use crate::error::NetworkError;

pub const USRP_MAGIC: &[u8; 4] = b"USRP";

/// Size of a voice body in bytes
pub const VOICE_BODY_LEN: usize = USRP_AUDIO_FRAME_LEN * 2;

/// Text and TLV bodies are zero padded to this size
pub const TEXT_BODY_LEN: usize = 320;

/// TLV tags carried in text bodies
pub mod tlv {
    pub const BEGIN_TX: u8 = 0;
    pub const AMBE: u8 = 1;
    pub const END_TX: u8 = 2;
    pub const TG_TUNE: u8 = 3;
    pub const PLAY_AMBE: u8 = 4;
    pub const REMOTE_CMD: u8 = 5;
    pub const AMBE_49: u8 = 6;
    pub const AMBE_72: u8 = 7;
    pub const SET_INFO: u8 = 8;
    pub const IMBE: u8 = 9;
    pub const DSAMBE: u8 = 10;
    pub const FILE_XFER: u8 = 11;
}

/// Length of the fixed part of a SET_INFO value: DMR id, repeater id,
/// talkgroup, timeslot, color code
const SET_INFO_FIXED_LEN: usize = 3 + 4 + 3 + 1 + 1;

/// Message type discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Voice,
    Dtmf,
    Text,
    Ping,
    Tlv,
    VoiceAdpcm,
    VoiceUlaw,
}

impl MessageType {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(MessageType::Voice),
            1 => Some(MessageType::Dtmf),
            2 => Some(MessageType::Text),
            3 => Some(MessageType::Ping),
            4 => Some(MessageType::Tlv),
            5 => Some(MessageType::VoiceAdpcm),
            6 => Some(MessageType::VoiceUlaw),
            _ => None,
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            MessageType::Voice => 0,
            MessageType::Dtmf => 1,
            MessageType::Text => 2,
            MessageType::Ping => 3,
            MessageType::Tlv => 4,
            MessageType::VoiceAdpcm => 5,
            MessageType::VoiceUlaw => 6,
        }
    }
}

/// Common message header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsrpHeader {
    pub seq: u32,
    pub memory: u32,
    pub keyup: bool,
    pub talkgroup: u32,
    /// Raw type field, see [`UsrpHeader::message_type`]
    pub msg_type: u32,
    pub mpxid: u32,
    pub reserved: u32,
}

impl UsrpHeader {
    pub fn new(msg_type: MessageType, seq: u32) -> Self {
        Self {
            seq,
            memory: 0,
            keyup: false,
            talkgroup: 0,
            msg_type: msg_type.as_u32(),
            mpxid: 0,
            reserved: 0,
        }
    }

    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::from_u32(self.msg_type)
    }

    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_slice(USRP_MAGIC);
        buf.put_u32(self.seq);
        buf.put_u32(self.memory);
        buf.put_u32(self.keyup as u32);
        buf.put_u32(self.talkgroup);
        buf.put_u32(self.msg_type);
        buf.put_u32(self.mpxid);
        buf.put_u32(self.reserved);
    }

    pub fn parse(datagram: &[u8]) -> Result<Self, NetworkError> {
        if datagram.len() < USRP_HEADER_LEN {
            return Err(NetworkError::MessageTooShort(datagram.len()));
        }
        if &datagram[..4] != USRP_MAGIC {
            return Err(NetworkError::BadMagic);
        }

        let word = |i: usize| {
            let at = 4 + i * 4;
            u32::from_be_bytes([
                datagram[at],
                datagram[at + 1],
                datagram[at + 2],
                datagram[at + 3],
            ])
        };
        Ok(Self {
            seq: word(0),
            memory: word(1),
            keyup: word(2) != 0,
            talkgroup: word(3),
            msg_type: word(4),
            mpxid: word(5),
            reserved: word(6),
        })
    }
}

/// Identity advertised at the start of a transmission and received
/// from remote talkers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StationInfo {
    pub dmr_id: u32,
    pub rpt_id: u32,
    pub tg: u32,
    pub ts: u8,
    pub cc: u8,
    pub callsign: String,
}

/// A decoded inbound datagram
#[derive(Debug, Clone, PartialEq)]
pub enum UsrpMessage {
    /// Voice frame with keyup set, samples in host order
    Voice { header: UsrpHeader, samples: Vec<i16> },
    /// Voice header with keyup cleared: end of transmission
    VoiceStop { header: UsrpHeader },
    /// Text body, padding included
    Text { header: UsrpHeader, body: Bytes },
    Dtmf { header: UsrpHeader, tg: u32 },
    Ping { header: UsrpHeader },
    /// Valid header of a type this engine does not handle
    Other { header: UsrpHeader },
}

impl UsrpMessage {
    /// Decode one datagram
    pub fn decode(datagram: &[u8]) -> Result<Self, NetworkError> {
        let header = UsrpHeader::parse(datagram)?;
        let body = &datagram[USRP_HEADER_LEN..];

        let message = match header.message_type() {
            Some(MessageType::Voice) if !header.keyup => UsrpMessage::VoiceStop { header },
            Some(MessageType::Voice) => {
                if body.len() < VOICE_BODY_LEN {
                    return Err(NetworkError::MessageTooShort(datagram.len()));
                }
                let samples = body[..VOICE_BODY_LEN]
                    .chunks_exact(2)
                    .map(|b| i16::from_be_bytes([b[0], b[1]]))
                    .collect();
                UsrpMessage::Voice { header, samples }
            }
            Some(MessageType::Text) => {
                if body.is_empty() {
                    return Err(NetworkError::MessageTooShort(datagram.len()));
                }
                UsrpMessage::Text {
                    header,
                    body: Bytes::copy_from_slice(body),
                }
            }
            Some(MessageType::Dtmf) => {
                let tg = parse_dtmf_tg(body)?;
                UsrpMessage::Dtmf { header, tg }
            }
            Some(MessageType::Ping) => UsrpMessage::Ping { header },
            _ => UsrpMessage::Other { header },
        };
        Ok(message)
    }
}

/// Voice frame with keyup set
pub fn pack_voice(seq: u32, samples: &[i16]) -> Result<Bytes, NetworkError> {
    if samples.len() != USRP_AUDIO_FRAME_LEN {
        return Err(NetworkError::PackFailed(format!(
            "voice frame needs {} samples, got {}",
            USRP_AUDIO_FRAME_LEN,
            samples.len()
        )));
    }

    let mut header = UsrpHeader::new(MessageType::Voice, seq);
    header.keyup = true;

    let mut buf = BytesMut::with_capacity(USRP_HEADER_LEN + VOICE_BODY_LEN);
    header.write_to(&mut buf);
    for &s in samples {
        buf.put_i16(s);
    }
    Ok(buf.freeze())
}

/// Bare voice header with keyup cleared
pub fn pack_stop(seq: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(USRP_HEADER_LEN);
    UsrpHeader::new(MessageType::Voice, seq).write_to(&mut buf);
    buf.freeze()
}

/// Text message carrying a SET_INFO TLV
pub fn pack_station_info(seq: u32, info: &StationInfo) -> Result<Bytes, NetworkError> {
    if info.dmr_id > 0xFF_FFFF || info.tg > 0xFF_FFFF {
        return Err(NetworkError::PackFailed(
            "DMR id and talkgroup must fit in 24 bits".to_string(),
        ));
    }
    let value_len = SET_INFO_FIXED_LEN + info.callsign.len() + 1;
    if 2 + value_len > TEXT_BODY_LEN {
        return Err(NetworkError::PackFailed("callsign too long".to_string()));
    }

    let mut body = BytesMut::with_capacity(TEXT_BODY_LEN);
    body.put_u8(tlv::SET_INFO);
    body.put_u8(value_len as u8);
    put_u24(&mut body, info.dmr_id);
    body.put_u32(info.rpt_id);
    put_u24(&mut body, info.tg);
    body.put_u8(info.ts);
    body.put_u8(info.cc);
    body.put_slice(info.callsign.as_bytes());
    body.put_u8(0);

    Ok(pack_text_body(MessageType::Text, seq, &body))
}

/// DTMF typed message carrying a mode name after an empty TLV
pub fn pack_mode_switch(seq: u32, mode: &str) -> Result<Bytes, NetworkError> {
    if 2 + mode.len() > TEXT_BODY_LEN {
        return Err(NetworkError::PackFailed("mode name too long".to_string()));
    }
    let mut body = BytesMut::with_capacity(TEXT_BODY_LEN);
    body.put_u8(tlv::BEGIN_TX);
    body.put_u8(0);
    body.put_slice(mode.as_bytes());
    Ok(pack_text_body(MessageType::Dtmf, seq, &body))
}

fn pack_text_body(msg_type: MessageType, seq: u32, body: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(USRP_HEADER_LEN + TEXT_BODY_LEN);
    UsrpHeader::new(msg_type, seq).write_to(&mut buf);
    buf.put_slice(body);
    buf.put_bytes(0, TEXT_BODY_LEN - body.len());
    buf.freeze()
}

fn put_u24(buf: &mut BytesMut, value: u32) {
    buf.put_slice(&value.to_be_bytes()[1..]);
}

fn u24(b: &[u8]) -> u32 {
    u32::from_be_bytes([0, b[0], b[1], b[2]])
}

/// Parse a SET_INFO TLV from a text body
pub fn parse_station_info(body: &[u8]) -> Result<StationInfo, NetworkError> {
    if body.len() < 2 || body[0] != tlv::SET_INFO {
        return Err(NetworkError::InvalidPacket("not a SET_INFO TLV".to_string()));
    }
    let len = body[1] as usize;
    if len < SET_INFO_FIXED_LEN || body.len() < 2 + len {
        return Err(NetworkError::InvalidPacket(format!(
            "SET_INFO length {} out of range",
            len
        )));
    }

    let value = &body[2..2 + len];
    let call = &value[SET_INFO_FIXED_LEN..];
    let end = call.iter().position(|&b| b == 0).unwrap_or(call.len());
    let callsign = String::from_utf8_lossy(&call[..end]).trim().to_string();
    if callsign.is_empty() {
        return Err(NetworkError::InvalidPacket("SET_INFO without callsign".to_string()));
    }

    Ok(StationInfo {
        dmr_id: u24(&value[0..3]),
        rpt_id: u32::from_be_bytes([value[3], value[4], value[5], value[6]]),
        tg: u24(&value[7..10]),
        ts: value[10],
        cc: value[11],
        callsign,
    })
}

/// Talkgroup requested by a DTMF body: the first run of ASCII digits
pub fn parse_dtmf_tg(body: &[u8]) -> Result<u32, NetworkError> {
    let digits: String = body
        .iter()
        .skip_while(|b| !b.is_ascii_digit())
        .take_while(|b| b.is_ascii_digit())
        .map(|&b| b as char)
        .collect();

    digits
        .parse()
        .map_err(|_| NetworkError::InvalidPacket("DTMF body without talkgroup".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station() -> StationInfo {
        StationInfo {
            dmr_id: 2_620_001,
            rpt_id: 262_000_101,
            tg: 262,
            ts: 2,
            cc: 1,
            callsign: "DL1ABC".to_string(),
        }
    }

    #[test]
    fn test_header_layout() {
        let bytes = pack_stop(0x1234);
        assert_eq!(bytes.len(), USRP_HEADER_LEN);
        assert_eq!(&bytes[..4], b"USRP");
        assert_eq!(&bytes[4..8], &[0, 0, 0x12, 0x34]);
        // keyup cleared, type voice
        assert_eq!(&bytes[12..16], &[0, 0, 0, 0]);
        assert_eq!(&bytes[20..24], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_voice_is_big_endian() {
        let mut samples = vec![0i16; USRP_AUDIO_FRAME_LEN];
        samples[0] = 0x0102;
        samples[159] = -2;
        let bytes = pack_voice(7, &samples).unwrap();
        assert_eq!(bytes.len(), USRP_HEADER_LEN + VOICE_BODY_LEN);
        assert_eq!(&bytes[32..34], &[0x01, 0x02]);
        assert_eq!(&bytes[bytes.len() - 2..], &[0xFF, 0xFE]);

        match UsrpMessage::decode(&bytes).unwrap() {
            UsrpMessage::Voice { header, samples: decoded } => {
                assert_eq!(header.seq, 7);
                assert!(header.keyup);
                assert_eq!(decoded, samples);
            }
            other => panic!("unexpected {:?}", other),
        }

        assert!(pack_voice(8, &samples[..100]).is_err());
    }

    #[test]
    fn test_station_info_tlv() {
        let bytes = pack_station_info(3, &station()).unwrap();
        assert_eq!(bytes.len(), USRP_HEADER_LEN + TEXT_BODY_LEN);

        let body = &bytes[USRP_HEADER_LEN..];
        assert_eq!(body[0], tlv::SET_INFO);
        assert_eq!(body[1] as usize, SET_INFO_FIXED_LEN + 7);
        assert_eq!(&body[2..5], &[0x27, 0xFA, 0x61]);
        assert_eq!(parse_station_info(body).unwrap(), station());
    }

    #[test]
    fn test_station_info_rejects_wide_ids() {
        let mut info = station();
        info.tg = 0x100_0000;
        assert!(pack_station_info(1, &info).is_err());
    }

    #[test]
    fn test_mode_switch_layout() {
        let bytes = pack_mode_switch(9, "YSF").unwrap();
        let header = UsrpHeader::parse(&bytes).unwrap();
        assert_eq!(header.message_type(), Some(MessageType::Dtmf));
        assert_eq!(&bytes[32..37], &[0, 0, b'Y', b'S', b'F']);
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert_eq!(
            UsrpMessage::decode(b"USRP"),
            Err(NetworkError::MessageTooShort(4))
        );

        let mut bytes = pack_stop(1).to_vec();
        bytes[0] = b'X';
        assert_eq!(UsrpMessage::decode(&bytes), Err(NetworkError::BadMagic));

        // keyup set but no samples
        let mut bytes = pack_stop(1).to_vec();
        bytes[15] = 1;
        assert_eq!(
            UsrpMessage::decode(&bytes),
            Err(NetworkError::MessageTooShort(32))
        );
    }

    #[test]
    fn test_dtmf_talkgroup() {
        assert_eq!(parse_dtmf_tg(b"91\0\0").unwrap(), 91);
        assert_eq!(parse_dtmf_tg(b"TG 2621\0").unwrap(), 2621);
        assert!(parse_dtmf_tg(b"\0\0").is_err());
    }

    #[test]
    fn test_unknown_type_is_other() {
        let mut bytes = pack_stop(1).to_vec();
        bytes[23] = 42;
        assert!(matches!(
            UsrpMessage::decode(&bytes),
            Ok(UsrpMessage::Other { header }) if header.msg_type == 42
        ));
    }
}
