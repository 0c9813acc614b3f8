//! Classification of text message bodies
//!
//! A text body is either a SET_INFO TLV or a NUL terminated string.
//! Strings starting with `INFO:` carry either an operator settings
//! message (`INFO:MSG:`) or an inline JSON identity document (`INFO:{`).

use serde_json::Value;

use super::message::{parse_station_info, tlv};
use crate::error::NetworkError;

/// Identity of a remote talker
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TalkerInfo {
    pub callsign: String,
    pub tg: u32,
    pub dmr_id: u32,
}

/// What a text body turned out to be
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Metadata {
    /// Identity from a TLV or a JSON document
    Talker(TalkerInfo),
    /// Trailing token of an `INFO:MSG:` string
    Settings(String),
    /// Any other `INFO:` string, accepted but not interpreted
    Info,
    /// Neither TLV nor a recognised string
    Unrecognized,
}

/// True if the body starts with a SET_INFO tag
pub fn is_tlv(body: &[u8]) -> bool {
    body.first() == Some(&tlv::SET_INFO)
}

pub fn classify(body: &[u8]) -> Result<Metadata, NetworkError> {
    if is_tlv(body) {
        let info = parse_station_info(body)?;
        return Ok(Metadata::Talker(TalkerInfo {
            callsign: info.callsign,
            tg: info.tg,
            dmr_id: info.dmr_id,
        }));
    }

    let end = body.iter().position(|&b| b == 0).unwrap_or(body.len());
    let text = String::from_utf8_lossy(&body[..end]);

    if let Some(pos) = text.find("INFO:MSG:") {
        let msg = &text[pos + "INFO:MSG:".len()..];
        let token = msg.rsplit(' ').next().unwrap_or(msg);
        return Ok(Metadata::Settings(token.to_string()));
    }

    if let Some(pos) = text.find("INFO:{") {
        let json = &text[pos + "INFO:".len()..];
        return match serde_json::from_str::<Value>(json) {
            Ok(doc) => Ok(Metadata::Talker(talker_from_json(&doc))),
            Err(e) => {
                tracing::warn!("Failed to parse metadata JSON: {}", e);
                Ok(Metadata::Unrecognized)
            }
        };
    }

    if text.contains("INFO:") {
        return Ok(Metadata::Info);
    }

    Ok(Metadata::Unrecognized)
}

fn talker_from_json(doc: &Value) -> TalkerInfo {
    let digital = &doc["digital"];
    TalkerInfo {
        callsign: digital["call"].as_str().unwrap_or_default().to_string(),
        tg: json_number(&digital["tg"]),
        dmr_id: json_number(&digital["rpt"]),
    }
}

/// Numbers arrive either as JSON numbers or as decimal strings
fn json_number(value: &Value) -> u32 {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()).unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::message::{pack_station_info, StationInfo};
    use crate::constants::USRP_HEADER_LEN;

    #[test]
    fn test_json_identity() {
        let body = br#"INFO:{"digital":{"call":"W1AW","tg":"9","rpt":"1"}}"#;
        assert_eq!(
            classify(body).unwrap(),
            Metadata::Talker(TalkerInfo {
                callsign: "W1AW".into(),
                tg: 9,
                dmr_id: 1
            })
        );
    }

    #[test]
    fn test_json_with_numbers_and_padding() {
        let mut body = br#"INFO:{"digital":{"call":"K1ABC","tg":91,"rpt":3100}}"#.to_vec();
        body.resize(320, 0);
        assert_eq!(
            classify(&body).unwrap(),
            Metadata::Talker(TalkerInfo {
                callsign: "K1ABC".into(),
                tg: 91,
                dmr_id: 3100
            })
        );
    }

    #[test]
    fn test_settings_message() {
        assert_eq!(
            classify(b"INFO:MSG:idle\0\0").unwrap(),
            Metadata::Settings("idle".into())
        );
        assert_eq!(
            classify(b"INFO:MSG:Mode set to DMR").unwrap(),
            Metadata::Settings("DMR".into())
        );
    }

    #[test]
    fn test_other_strings() {
        assert_eq!(classify(b"INFO:something").unwrap(), Metadata::Info);
        assert_eq!(classify(b"hello").unwrap(), Metadata::Unrecognized);
        assert_eq!(classify(b"INFO:{broken").unwrap(), Metadata::Unrecognized);
    }

    #[test]
    fn test_tlv_body() {
        let info = StationInfo {
            dmr_id: 3_100_001,
            rpt_id: 0,
            tg: 91,
            ts: 1,
            cc: 1,
            callsign: "N0CALL".into(),
        };
        let bytes = pack_station_info(1, &info).unwrap();
        assert_eq!(
            classify(&bytes[USRP_HEADER_LEN..]).unwrap(),
            Metadata::Talker(TalkerInfo {
                callsign: "N0CALL".into(),
                tg: 91,
                dmr_id: 3_100_001
            })
        );

        // truncated TLV is an error, not a fallthrough
        assert!(classify(&[tlv::SET_INFO, 40, 0, 0]).is_err());
    }
}
