use core::fmt;

use chrono::DateTime;

use crate::{BitsAllocator, UidParts};

/// Diagnostic view of an id, as returned by [`UidGenerator::parse_uid`].
///
/// The `timestamp` field is the absolute UTC time the id was minted for,
/// rendered as `YYYY-MM-DD HH:MM:SS`.
///
/// [`UidGenerator::parse_uid`]: crate::UidGenerator::parse_uid
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParsedUid {
    /// The raw id.
    pub uid: u64,
    /// UTC date and time encoded in the id.
    pub timestamp: String,
    /// Seconds since the configured epoch.
    pub delta_seconds: u64,
    /// Instance (worker) id.
    pub instance_id: u64,
    /// Per-second sequence.
    pub sequence: u64,
}

impl ParsedUid {
    /// Decodes `uid` with `bits`, anchoring its timestamp at `epoch_seconds`.
    pub fn new(bits: &BitsAllocator, epoch_seconds: u64, uid: u64) -> Self {
        let UidParts {
            delta_seconds,
            worker_id,
            sequence,
        } = bits.parse(uid);

        let timestamp = epoch_seconds
            .checked_add(delta_seconds)
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .map_or_else(
                || format!("+{delta_seconds}s"),
                |dt| dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            );

        Self {
            uid,
            timestamp,
            delta_seconds,
            instance_id: worker_id,
            sequence,
        }
    }
}

impl fmt::Display for ParsedUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{\"uid\":\"{}\",\"timestamp\":\"{}\",\"instanceId\":\"{}\",\"sequence\":\"{}\"}}",
            self.uid, self.timestamp, self.instance_id, self.sequence
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPOCH_2021: u64 = 1_609_459_200;

    #[test]
    fn renders_absolute_utc_time() {
        let bits = BitsAllocator::new(32, 13, 18).unwrap();
        let uid = bits.allocate(100, 5, 1);
        let parsed = ParsedUid::new(&bits, EPOCH_2021, uid);

        assert_eq!(parsed.uid, uid);
        assert_eq!(parsed.timestamp, "2021-01-01 00:01:40");
        assert_eq!(parsed.delta_seconds, 100);
        assert_eq!(parsed.instance_id, 5);
        assert_eq!(parsed.sequence, 1);
    }

    #[test]
    fn display_is_json_like() {
        let bits = BitsAllocator::new(32, 13, 18).unwrap();
        let uid = bits.allocate(0, 2, 3);
        let text = ParsedUid::new(&bits, EPOCH_2021, uid).to_string();
        assert_eq!(
            text,
            format!(
                "{{\"uid\":\"{uid}\",\"timestamp\":\"2021-01-01 00:00:00\",\"instanceId\":\"2\",\"sequence\":\"3\"}}"
            )
        );
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serializes_with_camel_case_fields() {
        let bits = BitsAllocator::new(32, 13, 18).unwrap();
        let parsed = ParsedUid::new(&bits, EPOCH_2021, bits.allocate(1, 1, 1));
        let json = serde_json::to_value(&parsed).unwrap();
        assert_eq!(json["instanceId"], 1);
        assert_eq!(json["deltaSeconds"], 1);
        assert_eq!(json["timestamp"], "2021-01-01 00:00:01");

        let back: ParsedUid = serde_json::from_value(json).unwrap();
        assert_eq!(back, parsed);
    }
}
