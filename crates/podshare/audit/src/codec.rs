//! Record encoding for audit log lines.
//!
//! New records are tagged JSON (`{"v":"1",...}`). Older logs hold positional
//! records, `ts;resource;owner;type;granter;recipient;perms;pattern[;expiry]`,
//! which are still decoded.

use chrono::{DateTime, SecondsFormat, Utc};
use podshare_types::{
    AuditEntry, AuditEntryId, AuditEntryType, Clock, Permission, PermissionSet, Principal,
    SharePattern,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("record is not valid JSON: {0}")]
    Json(String),

    #[error("positional record has {0} fields, expected 8 or 9")]
    FieldCount(usize),

    #[error("unknown entry type `{0}`")]
    EntryType(String),

    #[error("unreadable field `{field}`: {reason}")]
    Field { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "v")]
enum Record {
    #[serde(rename = "1")]
    V1(RecordV1),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct RecordV1 {
    /// Kept as text so a damaged timestamp does not lose the whole record.
    timestamp: String,
    resource: String,
    owner: String,
    granter: String,
    recipient: String,
    permissions: Vec<String>,
    #[serde(rename = "type")]
    entry_type: String,
    pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<String>,
}

/// A decoded record plus whether its timestamp had to be replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub entry: AuditEntry,
    pub timestamp_recovered: bool,
}

pub fn encode(entry: &AuditEntry) -> String {
    let record = Record::V1(RecordV1 {
        timestamp: rfc3339(entry.timestamp),
        resource: entry.resource.clone(),
        owner: entry.owner.to_string(),
        granter: entry.granter.to_string(),
        recipient: entry.recipient.to_string(),
        permissions: entry
            .permissions
            .iter()
            .map(|permission| permission.name().to_string())
            .collect(),
        entry_type: entry.entry_type.as_str().to_string(),
        pattern: entry.pattern.as_str().to_string(),
        expires_at: entry.expires_at.map(rfc3339),
    });
    // Serializing owned strings into a map cannot fail.
    serde_json::to_string(&record).unwrap_or_default()
}

/// Decode one record. A malformed timestamp is replaced with `clock.now()`
/// and reported through [`Decoded::timestamp_recovered`].
pub fn decode(id: AuditEntryId, raw: &str, clock: &dyn Clock) -> Result<Decoded, DecodeError> {
    let raw = raw.trim();
    let record = if raw.starts_with('{') {
        match serde_json::from_str::<Record>(raw) {
            Ok(Record::V1(record)) => record,
            Err(err) => return Err(DecodeError::Json(err.to_string())),
        }
    } else {
        positional(raw)?
    };

    let (timestamp, timestamp_recovered) = match parse_time(&record.timestamp) {
        Some(at) => (at, false),
        None => (clock.now(), true),
    };
    let entry_type = match record.entry_type.trim().to_ascii_lowercase().as_str() {
        "grant" => AuditEntryType::Grant,
        "revoke" => AuditEntryType::Revoke,
        other => return Err(DecodeError::EntryType(other.to_string())),
    };
    let permissions = record
        .permissions
        .iter()
        .map(|name| Permission::from_str(name))
        .collect::<Result<PermissionSet, _>>()
        .map_err(|err| DecodeError::Field {
            field: "permissions",
            reason: err.to_string(),
        })?;
    let pattern = SharePattern::from_str(&record.pattern).map_err(|err| DecodeError::Field {
        field: "pattern",
        reason: err.to_string(),
    })?;
    let expires_at = match record.expires_at.as_deref().map(str::trim) {
        None | Some("") | Some("none") => None,
        Some(value) => Some(parse_time(value).ok_or_else(|| DecodeError::Field {
            field: "expires_at",
            reason: format!("`{}` is not a timestamp", value),
        })?),
    };

    Ok(Decoded {
        entry: AuditEntry {
            id,
            timestamp,
            resource: record.resource,
            owner: Principal::normalized(&record.owner),
            granter: Principal::normalized(&record.granter),
            recipient: Principal::normalized(&record.recipient),
            permissions,
            entry_type,
            pattern,
            expires_at,
            timestamp_recovered,
        },
        timestamp_recovered,
    })
}

fn positional(raw: &str) -> Result<RecordV1, DecodeError> {
    let fields: Vec<&str> = raw.split(';').collect();
    if !(8..=9).contains(&fields.len()) {
        return Err(DecodeError::FieldCount(fields.len()));
    }
    Ok(RecordV1 {
        timestamp: fields[0].to_string(),
        resource: fields[1].to_string(),
        owner: fields[2].to_string(),
        entry_type: fields[3].to_string(),
        granter: fields[4].to_string(),
        recipient: fields[5].to_string(),
        permissions: fields[6]
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect(),
        pattern: fields[7].to_string(),
        expires_at: fields.get(8).map(|value| value.to_string()),
    })
}

fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};
    use podshare_types::FixedClock;

    fn id() -> AuditEntryId {
        AuditEntryId("0001714564800000-000001-abcd1234".to_string())
    }

    fn entry() -> AuditEntry {
        AuditEntry {
            id: id(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            resource: "https://alice.example/notes/a.ttl".to_string(),
            owner: Principal::parse("https://alice.example/profile/card#me").unwrap(),
            granter: Principal::parse("https://alice.example/profile/card#me").unwrap(),
            recipient: Principal::parse("https://bob.example/profile/card#me").unwrap(),
            permissions: PermissionSet::read_only(),
            entry_type: AuditEntryType::Grant,
            pattern: SharePattern::SharedRead,
            expires_at: None,
            timestamp_recovered: false,
        }
    }

    #[test]
    fn encoded_records_are_tagged_and_decode_back() {
        let encoded = encode(&entry());
        assert!(encoded.starts_with("{\"v\":\"1\""));
        assert!(encoded.contains("\"type\":\"grant\""));

        let clock = FixedClock(Utc::now());
        let decoded = decode(id(), &encoded, &clock).unwrap();
        assert_eq!(decoded.entry, entry());
        assert!(!decoded.timestamp_recovered);
    }

    #[test]
    fn sub_millisecond_times_survive_encoding() {
        let mut precise = entry();
        precise.timestamp = Utc
            .with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
            .unwrap()
            .with_nanosecond(123_456_789)
            .unwrap();
        precise.pattern = SharePattern::TimeLimited;
        precise.expires_at = Some(
            Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0)
                .unwrap()
                .with_nanosecond(1)
                .unwrap(),
        );

        let encoded = encode(&precise);
        assert!(encoded.contains("12:00:00.123456789Z"));
        let decoded = decode(id(), &encoded, &FixedClock(Utc::now())).unwrap();
        assert_eq!(decoded.entry, precise);
    }

    #[test]
    fn malformed_timestamp_falls_back_to_clock() {
        let encoded = encode(&entry()).replace("2024-05-01T12:00:00Z", "yesterday-ish");
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let decoded = decode(id(), &encoded, &FixedClock(now)).unwrap();

        assert!(decoded.timestamp_recovered);
        assert!(decoded.entry.timestamp_recovered);
        assert_eq!(decoded.entry.timestamp, now);
    }

    #[test]
    fn positional_records_decode() {
        let clock = FixedClock(Utc::now());
        let legacy = "2024-05-01T12:00:00Z;https://alice.example/notes/a.ttl;\
            https://alice.example/profile/card#me;grant;https://alice.example/profile/card#me;\
            https://BOB.example/profile/card/#me;Read;basic";
        let decoded = decode(id(), legacy, &clock).unwrap();
        assert_eq!(decoded.entry, entry());

        let with_expiry = format!(
            "{};time-limited;2024-06-01T00:00:00Z",
            legacy.trim_end_matches(";basic")
        );
        let decoded = decode(id(), &with_expiry, &clock).unwrap();
        assert_eq!(decoded.entry.pattern, SharePattern::TimeLimited);
        assert_eq!(
            decoded.entry.expires_at,
            Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn unreadable_records_are_rejected() {
        let clock = FixedClock(Utc::now());
        assert!(matches!(
            decode(id(), "a;b;c", &clock),
            Err(DecodeError::FieldCount(3))
        ));
        assert!(matches!(
            decode(id(), "{\"v\":\"9\"}", &clock),
            Err(DecodeError::Json(_))
        ));
        let bad_type = encode(&entry()).replace("\"grant\"", "\"borrow\"");
        assert!(matches!(
            decode(id(), &bad_type, &clock),
            Err(DecodeError::EntryType(_))
        ));
    }
}
