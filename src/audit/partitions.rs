/// Key layout and naming rules for audit collections
///
/// Each collection is one Fjall partition:
/// - `{collection}`: rec:{record_id} -> AuditRecord (JSON)
use uuid::Uuid;

use super::record::RecordId;

const RECORD_PREFIX: &str = "rec:";
const MAX_COLLECTION_NAME_LEN: usize = 255;

/// Encode a record key: rec:{record_id}
pub fn encode_record_key(id: &RecordId) -> Vec<u8> {
    format!("{}{}", RECORD_PREFIX, id).into_bytes()
}

/// Decode a record key: rec:{record_id} -> record_id
pub fn decode_record_key(key: &[u8]) -> Option<RecordId> {
    let key_str = std::str::from_utf8(key).ok()?;
    let raw = key_str.strip_prefix(RECORD_PREFIX)?;
    Uuid::parse_str(raw).ok().map(RecordId::from)
}

/// Collection names double as partition names, so they are restricted to
/// the characters Fjall accepts.
pub fn is_valid_collection_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_COLLECTION_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '#' | '$'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_key_encoding() {
        let id = RecordId::new();
        let key = encode_record_key(&id);
        assert!(key.starts_with(b"rec:"));
        assert_eq!(decode_record_key(&key), Some(id));
    }

    #[test]
    fn test_decode_rejects_foreign_keys() {
        assert_eq!(decode_record_key(b"meta:last_prune"), None);
        assert_eq!(decode_record_key(b"rec:not-a-uuid"), None);
    }

    #[test]
    fn test_collection_names() {
        assert!(is_valid_collection_name("CRON_LOGS"));
        assert!(is_valid_collection_name("audit-2024"));
        assert!(!is_valid_collection_name(""));
        assert!(!is_valid_collection_name("cron logs"));
        assert!(!is_valid_collection_name("cron/logs"));
    }
}
