//! Helpers for constructing, hashing and reading chunk payloads.

use crate::clock::current_timestamp_rfc3339;
use crate::processing::Chunk;
use crate::qdrant::filters::{DOCUMENT_ID_FIELD, FilterValue};
use crate::qdrant::types::ChunkRecord;
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Payload fields requested back from queries.
pub(crate) const CHUNK_PAYLOAD_FIELDS: [&str; 3] = [DOCUMENT_ID_FIELD, "chunk_index", "content"];

/// Build the payload stored alongside each chunk vector.
pub(crate) fn build_chunk_payload(document_id: &FilterValue, chunk: &Chunk) -> Value {
    json!({
        DOCUMENT_ID_FIELD: document_id.to_json(),
        "chunk_index": chunk.index,
        "content": chunk.text,
        "chunk_hash": compute_chunk_hash(&chunk.text),
        "indexed_at": current_timestamp_rfc3339(),
    })
}

/// Compute a deterministic SHA-256 hash for the chunk text.
pub fn compute_chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Deterministic point identifier for a document chunk, so re-indexing overwrites in place.
pub fn chunk_point_id(document_id: &FilterValue, chunk_index: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.to_json().to_string().as_bytes());
    hasher.update(b":");
    hasher.update(chunk_index.to_string().as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0_u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes).to_string()
}

/// Map a raw payload into the normalized chunk shape.
///
/// Returns `None` when the payload lacks a chunk index or content.
pub(crate) fn map_chunk_payload(payload: &Map<String, Value>) -> Option<ChunkRecord> {
    let id = payload.get(DOCUMENT_ID_FIELD).map(stringify_value)?;
    let chunk_index = payload
        .get("chunk_index")
        .and_then(Value::as_u64)
        .and_then(|index| usize::try_from(index).ok())?;
    let content = payload.get("content").and_then(Value::as_str)?.to_string();
    Some(ChunkRecord {
        id,
        chunk_index,
        content,
    })
}

fn stringify_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(index: usize, text: &str) -> Chunk {
        Chunk {
            index,
            text: text.into(),
            overlap: 0,
        }
    }

    #[test]
    fn chunk_hash_is_stable() {
        let h1 = compute_chunk_hash("Hello world");
        let h2 = compute_chunk_hash("Hello world");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn point_ids_are_deterministic_and_distinct() {
        let doc = FilterValue::Integer(42);
        assert_eq!(chunk_point_id(&doc, 0), chunk_point_id(&doc, 0));
        assert_ne!(chunk_point_id(&doc, 0), chunk_point_id(&doc, 1));
        assert_ne!(
            chunk_point_id(&doc, 0),
            chunk_point_id(&FilterValue::Text("42".into()), 0)
        );
        assert!(Uuid::parse_str(&chunk_point_id(&doc, 3)).is_ok());
    }

    #[test]
    fn payload_carries_document_fields() {
        let payload = build_chunk_payload(&FilterValue::Integer(7), &chunk(2, "正文。"));
        assert_eq!(payload["id"], 7);
        assert_eq!(payload["chunk_index"], 2);
        assert_eq!(payload["content"], "正文。");
        assert_eq!(payload["chunk_hash"], compute_chunk_hash("正文。"));
    }

    #[test]
    fn map_chunk_payload_normalizes_ids() {
        let payload = build_chunk_payload(&FilterValue::Integer(7), &chunk(1, "text"));
        let record = map_chunk_payload(payload.as_object().expect("object")).expect("record");
        assert_eq!(
            record,
            ChunkRecord {
                id: "7".into(),
                chunk_index: 1,
                content: "text".into(),
            }
        );
    }

    #[test]
    fn map_chunk_payload_skips_incomplete_payloads() {
        let mut payload = Map::new();
        payload.insert("id".into(), Value::String("doc".into()));
        payload.insert("content".into(), Value::String("text".into()));
        assert!(map_chunk_payload(&payload).is_none());
    }
}
