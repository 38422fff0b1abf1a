//! Todo entity codec.
//!
//! Decoding checks shape and types only: every one of the six fields must be
//! present with the right JSON type. Values themselves are not range-checked,
//! so negative ids, empty text and odd date strings all decode.

use crate::types::{Timestamp, Todo, TodoId};
use serde_json::{Map, Value};
use thiserror::Error;

/// Field names every persisted record must carry
pub const REQUIRED_FIELDS: [&str; 6] = [
    "id",
    "text",
    "isCompleted",
    "createdAt",
    "lastUpdatedAt",
    "completedAt",
];

/// Why a persisted blob was rejected
#[derive(Error, Debug)]
pub enum CodecError {
    /// The blob is not JSON at all
    #[error("record is not valid JSON: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The blob is JSON but not an object
    #[error("record is not a JSON object")]
    NotAnObject,

    /// A required field is absent
    #[error("record is missing required field `{0}`")]
    MissingField(&'static str),

    /// A field is present with the wrong JSON type
    #[error("field `{field}` has the wrong type (expected {expected})")]
    WrongType {
        /// Offending field
        field: &'static str,
        /// What the field should hold
        expected: &'static str,
    },

    /// A collection blob is JSON but not an array
    #[error("collection is not a JSON array")]
    NotAnArray,

    /// Serialization failed
    #[error("could not serialize record: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Result of decoding a whole collection
#[derive(Debug, Default)]
pub struct DecodedCollection {
    /// Elements that decoded cleanly, in stored order
    pub records: Vec<Todo>,
    /// Position and reason for every rejected element
    pub rejected: Vec<(usize, CodecError)>,
}

/// Decodes one persisted record
///
/// # Errors
///
/// Returns a [`CodecError`] describing the first shape or type problem found.
pub fn decode(blob: &str) -> Result<Todo, CodecError> {
    let value: Value = serde_json::from_str(blob).map_err(CodecError::Malformed)?;
    decode_value(&value)
}

/// Decodes a record that has already been parsed as JSON
///
/// # Errors
///
/// Returns a [`CodecError`] describing the first shape or type problem found.
pub fn decode_value(value: &Value) -> Result<Todo, CodecError> {
    let record = value.as_object().ok_or(CodecError::NotAnObject)?;

    if let Some(missing) = REQUIRED_FIELDS.iter().find(|field| !record.contains_key(**field)) {
        return Err(CodecError::MissingField(*missing));
    }

    let id = record
        .get("id")
        .and_then(whole_number)
        .ok_or(CodecError::WrongType {
            field: "id",
            expected: "integer",
        })?;
    let text = record
        .get("text")
        .and_then(Value::as_str)
        .ok_or(CodecError::WrongType {
            field: "text",
            expected: "string",
        })?;
    let is_completed = record
        .get("isCompleted")
        .and_then(Value::as_bool)
        .ok_or(CodecError::WrongType {
            field: "isCompleted",
            expected: "boolean",
        })?;

    Ok(Todo {
        id: TodoId::new(id),
        text: text.to_string(),
        is_completed,
        created_at: optional_timestamp(record, "createdAt")?,
        last_updated_at: optional_timestamp(record, "lastUpdatedAt")?,
        completed_at: optional_timestamp(record, "completedAt")?,
    })
}

/// Integers, and floats with no fractional part that fit in an `i64`
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn whole_number(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        let float = value.as_f64()?;
        // i64::MAX as f64 rounds up to 2^63, one past the range
        let in_range = float >= i64::MIN as f64 && float < i64::MAX as f64;
        (float.fract() == 0.0 && in_range).then(|| float as i64)
    })
}

fn optional_timestamp(
    record: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<Timestamp>, CodecError> {
    match record.get(field) {
        Some(Value::String(raw)) => Ok(Some(Timestamp::from_raw(raw.as_str()))),
        Some(Value::Null) => Ok(None),
        Some(_) => Err(CodecError::WrongType {
            field,
            expected: "string or null",
        }),
        None => Err(CodecError::MissingField(field)),
    }
}

/// Serializes one record
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if serialization fails.
pub fn encode(todo: &Todo) -> Result<String, CodecError> {
    serde_json::to_string(todo).map_err(CodecError::Encode)
}

/// Decodes a collection stored as one JSON array
///
/// Bad elements are reported individually; the good ones are kept.
///
/// # Errors
///
/// Returns [`CodecError::Malformed`] or [`CodecError::NotAnArray`] when the
/// blob as a whole is unusable.
pub fn decode_collection(blob: &str) -> Result<DecodedCollection, CodecError> {
    let value: Value = serde_json::from_str(blob).map_err(CodecError::Malformed)?;
    let Value::Array(elements) = value else {
        return Err(CodecError::NotAnArray);
    };

    let mut decoded = DecodedCollection::default();
    for (index, element) in elements.iter().enumerate() {
        match decode_value(element) {
            Ok(todo) => decoded.records.push(todo),
            Err(error) => decoded.rejected.push((index, error)),
        }
    }
    Ok(decoded)
}

/// Serializes a whole collection as one JSON array
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if serialization fails.
pub fn encode_collection(todos: &[Todo]) -> Result<String, CodecError> {
    serde_json::to_string(todos).map_err(CodecError::Encode)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Tests can unwrap

    use super::*;
    use localtodo_core::environment::Clock;
    use localtodo_testing::test_clock;

    const WELL_FORMED: &str = r#"{"id":3,"text":"Walk dog","isCompleted":true,"createdAt":"2026-01-01T10:00:00.000Z","lastUpdatedAt":null,"completedAt":"2026-01-02T08:30:00.000Z"}"#;

    #[test]
    fn decodes_well_formed_record() {
        let todo = decode(WELL_FORMED).unwrap();
        assert_eq!(todo.id, TodoId::new(3));
        assert_eq!(todo.text, "Walk dog");
        assert!(todo.is_completed);
        assert_eq!(
            todo.created_at,
            Some(Timestamp::from_raw("2026-01-01T10:00:00.000Z"))
        );
        assert_eq!(todo.last_updated_at, None);
    }

    #[test]
    fn round_trips_to_equal_todo() {
        let mut todo = Todo::new(TodoId::new(7), "Buy milk", test_clock().now());
        todo.edit_text("Buy oat milk".to_string(), test_clock().now());

        let decoded = decode(&encode(&todo).unwrap()).unwrap();
        assert_eq!(decoded, todo);
    }

    #[test]
    fn encodes_camel_case_fields() {
        let todo = Todo::new(TodoId::new(1), "x", test_clock().now());
        let value: Value = serde_json::from_str(&encode(&todo).unwrap()).unwrap();
        let object = value.as_object().unwrap();
        for field in REQUIRED_FIELDS {
            assert!(object.contains_key(field), "missing {field}");
        }
        assert_eq!(object.len(), REQUIRED_FIELDS.len());
    }

    #[test]
    fn missing_last_updated_at_fails() {
        let blob = r#"{"id":3,"text":"a","isCompleted":false,"createdAt":"2026-01-01T10:00:00.000Z","completedAt":null}"#;
        assert!(matches!(
            decode(blob),
            Err(CodecError::MissingField("lastUpdatedAt"))
        ));
    }

    #[test]
    fn string_id_fails() {
        let blob = WELL_FORMED.replace(r#""id":3"#, r#""id":"3""#);
        assert!(matches!(
            decode(&blob),
            Err(CodecError::WrongType { field: "id", .. })
        ));
    }

    #[test]
    fn whole_float_id_is_accepted() {
        let blob = WELL_FORMED.replace(r#""id":3"#, r#""id":3.0"#);
        assert_eq!(decode(&blob).unwrap().id, TodoId::new(3));
    }

    #[test]
    fn fractional_or_huge_float_id_fails() {
        for id in ["2.5", "1e300"] {
            let blob = WELL_FORMED.replace(r#""id":3"#, &format!(r#""id":{id}"#));
            assert!(
                matches!(decode(&blob), Err(CodecError::WrongType { field: "id", .. })),
                "id {id} should be rejected"
            );
        }
    }

    #[test]
    fn wrong_types_fail() {
        let cases = [
            (r#""text":"Walk dog""#, r#""text":12"#, "text"),
            (r#""isCompleted":true"#, r#""isCompleted":"yes""#, "isCompleted"),
            (r#""lastUpdatedAt":null"#, r#""lastUpdatedAt":0"#, "lastUpdatedAt"),
        ];
        for (from, to, field) in cases {
            let blob = WELL_FORMED.replace(from, to);
            let result = decode(&blob);
            assert!(
                matches!(&result, Err(CodecError::WrongType { field: got, .. }) if *got == field),
                "expected wrong type for {field}, got {result:?}"
            );
        }
    }

    #[test]
    fn not_json_or_not_object_fails() {
        assert!(matches!(decode("{not json"), Err(CodecError::Malformed(_))));
        assert!(matches!(decode("[1,2]"), Err(CodecError::NotAnObject)));
        assert!(matches!(decode("null"), Err(CodecError::NotAnObject)));
    }

    #[test]
    fn values_are_not_range_checked() {
        let blob = r#"{"id":-4,"text":"","isCompleted":false,"createdAt":"not a date","lastUpdatedAt":null,"completedAt":null,"colour":"blue"}"#;
        let todo = decode(blob).unwrap();
        assert_eq!(todo.id, TodoId::new(-4));
        assert!(todo.text.is_empty());
        assert_eq!(todo.created_at.unwrap().parse(), None);
    }

    #[test]
    fn null_created_at_is_accepted() {
        let blob = WELL_FORMED.replace(r#""createdAt":"2026-01-01T10:00:00.000Z""#, r#""createdAt":null"#);
        assert_eq!(decode(&blob).unwrap().created_at, None);
    }

    #[test]
    fn collection_keeps_good_elements() {
        let blob = format!(r#"[{WELL_FORMED}, {{"id":"x"}}, 5]"#);
        let decoded = decode_collection(&blob).unwrap();

        assert_eq!(decoded.records.len(), 1);
        let rejected: Vec<usize> = decoded.rejected.iter().map(|(index, _)| *index).collect();
        assert_eq!(rejected, vec![1, 2]);
    }

    #[test]
    fn collection_must_be_array() {
        assert!(matches!(
            decode_collection(WELL_FORMED),
            Err(CodecError::NotAnArray)
        ));
    }

    #[test]
    fn collection_round_trip() {
        let now = test_clock().now();
        let todos = vec![
            Todo::new(TodoId::new(1), "a", now),
            Todo::new(TodoId::new(2), "b", now),
        ];
        let decoded = decode_collection(&encode_collection(&todos).unwrap()).unwrap();
        assert_eq!(decoded.records, todos);
        assert!(decoded.rejected.is_empty());
    }
}
