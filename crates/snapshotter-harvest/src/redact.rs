//! Irreversible redaction of personally identifying fields.
//!
//! [`sanitize`] is applied to every member, channel and message before it is
//! written. It never fails: keys it has no rule for pass through unchanged.
//!
//! | Key | Treatment |
//! |---|---|
//! | identity keys ([`IDENTITY_KEYS`]) | [`PLACEHOLDER`] if set, otherwise `null` |
//! | `image*`, `status*`, `blocks` | dropped |
//! | `topic`, `purpose` | inner `value` (or the whole field) becomes [`PLACEHOLDER`] |
//! | `previous_names` | same number of [`PLACEHOLDER`]s |
//! | `text` | word runs masked with [`MASK`], `<...>` references kept |
//! | `files`, `attachments` | renamed to `<key>_count` holding the length |

use serde_json::{Map, Value};

/// Replacement for identity values.
pub const PLACEHOLDER: &str = "<obscured>";

/// Character used to mask words in message text.
pub const MASK: char = 'X';

/// Keys whose values identify a person.
pub const IDENTITY_KEYS: &[&str] = &[
    "enterprise_name",
    "email",
    "name",
    "name_normalized",
    "real_name",
    "real_name_normalized",
    "display_name",
    "display_name_normalized",
    "title",
    "phone",
    "skype",
    "first_name",
    "last_name",
];

const DROPPED_PREFIXES: &[&str] = &["image", "status"];
const DROPPED_KEYS: &[&str] = &["blocks"];
const COUNTED_KEYS: &[&str] = &["files", "attachments"];

/// Redact a record, recursing into nested objects.
pub fn sanitize(record: &Map<String, Value>) -> Map<String, Value> {
    let mut result = Map::new();

    for (key, value) in record {
        let key = key.as_str();

        if is_dropped(key) {
            continue;
        }

        if COUNTED_KEYS.contains(&key) {
            result.insert(format!("{}_count", key), Value::from(count(value)));
            continue;
        }

        let value = sanitize_value(value);

        let value = match key {
            k if IDENTITY_KEYS.contains(&k) => obscure(&value),
            "topic" | "purpose" => match value {
                Value::Object(mut inner) => {
                    inner.insert("value".to_string(), placeholder());
                    Value::Object(inner)
                }
                _ => placeholder(),
            },
            "previous_names" => match value {
                Value::Array(names) => Value::Array(vec![placeholder(); names.len()]),
                other if is_set(&other) => placeholder(),
                other => other,
            },
            "text" => match value {
                Value::String(text) => Value::String(mask_text(&text)),
                other => other,
            },
            _ => value,
        };

        result.insert(key.to_string(), value);
    }

    result
}

fn sanitize_value(value: &Value) -> Value {
    match value {
        Value::Object(inner) => Value::Object(sanitize(inner)),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_value).collect()),
        other => other.clone(),
    }
}

fn is_dropped(key: &str) -> bool {
    DROPPED_KEYS.contains(&key) || DROPPED_PREFIXES.iter().any(|p| key.starts_with(p))
}

fn placeholder() -> Value {
    Value::String(PLACEHOLDER.to_string())
}

/// Placeholder when a value was set, `null` otherwise.
fn obscure(value: &Value) -> Value {
    if is_set(value) { placeholder() } else { Value::Null }
}

fn is_set(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn count(value: &Value) -> usize {
    match value {
        Value::Array(items) => items.len(),
        Value::Null => 0,
        _ => 1,
    }
}

/// Mask every word in `text`, keeping `<...>` references intact.
///
/// A word is a maximal run of alphanumeric characters or `_`; each of its
/// characters becomes [`MASK`]. Everything else, including the full body of
/// a `<...>` span with no nested `<`, is copied as is, so the character count
/// never changes.
pub fn mask_text(text: &str) -> String {
    let mut masked = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(c) = rest.chars().next() {
        if c == '<'
            && let Some(end) = reference_end(rest)
        {
            masked.push_str(&rest[..=end]);
            rest = &rest[end + 1..];
            continue;
        }

        masked.push(if is_word_char(c) { MASK } else { c });
        rest = &rest[c.len_utf8()..];
    }

    masked
}

/// Byte index of the `>` closing the reference that starts at `text[0]`.
fn reference_end(text: &str) -> Option<usize> {
    let end = text[1..].find(['<', '>'])? + 1;
    (text.as_bytes()[end] == b'>').then_some(end)
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}
