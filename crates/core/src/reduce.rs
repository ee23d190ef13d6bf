//! Object reducer for detail payloads.
//!
//! Detail dumps from integrations are full of empty fields, colour codes and
//! inline images that only waste chat space. `reduce_value` returns a pruned
//! copy; the input is never touched.

use serde_json::{Map, Value};

pub fn reduce_value(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(
            items.iter().map(reduce_value).filter(|item| !is_value_to_remove(item)).collect(),
        ),
        Value::Object(fields) => {
            let mut reduced = Map::new();
            for (key, field) in fields {
                if is_value_to_remove(field) {
                    continue;
                }
                let field = reduce_value(field);
                if is_value_to_remove(&field) {
                    continue;
                }
                reduced.insert(key.clone(), field);
            }
            Value::Object(reduced)
        }
        primitive => primitive.clone(),
    }
}

fn is_value_to_remove(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        Value::String(text) => {
            let text = text.trim();
            text.is_empty() || is_base64_image(text) || is_hex_colour(text)
        }
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// `data:image/<letters>;base64,`
fn is_base64_image(text: &str) -> bool {
    let Some(rest) = text.strip_prefix("data:image/") else {
        return false;
    };
    let subtype_len = rest.chars().take_while(char::is_ascii_alphabetic).count();
    rest[subtype_len..].starts_with(";base64,")
}

/// `#rgb` or `#rrggbb`
fn is_hex_colour(text: &str) -> bool {
    let Some(digits) = text.strip_prefix('#') else {
        return false;
    };
    matches!(digits.len(), 3 | 6) && digits.chars().all(|ch| ch.is_ascii_hexdigit())
}
