use serde_json::Value;
use thiserror::Error;

use crate::notation::UtilityCall;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UtilityError {
    #[error("unknown utility `{0}` in pipeline")]
    UnknownUtility(String),
}

/// Applies a utility pipeline to a value, strictly in declared order.
///
/// Unrecognized names are a hard error rather than a silent pass-through.
pub fn apply_utils(ops: &[UtilityCall], value: Value) -> Result<Value, UtilityError> {
    let mut value = value;
    for op in ops {
        value = match op.name.as_str() {
            "prepend" => {
                let prefix = op.args.first().map(String::as_str).unwrap_or("");
                Value::String(format!("{prefix}{}", coerce_string(&value)))
            }
            "lowercase" => Value::String(coerce_string(&value).to_lowercase()),
            "slug" => Value::String(slugify(&coerce_string(&value))),
            "subtract" => {
                let minuend = coerce_number(&value);
                let subtrahend = op.args.first().and_then(|arg| arg.parse::<f64>().ok());
                Value::from(minuend - subtrahend.unwrap_or(0.0))
            }
            "clear_url_params" => {
                let text = coerce_string(&value);
                let cleared = text.split('?').next().unwrap_or(&text);
                Value::String(cleared.to_string())
            }
            "trim" => Value::String(coerce_string(&value).trim().to_string()),
            other => return Err(UtilityError::UnknownUtility(other.to_string())),
        };
    }
    Ok(value)
}

fn coerce_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn coerce_number(value: &Value) -> f64 {
    match value {
        Value::Number(number) => number.as_f64().unwrap_or(0.0),
        Value::String(text) => text.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// URL/filename-safe slug: lowercase alphanumeric runs joined by single
/// hyphens, everything else dropped.
fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_separator = false;
    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }
    slug
}
