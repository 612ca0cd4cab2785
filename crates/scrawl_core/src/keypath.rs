use std::cmp::Ordering;

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeypathError {
    #[error("no element matches `{segment}` with operand `{operand}`")]
    UnmatchedPredicate { segment: String, operand: String },
    #[error("predicate `{segment}` applied to a non-collection value")]
    NotACollection { segment: String },
    #[error("unknown variable `{0}` in predicate operand")]
    UnknownVariable(String),
}

/// Splits a keypath into segments. Bracket notation is normalized
/// (`a[0][1]` becomes `a.0.1`) and repeated delimiters collapse. Delimiters
/// inside a `{...}` predicate body are left alone.
pub fn split(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;

    for ch in path.chars() {
        match ch {
            '{' => {
                depth += 1;
                current.push(ch);
            }
            '}' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            '.' | '[' | ']' if depth == 0 => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(ch),
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

/// Joins resolved segments back into a keypath string.
pub fn join(segments: &[String]) -> String {
    segments.join(".")
}

/// Walks `path` through `tree`. Objects index by key; arrays and strings by
/// numeric position. Returns `None` on the first miss.
pub fn get(tree: &Value, path: &str) -> Option<Value> {
    let segments = split(path);
    get_segments(tree, &segments)
}

fn get_segments(value: &Value, segments: &[String]) -> Option<Value> {
    let Some((segment, rest)) = segments.split_first() else {
        return Some(value.clone());
    };
    match value {
        Value::Object(map) => map
            .get(segment.as_str())
            .and_then(|child| get_segments(child, rest)),
        Value::Array(items) => segment
            .parse::<usize>()
            .ok()
            .and_then(|index| items.get(index))
            .and_then(|child| get_segments(child, rest)),
        Value::String(text) => {
            let index = segment.parse::<usize>().ok()?;
            let ch = text.chars().nth(index)?;
            get_segments(&Value::String(ch.to_string()), rest)
        }
        _ => None,
    }
}

/// Assigns `value` at `segments`, creating intermediate containers as
/// needed. With `merge`, a same-typed existing leaf is combined: sequences
/// and strings concatenate, numbers add, mappings union. Any other pairing
/// overwrites.
pub fn assign(tree: &mut Value, segments: &[String], value: Value, merge: bool) {
    let Some((last, walk)) = segments.split_last() else {
        set_leaf(tree, value, merge);
        return;
    };
    let mut current = tree;
    for segment in walk {
        current = child_slot(current, segment);
    }
    let slot = child_slot(current, last);
    set_leaf(slot, value, merge);
}

fn set_leaf(slot: &mut Value, value: Value, merge: bool) {
    if merge {
        let existing = std::mem::take(slot);
        *slot = merged(existing, value);
    } else {
        *slot = value;
    }
}

fn merged(existing: Value, incoming: Value) -> Value {
    match (existing, incoming) {
        (Value::Array(mut left), Value::Array(right)) => {
            left.extend(right);
            Value::Array(left)
        }
        (Value::String(left), Value::String(right)) => Value::String(left + &right),
        (Value::Number(left), Value::Number(right)) => {
            Value::from(left.as_f64().unwrap_or(0.0) + right.as_f64().unwrap_or(0.0))
        }
        (Value::Object(mut left), Value::Object(right)) => {
            for (key, value) in right {
                left.insert(key, value);
            }
            Value::Object(left)
        }
        (_, incoming) => incoming,
    }
}

fn child_slot<'a>(parent: &'a mut Value, segment: &str) -> &'a mut Value {
    let index = segment.parse::<usize>().ok();
    if parent.is_null() {
        *parent = match index {
            Some(_) => Value::Array(Vec::new()),
            None => Value::Object(Map::new()),
        };
    }
    let use_array = index.is_some() && parent.is_array();
    if !use_array && !parent.is_object() {
        *parent = Value::Object(Map::new());
    }
    match parent {
        Value::Array(items) if use_array => {
            let index = index.unwrap_or(0);
            while items.len() <= index {
                items.push(Value::Null);
            }
            &mut items[index]
        }
        Value::Object(map) => map.entry(segment.to_string()).or_insert(Value::Null),
        // Both arms above coerce `parent` into a container first.
        _ => unreachable!("child_slot parent is always a container"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Ge,
    Le,
    Gt,
    Lt,
}

struct Predicate<'a> {
    subkey: &'a str,
    op: Op,
    operand: &'a str,
    operand_is_var: bool,
}

fn parse_predicate(segment: &str) -> Option<Predicate<'_>> {
    let body = segment.strip_prefix("*{")?.strip_suffix('}')?;
    // Two-character operators first so `>=` is not read as `>` then `=`.
    for (token, op) in [
        ("!=", Op::Ne),
        (">=", Op::Ge),
        ("<=", Op::Le),
        ("=", Op::Eq),
        (">", Op::Gt),
        ("<", Op::Lt),
    ] {
        if let Some((subkey, operand)) = body.split_once(token) {
            let operand = operand.trim();
            let (operand, operand_is_var) = match operand.strip_prefix('$') {
                Some(name) => (name, true),
                None => (operand, false),
            };
            return Some(Predicate {
                subkey: subkey.trim(),
                op,
                operand,
                operand_is_var,
            });
        }
    }
    None
}

/// Resolves a keypath against `tree`, replacing each predicate segment
/// (`*{subkey OP [$]operand}`) with the key or index of the first element
/// of the current collection that satisfies it. An unmatched predicate is
/// an error in strict mode; otherwise the literal predicate text stands in
/// as a segment so a later `assign` can create a new entry.
pub fn resolve(
    tree: &Value,
    path: &str,
    vars: &Map<String, Value>,
    strict: bool,
) -> Result<Vec<String>, KeypathError> {
    let mut resolved = Vec::new();
    let mut current: Option<Value> = Some(tree.clone());

    for segment in split(path) {
        let segment = match parse_predicate(&segment) {
            Some(predicate) => {
                match resolve_predicate(current.as_ref(), &segment, &predicate, vars, strict)? {
                    Some(key) => key,
                    None => segment,
                }
            }
            None => segment,
        };
        current = current.and_then(|value| get_segments(&value, &[segment.clone()]));
        resolved.push(segment);
    }
    Ok(resolved)
}

fn resolve_predicate(
    current: Option<&Value>,
    segment: &str,
    predicate: &Predicate<'_>,
    vars: &Map<String, Value>,
    strict: bool,
) -> Result<Option<String>, KeypathError> {
    let operand = if predicate.operand_is_var {
        match vars.get(predicate.operand) {
            Some(value) => value.clone(),
            None => return Err(KeypathError::UnknownVariable(predicate.operand.to_string())),
        }
    } else {
        literal_operand(predicate.operand)
    };

    let entries: Vec<(String, &Value)> = match current {
        Some(Value::Object(map)) => map
            .iter()
            .map(|(key, value)| (key.clone(), value))
            .collect(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(index, value)| (index.to_string(), value))
            .collect(),
        _ => {
            if strict {
                return Err(KeypathError::NotACollection {
                    segment: segment.to_string(),
                });
            }
            return Ok(None);
        }
    };

    for (key, element) in entries {
        let Some(candidate) = element.get(predicate.subkey) else {
            continue;
        };
        if satisfies(predicate.op, candidate, &operand) {
            return Ok(Some(key));
        }
    }

    if strict {
        return Err(KeypathError::UnmatchedPredicate {
            segment: segment.to_string(),
            operand: value_text(&operand),
        });
    }
    Ok(None)
}

/// Literal operands keep their most natural JSON type.
fn literal_operand(text: &str) -> Value {
    if let Ok(number) = text.parse::<i64>() {
        return Value::from(number);
    }
    if let Ok(number) = text.parse::<f64>() {
        return Value::from(number);
    }
    match text {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(text.to_string()),
    }
}

fn satisfies(op: Op, left: &Value, right: &Value) -> bool {
    match op {
        Op::Eq => loose_eq(left, right),
        Op::Ne => !loose_eq(left, right),
        Op::Ge => matches!(compare(left, right), Some(Ordering::Greater | Ordering::Equal)),
        Op::Le => matches!(compare(left, right), Some(Ordering::Less | Ordering::Equal)),
        Op::Gt => matches!(compare(left, right), Some(Ordering::Greater)),
        Op::Lt => matches!(compare(left, right), Some(Ordering::Less)),
    }
}

/// Numbers compare numerically regardless of integer/float representation.
fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) if left.is_number() && right.is_number() => a == b,
        _ => left == right,
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
