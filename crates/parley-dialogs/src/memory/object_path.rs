//! Path expressions over JSON memory
//!
//! A path is a sequence of `.`-separated property names and `[...]`
//! brackets. A bracket holds a quoted key (`['first name']`), an array
//! index (`[0]`), or a nested path expression whose value becomes the key or
//! index (`[dialog.currentField]`). Lookups match property names
//! case-insensitively.

use crate::error::{DialogError, DialogResult};
use serde_json::{Map, Value};
use std::fmt;

/// One resolved step of a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Object property
    Key(String),
    /// Array element
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::Index(index) => write!(f, "{}", index),
        }
    }
}

/// Split `path` into segments, evaluating nested bracket expressions with `eval`
pub fn parse_path<F>(path: &str, eval: F) -> DialogResult<Vec<PathSegment>>
where
    F: Fn(&str) -> DialogResult<Option<Value>>,
{
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars();

    while let Some(c) = chars.next() {
        match c {
            '.' => flush(&mut current, &mut segments),
            '[' => {
                flush(&mut current, &mut segments);

                let mut depth = 1;
                let mut quote: Option<char> = None;
                let mut inner = String::new();
                for c in chars.by_ref() {
                    if let Some(q) = quote {
                        if c == q {
                            quote = None;
                        }
                        inner.push(c);
                        continue;
                    }
                    match c {
                        '\'' | '"' => quote = Some(c),
                        '[' => depth += 1,
                        ']' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    inner.push(c);
                }

                if depth != 0 {
                    return Err(unbalanced(path));
                }
                segments.push(bracket_segment(inner.trim(), path, &eval)?);
            }
            ']' => return Err(unbalanced(path)),
            _ => current.push(c),
        }
    }
    flush(&mut current, &mut segments);

    Ok(segments)
}

fn flush(current: &mut String, segments: &mut Vec<PathSegment>) {
    let name = current.trim();
    if !name.is_empty() {
        segments.push(PathSegment::Key(name.to_string()));
    }
    current.clear();
}

fn unbalanced(path: &str) -> DialogError {
    DialogError::invalid_argument("path", format!("unbalanced brackets in '{}'", path))
}

fn bracket_segment<F>(inner: &str, path: &str, eval: &F) -> DialogResult<PathSegment>
where
    F: Fn(&str) -> DialogResult<Option<Value>>,
{
    if inner.is_empty() {
        return Err(DialogError::invalid_argument(
            "path",
            format!("empty brackets in '{}'", path),
        ));
    }

    let quoted = inner.len() >= 2
        && ((inner.starts_with('\'') && inner.ends_with('\''))
            || (inner.starts_with('"') && inner.ends_with('"')));
    if quoted {
        return Ok(PathSegment::Key(inner[1..inner.len() - 1].to_string()));
    }

    if let Ok(index) = inner.parse::<usize>() {
        return Ok(PathSegment::Index(index));
    }

    match eval(inner)? {
        Some(Value::String(key)) => Ok(PathSegment::Key(key)),
        Some(Value::Number(number)) => match number.as_u64() {
            Some(index) => Ok(PathSegment::Index(index as usize)),
            None => Err(unresolved(inner, path)),
        },
        _ => Err(unresolved(inner, path)),
    }
}

fn unresolved(inner: &str, path: &str) -> DialogError {
    DialogError::invalid_argument(
        "path",
        format!(
            "'[{}]' in '{}' did not resolve to a property name or index",
            inner, path
        ),
    )
}

/// Key in `map` matching `name`, exactly or ignoring ASCII case
fn existing_key(map: &Map<String, Value>, name: &str) -> String {
    if map.contains_key(name) {
        return name.to_string();
    }
    map.keys()
        .find(|key| key.eq_ignore_ascii_case(name))
        .cloned()
        .unwrap_or_else(|| name.to_string())
}

/// Case-insensitive property lookup
pub fn get_property<'v>(map: &'v Map<String, Value>, name: &str) -> Option<&'v Value> {
    map.get(name).or_else(|| {
        map.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    })
}

/// Follow `segments` from `root`
pub fn get_path_value<'v>(root: &'v Value, segments: &[PathSegment]) -> Option<&'v Value> {
    segments
        .iter()
        .try_fold(root, |current, segment| match segment {
            PathSegment::Key(name) => current.as_object().and_then(|map| get_property(map, name)),
            PathSegment::Index(index) => current.as_array().and_then(|items| items.get(*index)),
        })
}

/// How far past the end of an array a write may pad with nulls
pub const MAX_ARRAY_PADDING: usize = 1024;

/// Write `value` at `segments`, creating objects and padding arrays on the way.
///
/// An index more than [`MAX_ARRAY_PADDING`] past the end of its array is an
/// invalid argument.
pub fn set_path_value(
    root: &mut Map<String, Value>,
    segments: &[PathSegment],
    value: Value,
) -> DialogResult<()> {
    let Some((first, rest)) = segments.split_first() else {
        return Err(DialogError::invalid_argument(
            "path",
            "path must name a property",
        ));
    };
    let PathSegment::Key(name) = first else {
        return Err(DialogError::invalid_argument(
            "path",
            "scope memory is an object and cannot be indexed",
        ));
    };

    let key = existing_key(root, name);
    if rest.is_empty() {
        root.insert(key, value);
    } else {
        let slot = root.entry(key).or_insert(Value::Null);
        set_in_value(slot, rest, value)?;
    }
    Ok(())
}

fn set_in_value(target: &mut Value, segments: &[PathSegment], value: Value) -> DialogResult<()> {
    let Some((first, rest)) = segments.split_first() else {
        *target = value;
        return Ok(());
    };

    let slot = match first {
        PathSegment::Key(name) => {
            if !target.is_object() {
                *target = Value::Object(Map::new());
            }
            let Value::Object(map) = target else {
                return Err(DialogError::invalid_state("expected an object"));
            };
            let key = existing_key(map, name);
            map.entry(key).or_insert(Value::Null)
        }
        PathSegment::Index(index) => {
            if !target.is_array() {
                *target = Value::Array(Vec::new());
            }
            let Value::Array(items) = target else {
                return Err(DialogError::invalid_state("expected an array"));
            };
            if items.len() <= *index {
                let padding = index - items.len();
                let len = index
                    .checked_add(1)
                    .filter(|_| padding <= MAX_ARRAY_PADDING)
                    .ok_or_else(|| {
                        DialogError::invalid_argument(
                            "path",
                            format!(
                                "index {} is too far past the end of an array of {} items",
                                index,
                                items.len()
                            ),
                        )
                    })?;
                items.resize(len, Value::Null);
            }
            match items.get_mut(*index) {
                Some(slot) => slot,
                None => return Err(DialogError::invalid_state("array index out of range")),
            }
        }
    };
    set_in_value(slot, rest, value)
}

fn child_mut<'v>(value: &'v mut Value, segment: &PathSegment) -> Option<&'v mut Value> {
    match (value, segment) {
        (Value::Object(map), PathSegment::Key(name)) => {
            let key = existing_key(map, name);
            map.get_mut(&key)
        }
        (Value::Array(items), PathSegment::Index(index)) => items.get_mut(*index),
        _ => None,
    }
}

/// Remove the leaf at `segments`; returns whether something was removed
pub fn remove_path_value(root: &mut Map<String, Value>, segments: &[PathSegment]) -> bool {
    let Some((last, parents)) = segments.split_last() else {
        return false;
    };

    let Some((first, rest)) = parents.split_first() else {
        return match last {
            PathSegment::Key(name) => {
                let key = existing_key(root, name);
                root.remove(&key).is_some()
            }
            PathSegment::Index(_) => false,
        };
    };

    let PathSegment::Key(name) = first else {
        return false;
    };
    let key = existing_key(root, name);
    let Some(mut current) = root.get_mut(&key) else {
        return false;
    };
    for segment in rest {
        current = match child_mut(current, segment) {
            Some(child) => child,
            None => return false,
        };
    }

    match (current, last) {
        (Value::Object(map), PathSegment::Key(name)) => {
            let key = existing_key(map, name);
            map.remove(&key).is_some()
        }
        (Value::Array(items), PathSegment::Index(index)) if *index < items.len() => {
            items.remove(*index);
            true
        }
        _ => false,
    }
}
