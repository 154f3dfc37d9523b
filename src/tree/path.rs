//! Typed prop paths (`a.b[0].c`) resolved against widget props.

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

use crate::error::PathError;

pub type Props = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

/// Ordered accessor sequence into a props mapping. Never empty once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropPath {
    segments: Vec<PathSegment>,
}

impl PropPath {
    pub fn field(name: impl Into<String>) -> Self {
        Self {
            segments: vec![PathSegment::Field(name.into())],
        }
    }

    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if raw.is_empty() {
            return Err(PathError::Empty);
        }
        let malformed = || PathError::Malformed(raw.to_string());
        let mut segments = Vec::new();
        let mut field = String::new();
        let mut chars = raw.chars().peekable();
        // True right after `]`, where only `.` or `[` may follow.
        let mut closed = false;

        while let Some(c) = chars.next() {
            match c {
                '.' => {
                    if field.is_empty() && !closed {
                        return Err(malformed());
                    }
                    if !field.is_empty() {
                        segments.push(PathSegment::Field(std::mem::take(&mut field)));
                    }
                    closed = false;
                    if chars.peek().is_none() {
                        return Err(malformed());
                    }
                }
                '[' => {
                    if !field.is_empty() {
                        segments.push(PathSegment::Field(std::mem::take(&mut field)));
                    } else if segments.is_empty() {
                        return Err(malformed());
                    }
                    let mut digits = String::new();
                    loop {
                        match chars.next() {
                            Some(']') => break,
                            Some(d) if d.is_ascii_digit() => digits.push(d),
                            _ => return Err(malformed()),
                        }
                    }
                    let index = digits.parse::<usize>().map_err(|_| malformed())?;
                    segments.push(PathSegment::Index(index));
                    closed = true;
                }
                ']' => return Err(malformed()),
                other => {
                    if closed {
                        return Err(malformed());
                    }
                    field.push(other);
                }
            }
        }
        if !field.is_empty() {
            segments.push(PathSegment::Field(field));
        }
        if segments.is_empty() {
            return Err(malformed());
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// First field name, which is the top-level prop key.
    pub fn root_key(&self) -> &str {
        match &self.segments[0] {
            PathSegment::Field(name) => name,
            PathSegment::Index(_) => "",
        }
    }

    pub fn child_field(&self, name: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.segments.push(PathSegment::Field(name.into()));
        next
    }

    pub fn child_index(&self, index: usize) -> Self {
        let mut next = self.clone();
        next.segments.push(PathSegment::Index(index));
        next
    }
}

impl fmt::Display for PropPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Field(name) if idx == 0 => write!(f, "{name}")?,
                PathSegment::Field(name) => write!(f, ".{name}")?,
                PathSegment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

impl FromStr for PropPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

pub fn get<'a>(props: &'a Props, path: &PropPath) -> Option<&'a Value> {
    let mut segments = path.segments.iter();
    let mut current = match segments.next()? {
        PathSegment::Field(name) => props.get(name)?,
        PathSegment::Index(_) => return None,
    };
    for segment in segments {
        current = match (segment, current) {
            (PathSegment::Field(name), Value::Object(map)) => map.get(name)?,
            (PathSegment::Field(name), Value::Array(items)) => items.get(name.parse::<usize>().ok()?)?,
            (PathSegment::Index(index), Value::Array(items)) => items.get(*index)?,
            (PathSegment::Index(index), Value::Object(map)) => map.get(&index.to_string())?,
            _ => return None,
        };
    }
    Some(current)
}

/// Set `value` at `path`, creating intermediate objects/arrays as needed.
/// Siblings along the way are left untouched.
pub fn set(props: &mut Props, path: &PropPath, value: Value) -> Result<(), PathError> {
    let segments = &path.segments;
    let PathSegment::Field(first) = &segments[0] else {
        return Err(PathError::Malformed(path.to_string()));
    };
    if segments.len() == 1 {
        props.insert(first.clone(), value);
        return Ok(());
    }
    let slot = props
        .entry(first.clone())
        .or_insert_with(|| container_for(&segments[1]));
    set_in_value(slot, &segments[1..], value, first.clone())
}

fn set_in_value(
    target: &mut Value,
    segments: &[PathSegment],
    value: Value,
    trail: String,
) -> Result<(), PathError> {
    if target.is_null() {
        *target = container_for(&segments[0]);
    }
    let segment = &segments[0];
    let rest = &segments[1..];
    let (slot, trail) = match (segment, target) {
        (PathSegment::Field(name), Value::Object(map)) => {
            let trail = format!("{trail}.{name}");
            if rest.is_empty() {
                map.insert(name.clone(), value);
                return Ok(());
            }
            let slot = map
                .entry(name.clone())
                .or_insert_with(|| container_for(&rest[0]));
            (slot, trail)
        }
        (PathSegment::Field(name), Value::Array(items)) => {
            let index = name
                .parse::<usize>()
                .map_err(|_| PathError::NotAContainer(trail.clone()))?;
            (array_slot(items, index, rest, &trail)?, format!("{trail}[{index}]"))
        }
        (PathSegment::Index(index), Value::Array(items)) => {
            (array_slot(items, *index, rest, &trail)?, format!("{trail}[{index}]"))
        }
        (PathSegment::Index(index), Value::Object(map)) => {
            let key = index.to_string();
            if rest.is_empty() {
                map.insert(key, value);
                return Ok(());
            }
            let slot = map.entry(key).or_insert_with(|| container_for(&rest[0]));
            (slot, format!("{trail}[{index}]"))
        }
        _ => return Err(PathError::NotAContainer(trail)),
    };
    if rest.is_empty() {
        *slot = value;
        Ok(())
    } else {
        set_in_value(slot, rest, value, trail)
    }
}

/// How far past the end of a list a write may pad with nulls.
pub const MAX_LIST_GROWTH: usize = 1024;

fn array_slot<'a>(
    items: &'a mut Vec<Value>,
    index: usize,
    rest: &[PathSegment],
    trail: &str,
) -> Result<&'a mut Value, PathError> {
    let reachable = items
        .len()
        .checked_add(MAX_LIST_GROWTH)
        .is_some_and(|limit| index < limit);
    if !reachable {
        return Err(PathError::IndexOutOfRange {
            path: trail.to_string(),
            index,
        });
    }
    if items.len() <= index {
        items.resize(index + 1, Value::Null);
    }
    let slot = &mut items[index];
    if slot.is_null() {
        if let Some(next) = rest.first() {
            *slot = container_for(next);
        }
    }
    Ok(slot)
}

fn container_for(next: &PathSegment) -> Value {
    match next {
        PathSegment::Index(_) => Value::Array(Vec::new()),
        PathSegment::Field(_) => Value::Object(Map::new()),
    }
}

/// Merge an update slice into `target`.
///
/// Keys containing `.` or `[` are treated as prop paths; plain keys whose old
/// and new values are both objects merge recursively; anything else replaces.
/// Either the whole slice applies or `target` is left untouched.
pub fn merge_update_slice(target: &mut Props, slice: &Props) -> Result<(), PathError> {
    let mut next = target.clone();
    for (key, value) in slice {
        if key.contains('.') || key.contains('[') {
            let path = PropPath::parse(key)?;
            set(&mut next, &path, value.clone())?;
            continue;
        }
        match (next.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge(existing, incoming);
            }
            _ => {
                next.insert(key.clone(), value.clone());
            }
        }
    }
    *target = next;
    Ok(())
}

fn deep_merge(target: &mut Props, incoming: &Props) {
    for (key, value) in incoming {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(nested)) => deep_merge(existing, nested),
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Visit every string leaf with its path, in key order.
pub fn for_each_string<'a, F>(props: &'a Props, mut visit: F)
where
    F: FnMut(PropPath, &'a str),
{
    for (key, value) in props {
        walk(value, PropPath::field(key.clone()), &mut visit);
    }
}

fn walk<'a, F>(value: &'a Value, path: PropPath, visit: &mut F)
where
    F: FnMut(PropPath, &'a str),
{
    match value {
        Value::String(s) => visit(path, s),
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                walk(item, path.child_index(index), visit);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                walk(item, path.child_field(key.clone()), visit);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: Value) -> Props {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn parses_fields_and_indices() {
        let path = PropPath::parse("columns[2].label").unwrap();
        assert_eq!(
            path.segments(),
            &[
                PathSegment::Field("columns".into()),
                PathSegment::Index(2),
                PathSegment::Field("label".into()),
            ]
        );
        assert_eq!(path.to_string(), "columns[2].label");
        assert_eq!(path.root_key(), "columns");
    }

    #[test]
    fn rejects_malformed_paths() {
        for raw in ["", "a..b", ".a", "a.", "[0]", "a[x]", "a]", "a[0]b"] {
            assert!(PropPath::parse(raw).is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn set_keeps_siblings() {
        let mut target = props(json!({"a": {"b": {"c": 1, "d": 2}, "e": 3}}));
        set(&mut target, &"a.b.c".parse().unwrap(), json!(9)).unwrap();
        assert_eq!(Value::Object(target), json!({"a": {"b": {"c": 9, "d": 2}, "e": 3}}));
    }

    #[test]
    fn set_creates_missing_containers() {
        let mut target = Props::new();
        set(&mut target, &"list[1].name".parse().unwrap(), json!("x")).unwrap();
        assert_eq!(Value::Object(target), json!({"list": [null, {"name": "x"}]}));
    }

    #[test]
    fn set_rejects_indices_far_past_the_end() {
        let mut target = props(json!({"list": [1]}));
        let huge = format!("list[{}]", usize::MAX);
        let err = set(&mut target, &huge.parse().unwrap(), json!(2)).unwrap_err();
        assert!(matches!(err, PathError::IndexOutOfRange { index: usize::MAX, .. }));
        let far = format!("list[{}]", MAX_LIST_GROWTH + 1);
        assert!(set(&mut target, &far.parse().unwrap(), json!(2)).is_err());
        assert_eq!(target["list"], json!([1]));

        set(&mut target, &"list[2]".parse().unwrap(), json!(3)).unwrap();
        assert_eq!(target["list"], json!([1, null, 3]));
    }

    #[test]
    fn set_refuses_to_descend_into_scalars() {
        let mut target = props(json!({"a": 1}));
        let err = set(&mut target, &"a.b".parse().unwrap(), json!(2)).unwrap_err();
        assert_eq!(err, PathError::NotAContainer("a".into()));
    }

    #[test]
    fn merge_slice_is_deep_and_atomic() {
        let mut target = props(json!({"style": {"color": "red", "size": 2}, "label": "a"}));
        let slice = props(json!({"style": {"color": "blue"}, "meta.tag": "t"}));
        merge_update_slice(&mut target, &slice).unwrap();
        assert_eq!(
            Value::Object(target.clone()),
            json!({"style": {"color": "blue", "size": 2}, "label": "a", "meta": {"tag": "t"}})
        );

        let bad = props(json!({"label": "b", "label.x": 1}));
        assert!(merge_update_slice(&mut target, &bad).is_err());
        assert_eq!(target["label"], json!("a"));
    }

    #[test]
    fn walks_nested_strings_in_order() {
        let target = props(json!({"b": ["x", {"c": "y"}], "a": "z", "n": 1}));
        let mut seen = Vec::new();
        for_each_string(&target, |path, s| seen.push((path.to_string(), s.to_string())));
        assert_eq!(
            seen,
            vec![
                ("a".to_string(), "z".to_string()),
                ("b[0]".to_string(), "x".to_string()),
                ("b[1].c".to_string(), "y".to_string()),
            ]
        );
    }
}
