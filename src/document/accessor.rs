//! Dotted-path access into BSON documents.

use bson::{Bson, Document as BsonDocument};

use crate::errors::{MappingError, Result};

/// Reads and writes values by dotted path.
///
/// Numeric segments index into arrays; inside documents they are ordinary keys.
pub struct DocumentAccessor<'a> {
    doc: &'a mut BsonDocument,
}

impl<'a> DocumentAccessor<'a> {
    pub fn new(doc: &'a mut BsonDocument) -> Self {
        Self { doc }
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Bson> {
        get(self.doc, path)
    }

    /// # Errors
    /// Returns `PathConflict` if an intermediate segment holds a non-document value.
    pub fn put(&mut self, path: &str, value: Bson) -> Result<()> {
        put(self.doc, path, value)
    }
}

/// Returns the value at `path`. A literal key equal to the full dotted path wins over traversal.
#[must_use]
pub fn get<'d>(doc: &'d BsonDocument, path: &str) -> Option<&'d Bson> {
    if let Some(v) = doc.get(path) {
        return Some(v);
    }
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut cur = doc.get(first)?;
    for part in parts {
        cur = match cur {
            Bson::Document(d) => d.get(part)?,
            Bson::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(cur)
}

#[must_use]
pub fn contains(doc: &BsonDocument, path: &str) -> bool {
    get(doc, path).is_some()
}

/// Writes `value` at `path`, creating intermediate documents as needed.
///
/// # Errors
/// Returns `PathConflict` when an existing intermediate value is neither a document nor an array
/// addressable by the numeric segment.
pub fn put(doc: &mut BsonDocument, path: &str, value: Bson) -> Result<()> {
    let segments: Vec<&str> = path.split('.').collect();
    let Some((last, intermediate)) = segments.split_last() else {
        return Err(MappingError::InvalidArgument("path must not be empty".into()));
    };
    if intermediate.is_empty() {
        doc.insert(*last, value);
        return Ok(());
    }
    let mut slot = nested_slot(doc, intermediate[0], path)?;
    for seg in &intermediate[1..] {
        slot = descend(slot, seg, path)?;
    }
    match slot {
        Bson::Document(d) => {
            d.insert(*last, value);
            Ok(())
        }
        Bson::Array(items) => match last.parse::<usize>() {
            Ok(i) if i < items.len() => {
                items[i] = value;
                Ok(())
            }
            _ => Err(conflict(path, last)),
        },
        _ => Err(conflict(path, last)),
    }
}

fn nested_slot<'d>(doc: &'d mut BsonDocument, key: &str, path: &str) -> Result<&'d mut Bson> {
    if !doc.contains_key(key) {
        doc.insert(key, BsonDocument::new());
    }
    match doc.get_mut(key) {
        Some(slot) if is_container(slot) => Ok(slot),
        _ => Err(conflict(path, key)),
    }
}

fn descend<'d>(slot: &'d mut Bson, seg: &str, path: &str) -> Result<&'d mut Bson> {
    match slot {
        Bson::Document(d) => nested_slot(d, seg, path),
        Bson::Array(items) => {
            let idx = seg.parse::<usize>().map_err(|_| conflict(path, seg))?;
            match items.get_mut(idx) {
                Some(next) if is_container(next) => Ok(next),
                _ => Err(conflict(path, seg)),
            }
        }
        _ => Err(conflict(path, seg)),
    }
}

fn is_container(v: &Bson) -> bool {
    matches!(v, Bson::Document(_) | Bson::Array(_))
}

fn conflict(path: &str, segment: &str) -> MappingError {
    MappingError::PathConflict { path: path.to_string(), segment: segment.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn put_creates_intermediate_documents() {
        let mut d = BsonDocument::new();
        put(&mut d, "a.b.c", Bson::Int32(1)).unwrap();
        put(&mut d, "a.b.d", Bson::Int32(2)).unwrap();
        assert_eq!(d, doc! { "a": { "b": { "c": 1, "d": 2 } } });
    }

    #[test]
    fn put_refuses_to_replace_scalar_intermediate() {
        let mut d = doc! { "a": 5 };
        let err = put(&mut d, "a.b", Bson::Int32(1)).unwrap_err();
        assert!(matches!(err, MappingError::PathConflict { .. }));
        assert_eq!(d, doc! { "a": 5 });
    }

    #[test]
    fn get_prefers_literal_dotted_key() {
        let d = doc! { "a.b": 1, "a": { "b": 2 } };
        assert_eq!(get(&d, "a.b"), Some(&Bson::Int32(1)));
        let d = doc! { "a": { "b": 2 } };
        assert_eq!(get(&d, "a.b"), Some(&Bson::Int32(2)));
    }

    #[test]
    fn get_indexes_arrays_with_numeric_segments() {
        let d = doc! { "list": [ { "name": "x" }, { "name": "y" } ], "map": { "1": "one" } };
        assert_eq!(get(&d, "list.1.name"), Some(&Bson::String("y".into())));
        assert_eq!(get(&d, "map.1"), Some(&Bson::String("one".into())));
        assert_eq!(get(&d, "list.7.name"), None);
        assert_eq!(get(&d, "list.name"), None);
    }

    #[test]
    fn put_descends_into_existing_arrays() {
        let mut d = doc! { "list": [ { "name": "x" } ] };
        let mut acc = DocumentAccessor::new(&mut d);
        acc.put("list.0.name", Bson::String("z".into())).unwrap();
        assert_eq!(acc.get("list.0.name"), Some(&Bson::String("z".into())));
        assert!(acc.put("list.3.name", Bson::Null).is_err());
    }
}
