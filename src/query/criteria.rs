//! Fluent criteria and query builders producing unmapped criteria documents.

use crate::document::{Document, Value};
use crate::errors::{MappingError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Asc => 1,
            Self::Desc => -1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Entry {
    key: String,
    is_value: Option<Value>,
    operators: Document,
}

/// `Criteria::where_("age").gte(18).and("name").is("x")`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    chain: Vec<Entry>,
}

impl Criteria {
    /// Empty criteria, typically followed by a combinator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn where_(key: impl Into<String>) -> Self {
        Self { chain: vec![Entry { key: key.into(), ..Entry::default() }] }
    }

    /// Starts a new key in the same criteria document.
    #[must_use]
    pub fn and(mut self, key: impl Into<String>) -> Self {
        self.chain.push(Entry { key: key.into(), ..Entry::default() });
        self
    }

    fn current(&mut self) -> &mut Entry {
        if self.chain.is_empty() {
            self.chain.push(Entry::default());
        }
        let last = self.chain.len() - 1;
        &mut self.chain[last]
    }

    fn op(mut self, op: &str, value: impl Into<Value>) -> Self {
        self.current().operators.insert(op, value);
        self
    }

    #[must_use]
    pub fn is(mut self, value: impl Into<Value>) -> Self {
        self.current().is_value = Some(value.into());
        self
    }

    #[must_use]
    pub fn ne(self, value: impl Into<Value>) -> Self {
        self.op("$ne", value)
    }

    #[must_use]
    pub fn in_<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Self {
        self.op("$in", collect(values))
    }

    #[must_use]
    pub fn nin<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Self {
        self.op("$nin", collect(values))
    }

    #[must_use]
    pub fn all<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Self {
        self.op("$all", collect(values))
    }

    #[must_use]
    pub fn gt(self, value: impl Into<Value>) -> Self {
        self.op("$gt", value)
    }

    #[must_use]
    pub fn gte(self, value: impl Into<Value>) -> Self {
        self.op("$gte", value)
    }

    #[must_use]
    pub fn lt(self, value: impl Into<Value>) -> Self {
        self.op("$lt", value)
    }

    #[must_use]
    pub fn lte(self, value: impl Into<Value>) -> Self {
        self.op("$lte", value)
    }

    #[must_use]
    pub fn exists(self, exists: bool) -> Self {
        self.op("$exists", exists)
    }

    #[must_use]
    pub fn size(self, size: i32) -> Self {
        self.op("$size", size)
    }

    #[must_use]
    pub fn regex(self, pattern: impl Into<String>) -> Self {
        self.op("$regex", pattern.into())
    }

    /// # Errors
    /// Propagates rendering errors of the nested criteria.
    pub fn elem_match(self, criteria: &Criteria) -> Result<Self> {
        Ok(self.op("$elemMatch", criteria.to_document()?))
    }

    /// `geometry` is a [`Point`](crate::document::Point) or [`GeoJson`](crate::document::GeoJson).
    #[must_use]
    pub fn near(self, geometry: impl Into<Value>) -> Self {
        self.op("$near", geometry)
    }

    #[must_use]
    pub fn near_sphere(self, geometry: impl Into<Value>) -> Self {
        self.op("$nearSphere", geometry)
    }

    /// Moves into the pending `$near`/`$nearSphere` document next to its `$geometry`.
    #[must_use]
    pub fn max_distance(mut self, distance: f64) -> Self {
        let entry = self.current();
        for op in ["$near", "$nearSphere"] {
            if let Some(geometry) = entry.operators.get(op).cloned() {
                let nested = match geometry {
                    Value::Document(mut d) => {
                        d.insert("$maxDistance", distance);
                        d
                    }
                    other => {
                        Document::new().append("$geometry", other).append("$maxDistance", distance)
                    }
                };
                entry.operators.insert(op, nested);
                return self;
            }
        }
        self.op("$maxDistance", distance)
    }

    #[must_use]
    pub fn within(self, geometry: impl Into<Value>) -> Self {
        self.op("$geoWithin", geometry)
    }

    #[must_use]
    pub fn intersects(self, geometry: impl Into<Value>) -> Self {
        self.op("$geoIntersects", geometry)
    }

    /// # Errors
    /// Propagates rendering errors of the nested criteria.
    pub fn and_operator(self, criteria: &[Criteria]) -> Result<Self> {
        self.combine("$and", criteria)
    }

    /// # Errors
    /// Propagates rendering errors of the nested criteria.
    pub fn or_operator(self, criteria: &[Criteria]) -> Result<Self> {
        self.combine("$or", criteria)
    }

    /// # Errors
    /// Propagates rendering errors of the nested criteria.
    pub fn nor_operator(self, criteria: &[Criteria]) -> Result<Self> {
        self.combine("$nor", criteria)
    }

    fn combine(mut self, key: &str, criteria: &[Criteria]) -> Result<Self> {
        let docs = criteria.iter().map(Criteria::to_document).collect::<Result<Vec<_>>>()?;
        match self.chain.last_mut() {
            Some(last) if last.key.is_empty() => {
                last.key = key.to_string();
                last.is_value = Some(docs.into());
            }
            _ => self.chain.push(Entry {
                key: key.to_string(),
                is_value: Some(docs.into()),
                operators: Document::new(),
            }),
        }
        Ok(self)
    }

    /// Renders the criteria chain.
    ///
    /// # Errors
    /// Returns `InvalidArgument` for a key used twice or a key with both an equality value and
    /// operators.
    pub fn to_document(&self) -> Result<Document> {
        let mut out = Document::new();
        for entry in self.chain.iter().filter(|e| !e.key.is_empty()) {
            if out.contains_key(&entry.key) {
                return Err(MappingError::InvalidArgument(format!(
                    "criteria for '{}' already defined",
                    entry.key
                )));
            }
            let value = match (&entry.is_value, entry.operators.is_empty()) {
                (Some(v), true) => v.clone(),
                (None, _) => Value::Document(entry.operators.clone()),
                (Some(_), false) => {
                    return Err(MappingError::InvalidArgument(format!(
                        "'{}' combines is() with operators",
                        entry.key
                    )));
                }
            };
            out.insert(entry.key.clone(), value);
        }
        Ok(out)
    }
}

fn collect<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Value {
    Value::Array(values.into_iter().map(Into::into).collect())
}

/// Criteria plus projection, sort and paging.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    criteria: Document,
    fields: Document,
    sort: Document,
    skip: Option<u64>,
    limit: Option<i64>,
}

impl Query {
    /// # Errors
    /// Propagates criteria rendering errors.
    pub fn new(criteria: &Criteria) -> Result<Self> {
        Ok(Self::from_document(criteria.to_document()?))
    }

    #[must_use]
    pub fn from_document(criteria: Document) -> Self {
        Self { criteria, ..Self::default() }
    }

    #[must_use]
    pub fn include(mut self, key: impl Into<String>) -> Self {
        self.fields.insert(key, 1);
        self
    }

    #[must_use]
    pub fn exclude(mut self, key: impl Into<String>) -> Self {
        self.fields.insert(key, 0);
        self
    }

    #[must_use]
    pub fn sort(mut self, direction: Direction, key: impl Into<String>) -> Self {
        self.sort.insert(key, direction.as_i32());
        self
    }

    /// Sorts on an explicit document, e.g. a `$meta` score sort.
    #[must_use]
    pub fn sort_by(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.sort.insert(key, value);
        self
    }

    #[must_use]
    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn criteria(&self) -> &Document {
        &self.criteria
    }

    #[must_use]
    pub fn fields(&self) -> &Document {
        &self.fields
    }

    #[must_use]
    pub fn sort_document(&self) -> &Document {
        &self.sort
    }

    #[must_use]
    pub fn skip_value(&self) -> Option<u64> {
        self.skip
    }

    #[must_use]
    pub fn limit_value(&self) -> Option<i64> {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::GeoJson;

    #[test]
    fn chains_keys() {
        let c = Criteria::where_("age").gte(18).lt(65).and("name").is("alice");
        let d = c.to_document().unwrap();
        let age = d.get("age").and_then(Value::as_document).unwrap();
        assert_eq!(age.get("$gte"), Some(&Value::from(18)));
        assert_eq!(age.get("$lt"), Some(&Value::from(65)));
        assert_eq!(d.get("name"), Some(&Value::from("alice")));
    }

    #[test]
    fn rejects_is_with_operators() {
        let err = Criteria::where_("a").is(1).gt(0).to_document().unwrap_err();
        assert!(matches!(err, MappingError::InvalidArgument(_)));
        assert!(Criteria::where_("a").is(1).and("a").is(2).to_document().is_err());
    }

    #[test]
    fn or_operator_on_empty_criteria() {
        let c = Criteria::new()
            .or_operator(&[Criteria::where_("a").is(1), Criteria::where_("b").is(2)])
            .unwrap();
        let d = c.to_document().unwrap();
        match d.get("$or") {
            Some(Value::Array(items)) => assert_eq!(items.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn max_distance_nests_into_near() {
        let c = Criteria::where_("location").near(GeoJson::point(1.0, 2.0)).max_distance(5.0);
        let d = c.to_document().unwrap();
        let near = d
            .get("location")
            .and_then(Value::as_document)
            .and_then(|l| l.get("$near"))
            .and_then(Value::as_document)
            .unwrap();
        assert_eq!(near.get("$maxDistance"), Some(&Value::from(5.0)));
        assert_eq!(near.get("$geometry"), Some(&Value::from(GeoJson::point(1.0, 2.0))));
    }
}
