//! `$sort`, `$match`, `$limit` and `$skip`: stages that leave the exposed fields unchanged.

use bson::{Bson, Document as BsonDocument, doc};

use crate::aggregation::context::AggregationContext;
use crate::document::{Document, Value};
use crate::errors::{MappingError, Result};
use crate::query::Criteria;
use crate::query::Direction;
use crate::query::keywords;

#[derive(Debug, Clone, PartialEq)]
pub struct SortOperation {
    orders: Vec<(String, Direction)>,
}

#[must_use]
pub fn sort(direction: Direction, keys: &[&str]) -> SortOperation {
    SortOperation { orders: Vec::new() }.and(direction, keys)
}

impl SortOperation {
    #[must_use]
    pub fn and(mut self, direction: Direction, keys: &[&str]) -> Self {
        self.orders.extend(keys.iter().map(|k| ((*k).to_string(), direction)));
        self
    }

    /// # Errors
    /// Returns `InvalidReference` for a key not exposed to this stage.
    pub fn render(&self, ctx: &AggregationContext<'_>) -> Result<BsonDocument> {
        let mut body = BsonDocument::new();
        for (key, direction) in &self.orders {
            let reference = ctx.reference(key)?;
            body.insert(reference.raw(), direction.as_i32());
        }
        Ok(doc! { "$sort": body })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchOperation {
    criteria: Document,
}

/// `$match` over a criteria chain.
///
/// # Errors
/// Returns `InvalidArgument` when the chain does not render.
pub fn matching(criteria: &Criteria) -> Result<MatchOperation> {
    Ok(MatchOperation { criteria: criteria.to_document()? })
}

/// `$match` over a raw criteria document.
#[must_use]
pub fn matching_document(criteria: Document) -> MatchOperation {
    MatchOperation { criteria }
}

impl MatchOperation {
    /// At an entity-backed root keys map through the entity; after narrowing each key is rewritten
    /// to the path it was exposed under (`a` → `_id.a` after a group).
    ///
    /// # Errors
    /// Returns `InvalidReference` for unexposed keys and query mapping errors.
    pub fn render(&self, ctx: &AggregationContext<'_>) -> Result<BsonDocument> {
        let keyed = resolve_keys(&self.criteria, ctx)?;
        let criteria = if ctx.is_narrowed() { &keyed } else { &self.criteria };
        Ok(doc! { "$match": ctx.map_criteria(criteria)? })
    }
}

/// Every field key, including those under combinators, must be visible to the stage. Returns the
/// criteria keyed by exposed paths.
fn resolve_keys(criteria: &Document, ctx: &AggregationContext<'_>) -> Result<Document> {
    let mut keyed = Document::new();
    for (key, value) in criteria.iter() {
        if keywords::is_combinator(key) {
            let Value::Array(items) = value else {
                return Err(MappingError::malformed(key, "array", value.type_label()));
            };
            let mut nested = Vec::with_capacity(items.len());
            for item in items {
                let branch = item
                    .as_document()
                    .ok_or_else(|| MappingError::malformed(key, "document", item.type_label()))?;
                nested.push(Value::Document(resolve_keys(branch, ctx)?));
            }
            keyed.insert(key.as_str(), Value::Array(nested));
        } else if keywords::has_sigil(key) {
            keyed.insert(key.as_str(), value.clone());
        } else {
            let reference = ctx.reference(key)?;
            keyed.insert(reference.raw(), value.clone());
        }
    }
    Ok(keyed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitOperation(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkipOperation(pub i64);

#[must_use]
pub fn limit(n: i64) -> LimitOperation {
    LimitOperation(n)
}

#[must_use]
pub fn skip(n: i64) -> SkipOperation {
    SkipOperation(n)
}

impl LimitOperation {
    #[must_use]
    pub fn render(&self) -> BsonDocument {
        doc! { "$limit": Bson::Int64(self.0) }
    }
}

impl SkipOperation {
    #[must_use]
    pub fn render(&self) -> BsonDocument {
        doc! { "$skip": Bson::Int64(self.0) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::fields::{ExposedField, ExposedFields};
    use crate::config::MapperConfig;

    #[test]
    fn sort_uses_group_key_path() {
        let cfg = MapperConfig::default();
        let mut ctx = AggregationContext::untyped(&cfg);
        ctx.expose(ExposedFields::closed(vec![ExposedField::plain("_id"), ExposedField::synthetic("a")]));
        let rendered = sort(Direction::Desc, &["a"]).render(&ctx).unwrap();
        assert_eq!(rendered, doc! { "$sort": { "_id.a": -1 } });
    }

    #[test]
    fn match_checks_keys_inside_combinators() {
        let cfg = MapperConfig::default();
        let mut ctx = AggregationContext::untyped(&cfg);
        ctx.expose(ExposedFields::closed(vec![ExposedField::plain("a")]));
        ctx.enter(2, "$match");
        let ok = matching(&Criteria::where_("a").gte(1)).unwrap();
        assert_eq!(ok.render(&ctx).unwrap(), doc! { "$match": { "a": { "$gte": 1 } } });
        let bad = Criteria::new()
            .or_operator(&[Criteria::where_("a").is(1), Criteria::where_("b").is(2)])
            .unwrap();
        let err = matching(&bad).unwrap().render(&ctx).unwrap_err();
        assert!(matches!(err, MappingError::InvalidReference { ref field, .. } if field == "b"));
    }

    #[test]
    fn match_after_group_reads_keys_from_id() {
        let cfg = MapperConfig::default();
        let mut ctx = AggregationContext::untyped(&cfg);
        ctx.expose(ExposedFields::closed(vec![
            ExposedField::plain("_id"),
            ExposedField::synthetic("a"),
            ExposedField::plain("cnt"),
        ]));
        let criteria = Criteria::new()
            .or_operator(&[Criteria::where_("a").is(1), Criteria::where_("cnt").gt(2)])
            .unwrap();
        assert_eq!(
            matching(&criteria).unwrap().render(&ctx).unwrap(),
            doc! { "$match": { "$or": [ { "_id.a": 1 }, { "cnt": { "$gt": 2 } } ] } }
        );
    }

    #[test]
    fn limit_and_skip() {
        assert_eq!(limit(5).render(), doc! { "$limit": 5_i64 });
        assert_eq!(skip(10).render(), doc! { "$skip": 10_i64 });
    }
}
