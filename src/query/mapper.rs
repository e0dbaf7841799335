//! Query mapper: rewrites criteria, sort and fields documents into their wire form.
//!
//! Every key is classified once: combinator, operator, mapped property path or opaque data. The
//! input is only borrowed and every level of the output is freshly built.

use bson::{Bson, Document as BsonDocument, doc};

use crate::config::MapperConfig;
use crate::convert::ValueConverter;
use crate::dev6;
use crate::document::{Document, Value};
use crate::errors::{MappingError, Result};
use crate::mapping::path::{FieldPathResolver, ResolvedPath};
use crate::mapping::{MappingMetadata, PersistentEntity};
use crate::query::criteria::Query;
use crate::query::keywords;

/// Criteria, projection and sort mapped against one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedQuery {
    pub filter: BsonDocument,
    pub projection: BsonDocument,
    pub sort: BsonDocument,
    pub skip: Option<u64>,
    pub limit: Option<i64>,
}

#[derive(Clone, Copy)]
pub struct QueryMapper<'m> {
    resolver: FieldPathResolver<'m>,
    converter: ValueConverter<'m>,
}

impl<'m> QueryMapper<'m> {
    #[must_use]
    pub fn new(metadata: &'m dyn MappingMetadata, config: &'m MapperConfig) -> Self {
        Self {
            resolver: FieldPathResolver::new(metadata),
            converter: ValueConverter::new(metadata, config),
        }
    }

    #[must_use]
    pub fn converter(&self) -> &ValueConverter<'m> {
        &self.converter
    }

    #[must_use]
    pub fn resolver(&self) -> &FieldPathResolver<'m> {
        &self.resolver
    }

    /// Maps a criteria document.
    ///
    /// # Errors
    /// `MalformedInput` when an operator requires a different operand shape, `DepthExceeded` on
    /// over-deep input, and conversion errors such as `UnresolvableReference`.
    pub fn map_query(
        &self,
        query: &Document,
        entity: Option<&'m PersistentEntity>,
    ) -> Result<BsonDocument> {
        log::debug!(
            "map_query: {} key(s) against {}",
            query.len(),
            entity.map_or("<untyped>", PersistentEntity::name)
        );
        self.map_object(query, entity, 0)
    }

    /// Maps criteria, fields and sort of a query and carries paging.
    ///
    /// # Errors
    /// See [`QueryMapper::map_query`].
    pub fn map(&self, query: &Query, entity: Option<&'m PersistentEntity>) -> Result<MappedQuery> {
        Ok(MappedQuery {
            filter: self.map_query(query.criteria(), entity)?,
            projection: self.map_fields(query.fields(), entity),
            sort: self.map_sort(query.sort_document(), entity),
            skip: query.skip_value(),
            limit: query.limit_value(),
        })
    }

    fn map_object(
        &self,
        doc: &Document,
        entity: Option<&'m PersistentEntity>,
        depth: usize,
    ) -> Result<BsonDocument> {
        self.converter.check_depth(depth)?;
        let mut out = BsonDocument::new();
        for (key, value) in doc.iter() {
            if keywords::is_combinator(key) {
                dev6!("map_object: combinator {key}");
                out.insert(key.clone(), self.map_combinator(key, value, entity, depth)?);
            } else if keywords::has_sigil(key) {
                dev6!("map_object: top-level operator {key} copied");
                out.insert(key.clone(), self.converter.convert(value, None, depth + 1)?);
            } else {
                let path = self.resolver.resolve(key, entity);
                let mapped_key = path.mapped_key();
                dev6!("map_object: key {key} -> {mapped_key}");
                let mapped = self.map_value(value, &path, depth + 1)?;
                out.insert(mapped_key, mapped);
            }
        }
        Ok(out)
    }

    fn map_combinator(
        &self,
        key: &str,
        value: &Value,
        entity: Option<&'m PersistentEntity>,
        depth: usize,
    ) -> Result<Bson> {
        let Value::Array(items) = value else {
            return Err(MappingError::malformed(key, "array of documents", value.type_label()));
        };
        let mut mapped = Vec::with_capacity(items.len());
        for item in items {
            let Value::Document(d) = item else {
                return Err(MappingError::malformed(key, "array of documents", item.type_label()));
            };
            mapped.push(Bson::Document(self.map_object(d, entity, depth + 1)?));
        }
        Ok(Bson::Array(mapped))
    }

    /// Value under a property path.
    fn map_value(&self, value: &Value, path: &ResolvedPath<'m>, depth: usize) -> Result<Bson> {
        if let Value::Document(d) = value {
            return self.map_nested(d, path, depth);
        }
        if let Some(association) = path.association() {
            return self.converter.convert_association(value, association.property, depth);
        }
        if path.is_id_field() {
            return self.converter.convert_id(value, path.leaf_property(), depth);
        }
        match value {
            Value::Array(items) => items
                .iter()
                .map(|v| self.map_value(v, path, depth + 1))
                .collect::<Result<Vec<_>>>()
                .map(Bson::Array),
            other => self.converter.convert(other, path.leaf_type(), depth),
        }
    }

    fn map_nested(&self, d: &Document, path: &ResolvedPath<'m>, depth: usize) -> Result<Bson> {
        self.converter.check_depth(depth)?;
        if keywords::has_unrecognized_sigil(d) {
            dev6!("map_nested: opaque document under {}", path.mapped_key());
            return Ok(Bson::Document(d.to_bson_document()));
        }
        if keywords::is_operator_document(d) {
            return self.map_operators(d, path, depth).map(Bson::Document);
        }
        if let Some(association) = path.association() {
            dev6!("map_nested: association entries under {}", path.mapped_key());
            let mut out = BsonDocument::new();
            for (k, v) in d.iter() {
                let mapped = self.converter.convert_association(v, association.property, depth + 1)?;
                out.insert(k.clone(), mapped);
            }
            return Ok(Bson::Document(out));
        }
        self.map_object(d, path.leaf_entity(), depth).map(Bson::Document)
    }

    fn map_operators(
        &self,
        d: &Document,
        path: &ResolvedPath<'m>,
        depth: usize,
    ) -> Result<BsonDocument> {
        let mut out = BsonDocument::new();
        for (op, operand) in d.iter() {
            let mapped = match op.as_str() {
                o if keywords::OPAQUE_OPERAND.contains(&o) => operand.to_bson(),
                o if keywords::is_geo_operator(o) => {
                    dev6!("map_operators: geometry for {o}");
                    self.converter.convert_geometry(operand, depth + 1)?
                }
                o if keywords::LIST_OPERATORS.contains(&o) => {
                    let Value::Array(items) = operand else {
                        return Err(MappingError::malformed(o, "array", operand.type_label()));
                    };
                    let mapped = items
                        .iter()
                        .map(|v| self.map_value(v, path, depth + 1))
                        .collect::<Result<Vec<_>>>()?;
                    Bson::Array(mapped)
                }
                "$not" => match operand {
                    Value::Document(inner) if keywords::is_operator_document(inner) => {
                        Bson::Document(self.map_operators(inner, path, depth + 1)?)
                    }
                    other => self.map_value(other, path, depth + 1)?,
                },
                "$elemMatch" => match operand {
                    Value::Document(inner) if keywords::is_operator_document(inner) => {
                        Bson::Document(self.map_operators(inner, path, depth + 1)?)
                    }
                    Value::Document(inner) => {
                        Bson::Document(self.map_object(inner, path.leaf_entity(), depth + 1)?)
                    }
                    other => {
                        return Err(MappingError::malformed(op, "document", other.type_label()));
                    }
                },
                _ => self.map_value(operand, path, depth + 1)?,
            };
            out.insert(op.clone(), mapped);
        }
        Ok(out)
    }

    /// Rewrites sort keys; direction values are untouched. A sort on the text-score property
    /// becomes a `$meta` sort.
    #[must_use]
    pub fn map_sort(&self, sort: &Document, entity: Option<&'m PersistentEntity>) -> BsonDocument {
        let mut out = BsonDocument::new();
        for (key, value) in sort.iter() {
            let path = self.resolver.resolve(key, entity);
            match path.leaf_property() {
                Some(p) if p.is_text_score() => {
                    out.insert(p.field_name(), text_score_meta());
                }
                _ => {
                    out.insert(path.mapped_key(), value.to_bson());
                }
            }
        }
        out
    }

    /// Rewrites projection keys. A declared text-score property is always projected as `$meta`
    /// unless explicitly excluded.
    #[must_use]
    pub fn map_fields(
        &self,
        fields: &Document,
        entity: Option<&'m PersistentEntity>,
    ) -> BsonDocument {
        let mut out = BsonDocument::new();
        let mut score_excluded = false;
        for (key, value) in fields.iter() {
            let path = self.resolver.resolve(key, entity);
            match path.leaf_property() {
                Some(p) if p.is_text_score() && is_exclusion(value) => {
                    score_excluded = true;
                    out.insert(p.field_name(), value.to_bson());
                }
                Some(p) if p.is_text_score() => {
                    out.insert(p.field_name(), text_score_meta());
                }
                _ => {
                    out.insert(path.mapped_key(), value.to_bson());
                }
            }
        }
        if let Some(score) = entity.and_then(PersistentEntity::text_score_property)
            && !score_excluded
            && !out.contains_key(score.field_name())
        {
            out.insert(score.field_name(), text_score_meta());
        }
        out
    }
}

fn text_score_meta() -> BsonDocument {
    doc! { "$meta": "textScore" }
}

fn is_exclusion(value: &Value) -> bool {
    matches!(
        value,
        Value::Scalar(Bson::Int32(0) | Bson::Int64(0) | Bson::Boolean(false))
    ) || matches!(value, Value::Scalar(Bson::Double(d)) if *d == 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{MappingContext, PersistentProperty as Prop, PropertyType};
    use crate::utils::devlog;

    fn context() -> MappingContext {
        let mut ctx = MappingContext::new();
        ctx.register(
            PersistentEntity::builder("Sample")
                .property(Prop::new("id", PropertyType::string()))
                .property(Prop::new("name", PropertyType::string()).field("n"))
                .build()
                .unwrap(),
        )
        .unwrap();
        ctx
    }

    #[test]
    fn renames_keys_and_records_classification() {
        let ctx = context();
        let cfg = MapperConfig::default();
        let mapper = QueryMapper::new(&ctx, &cfg);
        let _g = devlog::enable_thread_sink();
        let out = mapper
            .map_query(&Document::new().append("name", "x"), ctx.entity("Sample"))
            .unwrap();
        assert_eq!(out, doc! { "n": "x" });
        assert!(devlog::captured("key name -> n"));
    }

    #[test]
    fn combinator_requires_array_of_documents() {
        let ctx = context();
        let cfg = MapperConfig::default();
        let mapper = QueryMapper::new(&ctx, &cfg);
        let err = mapper.map_query(&Document::new().append("$or", 1), None).unwrap_err();
        assert!(matches!(err, MappingError::MalformedInput { ref key, .. } if key == "$or"));
    }

    #[test]
    fn in_requires_array() {
        let ctx = context();
        let cfg = MapperConfig::default();
        let mapper = QueryMapper::new(&ctx, &cfg);
        let q = Document::new().append("name", Document::new().append("$in", "x"));
        let err = mapper.map_query(&q, ctx.entity("Sample")).unwrap_err();
        assert!(matches!(err, MappingError::MalformedInput { expected: "array", .. }));
    }

    #[test]
    fn depth_is_bounded() {
        let ctx = context();
        let cfg = MapperConfig { max_depth: 4, ..MapperConfig::default() };
        let mapper = QueryMapper::new(&ctx, &cfg);
        let mut q = Document::new().append("leaf", 1);
        for _ in 0..10 {
            q = Document::new().append("a", q);
        }
        assert!(matches!(mapper.map_query(&q, None), Err(MappingError::DepthExceeded(4))));
    }
}
