//! Value conversion to wire representation.

use bson::oid::ObjectId;
use bson::{Bson, Document as BsonDocument, doc};

use crate::config::MapperConfig;
use crate::dev6;
use crate::document::{DbRef, EntityValue, GeoJson, Value, accessor};
use crate::errors::{MappingError, Result};
use crate::mapping::{MappingMetadata, PersistentEntity, PersistentProperty, PropertyType};

/// Converts single values using mapping metadata.
#[derive(Clone, Copy)]
pub struct ValueConverter<'m> {
    metadata: &'m dyn MappingMetadata,
    config: &'m MapperConfig,
}

impl<'m> ValueConverter<'m> {
    #[must_use]
    pub fn new(metadata: &'m dyn MappingMetadata, config: &'m MapperConfig) -> Self {
        Self { metadata, config }
    }

    #[must_use]
    pub fn config(&self) -> &'m MapperConfig {
        self.config
    }

    pub(crate) fn check_depth(&self, depth: usize) -> Result<()> {
        if depth > self.config.max_depth {
            return Err(MappingError::DepthExceeded(self.config.max_depth));
        }
        Ok(())
    }

    /// Identifier value: a valid 24-hex string becomes a native object id when the identifier's
    /// declared type allows it. Anything else is left as is.
    ///
    /// # Errors
    /// Returns `DepthExceeded` for over-deep lists.
    pub fn convert_id(
        &self,
        value: &Value,
        property: Option<&PersistentProperty>,
        depth: usize,
    ) -> Result<Bson> {
        self.check_depth(depth)?;
        match value {
            Value::Scalar(Bson::String(s)) => {
                let allowed = self.config.convert_object_ids
                    && property.is_none_or(|p| p.property_type().accepts_object_id());
                match ObjectId::parse_str(s) {
                    Ok(oid) if allowed => Ok(Bson::ObjectId(oid)),
                    _ => Ok(Bson::String(s.clone())),
                }
            }
            Value::Array(items) => items
                .iter()
                .map(|v| self.convert_id(v, property, depth + 1))
                .collect::<Result<Vec<_>>>()
                .map(Bson::Array),
            other => self.convert(other, property.map(PersistentProperty::property_type), depth),
        }
    }

    /// Plain value conversion against an optional declared type.
    ///
    /// # Errors
    /// Returns `DepthExceeded` or an entity-writing error.
    pub fn convert(
        &self,
        value: &Value,
        declared: Option<&PropertyType>,
        depth: usize,
    ) -> Result<Bson> {
        self.check_depth(depth)?;
        Ok(match value {
            Value::Null => Bson::Null,
            Value::Scalar(b) => b.clone(),
            Value::Enum(e) => Bson::String(e.name.clone()),
            Value::Point(p) if declared.is_some_and(PropertyType::is_geo_json) => {
                Bson::Document(GeoJson::Point(*p).to_document())
            }
            Value::Point(p) => Bson::Document(p.to_legacy()),
            Value::GeoJson(g) => Bson::Document(g.to_document()),
            Value::DbRef(r) => Bson::Document(r.to_document()),
            Value::Entity(e) => Bson::Document(self.write_entity(e, depth + 1)?),
            Value::Array(items) => {
                let element = declared.and_then(PropertyType::element);
                Bson::Array(
                    items
                        .iter()
                        .map(|v| self.convert(v, element, depth + 1))
                        .collect::<Result<Vec<_>>>()?,
                )
            }
            Value::Document(d) => {
                let mut out = BsonDocument::new();
                for (k, v) in d.iter() {
                    out.insert(k.clone(), self.convert(v, None, depth + 1)?);
                }
                Bson::Document(out)
            }
        })
    }

    /// Operand of a geometry-aware operator: always `{ $geometry: GeoJSON }`.
    ///
    /// # Errors
    /// Returns `DepthExceeded`.
    pub fn convert_geometry(&self, value: &Value, depth: usize) -> Result<Bson> {
        self.check_depth(depth)?;
        match value {
            Value::Point(p) => Ok(Bson::Document(doc! { "$geometry": GeoJson::Point(*p).to_document() })),
            Value::GeoJson(g) => Ok(Bson::Document(doc! { "$geometry": g.to_document() })),
            Value::Document(d) => {
                let mut out = BsonDocument::new();
                for (k, v) in d.iter() {
                    let mapped = match (k.as_str(), v) {
                        ("$geometry", Value::Point(p)) => {
                            Bson::Document(GeoJson::Point(*p).to_document())
                        }
                        _ => self.convert(v, None, depth + 1)?,
                    };
                    out.insert(k.clone(), mapped);
                }
                Ok(Bson::Document(out))
            }
            other => self.convert(other, None, depth),
        }
    }

    /// Value of an association (reference) property: a pointer to the target's identifier.
    ///
    /// # Errors
    /// Returns `UnresolvableReference` for an entity instance without an identifier.
    pub fn convert_association(
        &self,
        value: &Value,
        property: Option<&PersistentProperty>,
        depth: usize,
    ) -> Result<Bson> {
        self.check_depth(depth)?;
        let target = property
            .and_then(|p| p.property_type().entity_name())
            .and_then(|name| self.metadata.entity(name));
        match value {
            Value::Null => Ok(Bson::Null),
            Value::DbRef(r) => {
                // Pointers into another collection keep no typed identifier.
                let id_property = target
                    .filter(|e| e.collection() == r.collection)
                    .and_then(PersistentEntity::id_property);
                let id = self.convert_id(&Value::from(r.id.clone()), id_property, depth + 1)?;
                Ok(Bson::Document(DbRef { id, ..r.clone() }.to_document()))
            }
            Value::Entity(e) => {
                let entity = self.metadata.entity(&e.type_name).or(target).ok_or_else(|| {
                    MappingError::UnresolvableReference(format!("unknown entity type {}", e.type_name))
                })?;
                let id_property = entity.id_property().ok_or_else(|| {
                    MappingError::UnresolvableReference(format!("{} has no identifier", entity.name()))
                })?;
                let raw = e.get(id_property.name()).ok_or_else(|| {
                    MappingError::UnresolvableReference(format!(
                        "{} instance without identifier value",
                        entity.name()
                    ))
                })?;
                let id = self.convert_id(raw, Some(id_property), depth + 1)?;
                Ok(Bson::Document(DbRef::new(entity.collection(), id).to_document()))
            }
            Value::Array(items) => items
                .iter()
                .map(|v| self.convert_association(v, property, depth + 1))
                .collect::<Result<Vec<_>>>()
                .map(Bson::Array),
            Value::Scalar(_) => match target {
                Some(entity) => {
                    let id = self.convert_id(value, entity.id_property(), depth + 1)?;
                    Ok(Bson::Document(DbRef::new(entity.collection(), id).to_document()))
                }
                None => {
                    log::warn!("association without resolvable target; value left as is");
                    self.convert(value, None, depth)
                }
            },
            other => self.convert(other, None, depth),
        }
    }

    /// Writes an entity instance as a document of mapped field names. The type discriminator is
    /// never written.
    ///
    /// # Errors
    /// Returns `PathConflict` when two dotted field names collide, or any nested conversion error.
    pub fn write_entity(&self, value: &EntityValue, depth: usize) -> Result<BsonDocument> {
        self.check_depth(depth)?;
        let entity = self.metadata.entity(&value.type_name);
        if entity.is_none() {
            log::warn!("no metadata for {}; writing properties verbatim", value.type_name);
        }
        let mut out = BsonDocument::new();
        for (name, v) in value.properties() {
            if *name == self.config.type_key {
                dev6!("write_entity: dropped type key {name} on {}", value.type_name);
                continue;
            }
            let property = entity.and_then(|e| e.property(name));
            let (key, mapped) = match property {
                Some(p) if p.is_reference() => {
                    (p.field_name(), self.convert_association(v, Some(p), depth + 1)?)
                }
                Some(p) if p.is_id() => (p.field_name(), self.convert_id(v, Some(p), depth + 1)?),
                Some(p) => (p.field_name(), self.convert(v, Some(p.property_type()), depth + 1)?),
                None => (name.as_str(), self.convert(v, None, depth + 1)?),
            };
            accessor::put(&mut out, key, mapped)?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{EnumValue, Point};
    use crate::mapping::{MappingContext, PersistentProperty as Prop};

    fn context() -> MappingContext {
        let mut ctx = MappingContext::new();
        ctx.register(
            PersistentEntity::builder("Reference")
                .property(Prop::new("id", PropertyType::string()))
                .build()
                .unwrap(),
        )
        .unwrap();
        ctx.register(
            PersistentEntity::builder("Holder")
                .property(Prop::new("id", PropertyType::string()))
                .property(Prop::new("reference", PropertyType::entity("Reference")).reference())
                .property(Prop::new("name", PropertyType::string()).field("nested.name"))
                .build()
                .unwrap(),
        )
        .unwrap();
        ctx
    }

    #[test]
    fn hex_id_becomes_object_id_only_when_valid() {
        let ctx = context();
        let cfg = MapperConfig::default();
        let c = ValueConverter::new(&ctx, &cfg);
        let oid = ObjectId::new();
        let converted = c.convert_id(&Value::from(oid.to_hex()), None, 0).unwrap();
        assert_eq!(converted, Bson::ObjectId(oid));
        let kept = c.convert_id(&Value::from("not-hex"), None, 0).unwrap();
        assert_eq!(kept, Bson::String("not-hex".into()));
    }

    #[test]
    fn id_conversion_can_be_disabled() {
        let ctx = context();
        let cfg = MapperConfig { convert_object_ids: false, ..MapperConfig::default() };
        let c = ValueConverter::new(&ctx, &cfg);
        let hex = ObjectId::new().to_hex();
        assert_eq!(c.convert_id(&Value::from(hex.clone()), None, 0).unwrap(), Bson::String(hex));
    }

    #[test]
    fn enums_and_points() {
        let ctx = context();
        let cfg = MapperConfig::default();
        let c = ValueConverter::new(&ctx, &cfg);
        let e = Value::from(EnumValue::new("Color", "RED"));
        assert_eq!(c.convert(&e, None, 0).unwrap(), Bson::String("RED".into()));
        let p = Value::from(Point::new(1.0, 2.0));
        assert_eq!(c.convert(&p, None, 0).unwrap(), Bson::Document(doc! { "x": 1.0, "y": 2.0 }));
        let as_geo = c.convert(&p, Some(&PropertyType::GeoJson), 0).unwrap();
        assert_eq!(as_geo, Bson::Document(doc! { "type": "Point", "coordinates": [1.0, 2.0] }));
    }

    #[test]
    fn entity_reference_becomes_pointer() {
        let ctx = context();
        let cfg = MapperConfig::default();
        let c = ValueConverter::new(&ctx, &cfg);
        let oid = ObjectId::new();
        let holder = ctx.entity("Holder").unwrap();
        let reference = Value::from(EntityValue::new("Reference").with("id", oid.to_hex()));
        let out = c.convert_association(&reference, holder.property("reference"), 0).unwrap();
        assert_eq!(out, Bson::Document(doc! { "$ref": "reference", "$id": oid }));
        assert_eq!(c.convert_association(&Value::Null, holder.property("reference"), 0).unwrap(), Bson::Null);
    }

    #[test]
    fn reference_without_id_is_unresolvable() {
        let ctx = context();
        let cfg = MapperConfig::default();
        let c = ValueConverter::new(&ctx, &cfg);
        let holder = ctx.entity("Holder").unwrap();
        let err = c
            .convert_association(&Value::from(EntityValue::new("Reference")), holder.property("reference"), 0)
            .unwrap_err();
        assert!(matches!(err, MappingError::UnresolvableReference(_)));
    }

    #[test]
    fn write_entity_nests_dotted_names_and_drops_type_key() {
        let ctx = context();
        let cfg = MapperConfig::default();
        let c = ValueConverter::new(&ctx, &cfg);
        let e = EntityValue::new("Holder").with("id", "1").with("name", "n").with("_class", "Holder");
        let out = c.write_entity(&e, 0).unwrap();
        assert_eq!(out, doc! { "_id": "1", "nested": { "name": "n" } });
    }

    #[test]
    fn depth_is_bounded() {
        let ctx = context();
        let cfg = MapperConfig { max_depth: 2, ..MapperConfig::default() };
        let c = ValueConverter::new(&ctx, &cfg);
        let deep = Value::from(vec![Value::from(vec![Value::from(vec![1])])]);
        assert!(matches!(c.convert(&deep, None, 0), Err(MappingError::DepthExceeded(2))));
    }
}
