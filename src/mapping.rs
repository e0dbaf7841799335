//! Mapping metadata: entity and property descriptors, and the read-only registry the mappers
//! consult.
//!
//! Metadata is built once by the embedding application and then only read. A registry may be
//! installed process-wide with [`install_global`]; concurrent first-population is the caller's
//! concern.

pub mod path;

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::{Lazy, OnceCell};

use crate::errors::{MappingError, Result};

/// Reserved wire name of identifier fields.
pub const ID_FIELD: &str = "_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimpleType {
    String,
    Int32,
    Int64,
    Double,
    Boolean,
    ObjectId,
    DateTime,
    Decimal,
    Binary,
    Any,
}

/// Declared type of a property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyType {
    Simple(SimpleType),
    Enum(String),
    /// Nested (or referenced) entity, by type name.
    Entity(String),
    Array(Box<PropertyType>),
    /// String-keyed map of the boxed value type.
    Map(Box<PropertyType>),
    /// Legacy `{x, y}` coordinate pair.
    Point,
    GeoJson,
}

impl PropertyType {
    #[must_use]
    pub fn string() -> Self {
        Self::Simple(SimpleType::String)
    }

    #[must_use]
    pub fn entity(name: impl Into<String>) -> Self {
        Self::Entity(name.into())
    }

    #[must_use]
    pub fn array_of(inner: Self) -> Self {
        Self::Array(Box::new(inner))
    }

    #[must_use]
    pub fn map_of(inner: Self) -> Self {
        Self::Map(Box::new(inner))
    }

    /// Entity type name carried by this type, looking through arrays and maps.
    #[must_use]
    pub fn entity_name(&self) -> Option<&str> {
        match self {
            Self::Entity(name) => Some(name),
            Self::Array(inner) | Self::Map(inner) => inner.entity_name(),
            _ => None,
        }
    }

    /// Element type of an array, value type of a map.
    #[must_use]
    pub fn element(&self) -> Option<&PropertyType> {
        match self {
            Self::Array(inner) | Self::Map(inner) => Some(inner),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_geo_json(&self) -> bool {
        matches!(self, Self::GeoJson)
    }

    /// Whether hex strings may be stored as native object ids for this (identifier) type.
    #[must_use]
    pub fn accepts_object_id(&self) -> bool {
        matches!(
            self,
            Self::Simple(SimpleType::String | SimpleType::ObjectId | SimpleType::Any)
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersistentProperty {
    name: String,
    field_name: String,
    explicit_field_name: bool,
    property_type: PropertyType,
    id: bool,
    reference: bool,
    text_score: bool,
}

impl PersistentProperty {
    #[must_use]
    pub fn new(name: impl Into<String>, property_type: PropertyType) -> Self {
        let name = name.into();
        Self {
            field_name: name.clone(),
            name,
            explicit_field_name: false,
            property_type,
            id: false,
            reference: false,
            text_score: false,
        }
    }

    /// Explicit wire field name. Always wins, also for identifier properties.
    #[must_use]
    pub fn field(mut self, field_name: impl Into<String>) -> Self {
        self.field_name = field_name.into();
        self.explicit_field_name = true;
        self
    }

    #[must_use]
    pub fn id(mut self) -> Self {
        self.id = true;
        self
    }

    /// Stored as a pointer to the target entity's identifier.
    #[must_use]
    pub fn reference(mut self) -> Self {
        self.reference = true;
        self
    }

    /// Populated from full-text search relevance.
    #[must_use]
    pub fn text_score(mut self) -> Self {
        self.text_score = true;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn field_name(&self) -> &str {
        if self.id && !self.explicit_field_name { ID_FIELD } else { &self.field_name }
    }

    #[must_use]
    pub fn has_explicit_field_name(&self) -> bool {
        self.explicit_field_name
    }

    #[must_use]
    pub fn property_type(&self) -> &PropertyType {
        &self.property_type
    }

    #[must_use]
    pub fn is_id(&self) -> bool {
        self.id
    }

    #[must_use]
    pub fn is_reference(&self) -> bool {
        self.reference
    }

    #[must_use]
    pub fn is_text_score(&self) -> bool {
        self.text_score
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersistentEntity {
    name: String,
    collection: String,
    properties: IndexMap<String, PersistentProperty>,
    id_property: Option<String>,
    text_score_property: Option<String>,
}

impl PersistentEntity {
    #[must_use]
    pub fn builder(name: impl Into<String>) -> EntityBuilder {
        EntityBuilder { name: name.into(), collection: None, properties: Vec::new() }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PersistentProperty> {
        self.properties.get(name)
    }

    /// Looks a property up by its wire field name.
    #[must_use]
    pub fn property_by_field_name(&self, field_name: &str) -> Option<&PersistentProperty> {
        self.properties.values().find(|p| p.field_name() == field_name)
    }

    pub fn properties(&self) -> impl Iterator<Item = &PersistentProperty> {
        self.properties.values()
    }

    #[must_use]
    pub fn id_property(&self) -> Option<&PersistentProperty> {
        self.id_property.as_deref().and_then(|n| self.properties.get(n))
    }

    #[must_use]
    pub fn text_score_property(&self) -> Option<&PersistentProperty> {
        self.text_score_property.as_deref().and_then(|n| self.properties.get(n))
    }
}

pub struct EntityBuilder {
    name: String,
    collection: Option<String>,
    properties: Vec<PersistentProperty>,
}

impl EntityBuilder {
    #[must_use]
    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    #[must_use]
    pub fn property(mut self, property: PersistentProperty) -> Self {
        self.properties.push(property);
        self
    }

    /// Validates and freezes the entity.
    ///
    /// # Errors
    /// Returns `Metadata` for duplicate property names, more than one identifier or more than one
    /// text-score property.
    pub fn build(self) -> Result<PersistentEntity> {
        let mut properties: IndexMap<String, PersistentProperty> = IndexMap::new();
        for p in self.properties {
            if properties.contains_key(&p.name) {
                return Err(MappingError::Metadata(format!(
                    "duplicate property '{}' on {}",
                    p.name, self.name
                )));
            }
            properties.insert(p.name.clone(), p);
        }
        let explicit: Vec<&str> =
            properties.values().filter(|p| p.id).map(|p| p.name.as_str()).collect();
        let id_property = match explicit.as_slice() {
            [] => properties.contains_key("id").then(|| "id".to_string()),
            [one] => Some((*one).to_string()),
            _ => {
                return Err(MappingError::Metadata(format!(
                    "{} declares more than one identifier: {}",
                    self.name,
                    explicit.join(", ")
                )));
            }
        };
        if let Some(id) = &id_property
            && let Some(p) = properties.get_mut(id)
        {
            p.id = true;
        }
        // A wire name that is another property's name would be renamed again on re-mapping.
        if let Some((p, other)) = properties.values().find_map(|p| {
            let field = p.field_name();
            (field != p.name).then(|| properties.get(field)).flatten().map(|o| (p, o))
        }) {
            return Err(MappingError::Metadata(format!(
                "{}.{} is stored as '{}', which is the name of property {}",
                self.name,
                p.name,
                p.field_name(),
                other.name
            )));
        }
        let scores: Vec<&str> =
            properties.values().filter(|p| p.text_score).map(|p| p.name.as_str()).collect();
        if scores.len() > 1 {
            return Err(MappingError::Metadata(format!(
                "{} declares more than one text score property",
                self.name
            )));
        }
        let text_score_property = scores.first().map(|s| (*s).to_string());
        let collection = self.collection.unwrap_or_else(|| default_collection_name(&self.name));
        Ok(PersistentEntity {
            name: self.name,
            collection,
            properties,
            id_property,
            text_score_property,
        })
    }
}

/// Type name with the first character lower-cased.
fn default_collection_name(type_name: &str) -> String {
    let mut chars = type_name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Read-only metadata lookup used by the mappers.
pub trait MappingMetadata: Send + Sync {
    fn entity(&self, type_name: &str) -> Option<&PersistentEntity>;
}

/// Registry of entities by type name.
#[derive(Debug, Clone, Default)]
pub struct MappingContext {
    entities: HashMap<String, Arc<PersistentEntity>>,
}

impl MappingContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// Returns `Metadata` if an entity with the same type name is already registered.
    pub fn register(&mut self, entity: PersistentEntity) -> Result<Arc<PersistentEntity>> {
        if self.entities.contains_key(entity.name()) {
            return Err(MappingError::Metadata(format!(
                "entity {} already registered",
                entity.name()
            )));
        }
        let entity = Arc::new(entity);
        self.entities.insert(entity.name().to_string(), Arc::clone(&entity));
        log::debug!("registered entity {} -> {}", entity.name(), entity.collection());
        Ok(entity)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl MappingMetadata for MappingContext {
    fn entity(&self, type_name: &str) -> Option<&PersistentEntity> {
        self.entities.get(type_name).map(Arc::as_ref)
    }
}

static GLOBAL: OnceCell<MappingContext> = OnceCell::new();
static EMPTY: Lazy<MappingContext> = Lazy::new(MappingContext::new);

/// Installs the process-wide registry.
///
/// # Errors
/// Returns `Metadata` if a registry was already installed.
pub fn install_global(context: MappingContext) -> Result<&'static MappingContext> {
    GLOBAL
        .set(context)
        .map_err(|_| MappingError::Metadata("global mapping context already installed".into()))?;
    GLOBAL.get().ok_or_else(|| MappingError::Metadata("global mapping context missing".into()))
}

#[must_use]
pub fn global() -> Option<&'static MappingContext> {
    GLOBAL.get()
}

/// Registry without any entities, for untyped mapping.
#[must_use]
pub fn empty() -> &'static MappingContext {
    &EMPTY
}
