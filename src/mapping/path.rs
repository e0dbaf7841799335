//! Field path resolution: dotted property paths to wire field names.

use crate::mapping::{ID_FIELD, MappingMetadata, PersistentEntity, PersistentProperty, PropertyType};

/// Mapping outcome of a single path segment.
#[derive(Debug, Clone)]
pub struct FieldDescriptor<'m> {
    pub target_field_name: String,
    pub resolved_type: Option<&'m PropertyType>,
    pub is_identifier: bool,
    pub is_association: bool,
    pub property: Option<&'m PersistentProperty>,
    pub owner: Option<&'m PersistentEntity>,
}

impl<'m> FieldDescriptor<'m> {
    /// Literal segment without metadata. Only a literal `_id` is treated as an identifier.
    fn passthrough(segment: &str) -> Self {
        Self {
            target_field_name: segment.to_string(),
            resolved_type: None,
            is_identifier: segment == ID_FIELD,
            is_association: false,
            property: None,
            owner: None,
        }
    }

    /// Array position or map key: kept verbatim and never an identifier.
    fn verbatim(segment: &str) -> Self {
        Self { is_identifier: false, ..Self::passthrough(segment) }
    }

    fn from_property(property: &'m PersistentProperty, owner: &'m PersistentEntity) -> Self {
        Self {
            target_field_name: property.field_name().to_string(),
            resolved_type: Some(property.property_type()),
            is_identifier: property.is_id(),
            is_association: property.is_reference(),
            property: Some(property),
            owner: Some(owner),
        }
    }
}

/// Resolves dotted paths against entity metadata.
#[derive(Clone, Copy)]
pub struct FieldPathResolver<'m> {
    metadata: &'m dyn MappingMetadata,
}

impl<'m> FieldPathResolver<'m> {
    #[must_use]
    pub fn new(metadata: &'m dyn MappingMetadata) -> Self {
        Self { metadata }
    }

    /// Lazily resolves `path` segment by segment, starting at `entity`.
    #[must_use]
    pub fn segments<'p>(
        &self,
        path: &'p str,
        entity: Option<&'m PersistentEntity>,
    ) -> PathSegments<'m, 'p> {
        PathSegments {
            metadata: self.metadata,
            parts: path.split('.'),
            owner: entity,
            pending: Pending::Property,
        }
    }

    #[must_use]
    pub fn resolve(&self, path: &str, entity: Option<&'m PersistentEntity>) -> ResolvedPath<'m> {
        let mut segments = self.segments(path, entity);
        let descriptors: Vec<FieldDescriptor<'m>> = segments.by_ref().collect();
        ResolvedPath { segments: descriptors, leaf_entity: segments.current_entity() }
    }

    #[must_use]
    pub fn entity(&self, type_name: &str) -> Option<&'m PersistentEntity> {
        self.metadata.entity(type_name)
    }
}

/// What the next segment is expected to be.
#[derive(Clone, Copy)]
enum Pending<'m> {
    Property,
    /// After a collection: a position, or a property of the element entity.
    Index(Option<&'m PersistentEntity>),
    /// After a map: a literal key, then properties of the value entity.
    MapKey(Option<&'m PersistentEntity>),
    /// Resolution fell through; everything after is literal.
    Literal,
}

pub struct PathSegments<'m, 'p> {
    metadata: &'m dyn MappingMetadata,
    parts: std::str::Split<'p, char>,
    owner: Option<&'m PersistentEntity>,
    pending: Pending<'m>,
}

impl<'m> PathSegments<'m, '_> {
    /// Entity that owns the next segment, if any.
    fn current_entity(&self) -> Option<&'m PersistentEntity> {
        match self.pending {
            Pending::Property => self.owner,
            Pending::Index(element) => element,
            Pending::MapKey(_) | Pending::Literal => None,
        }
    }

    fn lookup(
        &self,
        owner: &PersistentEntity,
        property: &PersistentProperty,
        name: &str,
    ) -> Option<&'m PersistentEntity> {
        let found = self.metadata.entity(name);
        if found.is_none() {
            log::warn!(
                "unknown entity type '{name}' for {}.{}; resolving literally",
                owner.name(),
                property.name()
            );
        }
        found
    }

    fn resolve(&mut self, segment: &str) -> FieldDescriptor<'m> {
        let Some(owner) = self.owner else {
            self.pending = Pending::Literal;
            return FieldDescriptor::passthrough(segment);
        };
        let Some(property) =
            owner.property(segment).or_else(|| owner.property_by_field_name(segment))
        else {
            self.owner = None;
            self.pending = Pending::Literal;
            return FieldDescriptor::passthrough(segment);
        };
        self.owner = None;
        self.pending = Pending::Literal;
        match property.property_type() {
            PropertyType::Entity(name) => {
                self.owner = self.lookup(owner, property, name);
                self.pending = Pending::Property;
            }
            PropertyType::Array(inner) => {
                let element = inner.entity_name().and_then(|n| self.lookup(owner, property, n));
                self.pending = Pending::Index(element);
            }
            PropertyType::Map(inner) => {
                let value = inner.entity_name().and_then(|n| self.lookup(owner, property, n));
                self.pending = Pending::MapKey(value);
            }
            _ => {}
        }
        FieldDescriptor::from_property(property, owner)
    }
}

impl<'m> Iterator for PathSegments<'m, '_> {
    type Item = FieldDescriptor<'m>;

    fn next(&mut self) -> Option<Self::Item> {
        let segment = self.parts.next()?;
        let pending = self.pending;
        let descriptor = match pending {
            Pending::Property => self.resolve(segment),
            Pending::Literal => FieldDescriptor::passthrough(segment),
            Pending::Index(element) if is_positional(segment) => {
                self.owner = element;
                self.pending = Pending::Property;
                FieldDescriptor::verbatim(segment)
            }
            Pending::Index(element) => {
                self.owner = element;
                self.resolve(segment)
            }
            Pending::MapKey(value) => {
                self.owner = value;
                self.pending = Pending::Property;
                FieldDescriptor::verbatim(segment)
            }
        };
        Some(descriptor)
    }
}

fn is_positional(segment: &str) -> bool {
    segment == "$" || (!segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()))
}

/// Fully resolved path.
#[derive(Debug, Clone)]
pub struct ResolvedPath<'m> {
    segments: Vec<FieldDescriptor<'m>>,
    leaf_entity: Option<&'m PersistentEntity>,
}

impl<'m> ResolvedPath<'m> {
    /// Wire key. A path running through an association addresses the stored pointer, so
    /// everything after the first association segment is dropped.
    #[must_use]
    pub fn mapped_key(&self) -> String {
        let end = self
            .segments
            .iter()
            .position(|s| s.is_association)
            .map_or(self.segments.len(), |i| i + 1);
        self.segments[..end]
            .iter()
            .map(|s| s.target_field_name.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }

    #[must_use]
    pub fn segments(&self) -> &[FieldDescriptor<'m>] {
        &self.segments
    }

    #[must_use]
    pub fn leaf(&self) -> Option<&FieldDescriptor<'m>> {
        self.segments.last()
    }

    #[must_use]
    pub fn leaf_property(&self) -> Option<&'m PersistentProperty> {
        self.leaf().and_then(|d| d.property)
    }

    #[must_use]
    pub fn leaf_type(&self) -> Option<&'m PropertyType> {
        self.leaf().and_then(|d| d.resolved_type)
    }

    /// First association segment along the path.
    #[must_use]
    pub fn association(&self) -> Option<&FieldDescriptor<'m>> {
        self.segments.iter().find(|s| s.is_association)
    }

    #[must_use]
    pub fn is_id_field(&self) -> bool {
        self.leaf().is_some_and(|d| d.is_identifier)
    }

    /// Entity that nested keys below this path resolve against.
    #[must_use]
    pub fn leaf_entity(&self) -> Option<&'m PersistentEntity> {
        self.leaf_entity
    }
}
