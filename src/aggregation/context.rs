//! Per-stage reference context of an aggregation pipeline.

use bson::Document as BsonDocument;

use crate::aggregation::fields::{ExposedField, ExposedFields, FieldReference};
use crate::config::MapperConfig;
use crate::document::Document;
use crate::errors::{MappingError, Result};
use crate::mapping::{self, ID_FIELD, MappingMetadata, PersistentEntity};
use crate::query::QueryMapper;

/// Tracks what the current stage may reference.
///
/// Starts at the root (untyped: anything goes; typed: the entity's properties) and is narrowed by
/// each stage's output. An exclusion-only projection on a typed root only hides wire names; later
/// stages still resolve through the entity.
pub struct AggregationContext<'m> {
    mapper: QueryMapper<'m>,
    root: Option<&'m PersistentEntity>,
    exposed: Option<ExposedFields>,
    hidden: Vec<String>,
    extra: Vec<ExposedField>,
    stage: (usize, &'static str),
}

impl<'m> AggregationContext<'m> {
    #[must_use]
    pub fn untyped(config: &'m MapperConfig) -> Self {
        Self::new(QueryMapper::new(mapping::empty(), config), None)
    }

    #[must_use]
    pub fn typed(
        metadata: &'m dyn MappingMetadata,
        config: &'m MapperConfig,
        entity: &'m PersistentEntity,
    ) -> Self {
        Self::new(QueryMapper::new(metadata, config), Some(entity))
    }

    fn new(mapper: QueryMapper<'m>, root: Option<&'m PersistentEntity>) -> Self {
        Self { mapper, root, exposed: None, hidden: Vec::new(), extra: Vec::new(), stage: (0, "") }
    }

    /// Marks the stage being rendered; used in reference errors.
    pub fn enter(&mut self, position: usize, operator: &'static str) {
        self.stage = (position, operator);
    }

    #[must_use]
    pub fn root(&self) -> Option<&'m PersistentEntity> {
        self.root
    }

    /// Whether a stage has replaced the root with its own output.
    #[must_use]
    pub fn is_narrowed(&self) -> bool {
        self.exposed.is_some()
    }

    #[must_use]
    pub fn config(&self) -> &'m MapperConfig {
        self.mapper.converter().config()
    }

    /// Resolves a field reference for the current stage.
    ///
    /// # Errors
    /// Returns `InvalidReference` naming the stage and field when the field is not exposed.
    pub fn reference(&self, name: &str) -> Result<FieldReference> {
        if name.starts_with("$$") {
            return Ok(FieldReference::System(name.to_string()));
        }
        let path = name.strip_prefix('$').unwrap_or(name);
        let head = path.split('.').next().unwrap_or(path);
        let found = if self.extra.iter().any(|f| f.name == head) {
            Some(FieldReference::Direct(path.to_string()))
        } else if let Some(exposed) = &self.exposed {
            exposed.reference(path)
        } else if let Some(entity) = self.root {
            let resolved = self.mapper.resolver().resolve(path, Some(entity));
            let segments = resolved.segments();
            segments
                .first()
                .filter(|s| s.property.is_some() && !self.hidden.contains(&s.target_field_name))
                .map(|_| {
                    FieldReference::Direct(
                        segments
                            .iter()
                            .map(|s| s.target_field_name.as_str())
                            .collect::<Vec<_>>()
                            .join("."),
                    )
                })
        } else {
            Some(FieldReference::Direct(path.to_string()))
        };
        found.ok_or_else(|| self.invalid(path))
    }

    /// Reference rendered as an expression string (`"$a"`, `"$_id.a"`, `"$$ROOT"`).
    ///
    /// # Errors
    /// See [`AggregationContext::reference`].
    pub fn render_reference(&self, name: &str) -> Result<String> {
        self.reference(name).map(|r| r.render())
    }

    fn invalid(&self, field: &str) -> MappingError {
        MappingError::InvalidReference {
            stage: format!("stage {} ({})", self.stage.0, self.stage.1),
            field: field.to_string(),
        }
    }

    /// Maps `$match` criteria: against the entity at the root, literally after any narrowing.
    ///
    /// # Errors
    /// Propagates query mapping errors.
    pub fn map_criteria(&self, criteria: &Document) -> Result<BsonDocument> {
        let entity = if self.exposed.is_none() { self.root } else { None };
        self.mapper.map_query(criteria, entity)
    }

    /// The incoming exposed set of the current stage.
    #[must_use]
    pub fn exposed(&self) -> ExposedFields {
        let base = match (&self.exposed, self.root) {
            (Some(exposed), _) => exposed.clone(),
            (None, None) => ExposedFields::open(),
            (None, Some(entity)) => ExposedFields::closed(
                entity
                    .properties()
                    .map(|p| p.field_name())
                    .filter(|name| !self.hidden.iter().any(|h| h == name))
                    .map(ExposedField::plain)
                    .collect(),
            ),
        };
        self.extra.iter().cloned().fold(base, ExposedFields::and)
    }

    /// Replaces the exposed set with a stage's output.
    pub fn expose(&mut self, fields: ExposedFields) {
        log::debug!(
            "stage {} ({}) exposes [{}]",
            self.stage.0,
            self.stage.1,
            fields.names().collect::<Vec<_>>().join(", ")
        );
        self.exposed = Some(fields);
        self.extra.clear();
    }

    /// Hides fields from an entity-backed root without narrowing it.
    ///
    /// # Errors
    /// Returns `InvalidReference` for a field that is not visible to the stage.
    pub fn hide(&mut self, names: &[&str]) -> Result<()> {
        for name in names {
            let head = if *name == ID_FIELD {
                ID_FIELD.to_string()
            } else {
                let reference = self.reference(name)?;
                reference.raw().split('.').next().unwrap_or_default().to_string()
            };
            log::debug!("stage {} ({}) hides {head}", self.stage.0, self.stage.1);
            self.extra.retain(|f| f.name != head);
            self.hidden.push(head);
        }
        Ok(())
    }

    /// Adds a field on top of the current exposed set.
    pub fn add(&mut self, field: ExposedField) {
        self.extra.push(field);
    }
}
