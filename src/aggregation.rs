//! Aggregation pipelines: stage builders, per-stage field exposure and command rendering.
//!
//! Each stage renders against an [`AggregationContext`] holding the fields exposed by the stages
//! before it; referencing anything else fails with `InvalidReference`.

pub mod context;
pub mod expression;
pub mod fields;
pub mod group;
pub mod parser;
pub mod project;
pub mod stage;
pub mod unwind;

use bson::{Bson, Document as BsonDocument, doc};

use crate::config::MapperConfig;
use crate::errors::{MappingError, Result};
use crate::mapping::MappingMetadata;

pub use context::AggregationContext;
pub use expression::{Expression, ExpressionOp};
pub use fields::{ExposedField, ExposedFields, Field, FieldReference, fields};
pub use group::{Accumulator, GroupOperation, GroupOperationBuilder, group};
pub use parser::parse_expression;
pub use project::{Projection, ProjectionOperation, ProjectionOperationBuilder, project};
pub use stage::{
    LimitOperation, MatchOperation, SkipOperation, SortOperation, limit, matching, matching_document,
    skip, sort,
};
pub use unwind::{UnwindOperation, unwind, unwind_full, unwind_preserve, unwind_with_index};

/// `$$ROOT`: the top-level document being processed.
pub const ROOT: &str = "$$ROOT";
/// `$$CURRENT`: the document at the current stage.
pub const CURRENT: &str = "$$CURRENT";

#[derive(Debug, Clone, PartialEq)]
pub enum AggregationOperation {
    Project(ProjectionOperation),
    Group(GroupOperation),
    Unwind(UnwindOperation),
    Sort(SortOperation),
    Match(MatchOperation),
    Limit(LimitOperation),
    Skip(SkipOperation),
}

impl AggregationOperation {
    #[must_use]
    pub fn operator(&self) -> &'static str {
        match self {
            Self::Project(_) => "$project",
            Self::Group(_) => "$group",
            Self::Unwind(_) => "$unwind",
            Self::Sort(_) => "$sort",
            Self::Match(_) => "$match",
            Self::Limit(_) => "$limit",
            Self::Skip(_) => "$skip",
        }
    }

    /// Renders the stage, then moves the context to the fields it exposes.
    fn render(&self, ctx: &mut AggregationContext<'_>) -> Result<BsonDocument> {
        match self {
            Self::Project(op) => {
                let rendered = op.render(ctx)?;
                if op.is_exclusion_only() && ctx.root().is_some() && !ctx.is_narrowed() {
                    let excluded: Vec<&str> = op.excluded().collect();
                    ctx.hide(&excluded)?;
                } else {
                    let exposed = op.exposed(ctx.exposed());
                    ctx.expose(exposed);
                }
                Ok(rendered)
            }
            Self::Group(op) => {
                let rendered = op.render(ctx)?;
                ctx.expose(op.exposed());
                Ok(rendered)
            }
            Self::Unwind(op) => {
                let rendered = op.render(ctx)?;
                if let Some(index) = op.exposed_index() {
                    ctx.add(index);
                }
                Ok(rendered)
            }
            Self::Sort(op) => op.render(ctx),
            Self::Match(op) => op.render(ctx),
            Self::Limit(op) => Ok(op.render()),
            Self::Skip(op) => Ok(op.render()),
        }
    }
}

macro_rules! operation_from {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(impl From<$ty> for AggregationOperation {
            fn from(op: $ty) -> Self {
                Self::$variant(op)
            }
        })*
    };
}

operation_from!(
    Project(ProjectionOperation),
    Group(GroupOperation),
    Unwind(UnwindOperation),
    Sort(SortOperation),
    Match(MatchOperation),
    Limit(LimitOperation),
    Skip(SkipOperation),
);

/// Command options appended after the pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregationOptions {
    pub allow_disk_use: bool,
    pub explain: bool,
    pub cursor: Option<BsonDocument>,
}

impl AggregationOptions {
    #[must_use]
    pub fn allow_disk_use(mut self, allow: bool) -> Self {
        self.allow_disk_use = allow;
        self
    }

    #[must_use]
    pub fn explain(mut self, explain: bool) -> Self {
        self.explain = explain;
        self
    }

    #[must_use]
    pub fn cursor(mut self, cursor: BsonDocument) -> Self {
        self.cursor = Some(cursor);
        self
    }

    fn apply(&self, command: &mut BsonDocument) {
        if self.allow_disk_use {
            command.insert("allowDiskUse", true);
        }
        if self.explain {
            command.insert("explain", true);
        }
        if let Some(cursor) = &self.cursor {
            command.insert("cursor", cursor.clone());
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    input_type: Option<String>,
    operations: Vec<AggregationOperation>,
    options: AggregationOptions,
}

/// Untyped pipeline: every field of the input is referenceable at the first stage.
///
/// # Errors
/// Returns `InvalidArgument` for an empty pipeline.
pub fn new_aggregation(operations: Vec<AggregationOperation>) -> Result<Aggregation> {
    Aggregation::create(None, operations)
}

/// Pipeline over a mapped type; the first stage sees that type's properties.
///
/// # Errors
/// Returns `InvalidArgument` for an empty pipeline or blank type name.
pub fn new_typed_aggregation(
    type_name: &str,
    operations: Vec<AggregationOperation>,
) -> Result<Aggregation> {
    if type_name.trim().is_empty() {
        return Err(MappingError::InvalidArgument("input type must not be blank".to_string()));
    }
    Aggregation::create(Some(type_name.to_string()), operations)
}

impl Aggregation {
    fn create(input_type: Option<String>, operations: Vec<AggregationOperation>) -> Result<Self> {
        if operations.is_empty() {
            return Err(MappingError::InvalidArgument(
                "aggregation needs at least one operation".to_string(),
            ));
        }
        Ok(Self { input_type, operations, options: AggregationOptions::default() })
    }

    #[must_use]
    pub fn with_options(mut self, options: AggregationOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn input_type(&self) -> Option<&str> {
        self.input_type.as_deref()
    }

    #[must_use]
    pub fn operations(&self) -> &[AggregationOperation] {
        &self.operations
    }

    /// Root context for this pipeline: typed when an input type is set.
    ///
    /// # Errors
    /// Returns `Metadata` when the input type is not registered.
    pub fn context<'m>(
        &self,
        metadata: &'m dyn MappingMetadata,
        config: &'m MapperConfig,
    ) -> Result<AggregationContext<'m>> {
        match &self.input_type {
            None => Ok(AggregationContext::untyped(config)),
            Some(name) => {
                let entity = metadata
                    .entity(name)
                    .ok_or_else(|| MappingError::Metadata(format!("no mapping for type '{name}'")))?;
                Ok(AggregationContext::typed(metadata, config, entity))
            }
        }
    }

    /// Renders each stage in order, narrowing `ctx` as it goes.
    ///
    /// # Errors
    /// Returns the first stage error, e.g. `InvalidReference` for a field dropped upstream.
    pub fn to_pipeline(&self, ctx: &mut AggregationContext<'_>) -> Result<Vec<BsonDocument>> {
        self.operations
            .iter()
            .enumerate()
            .map(|(i, op)| {
                ctx.enter(i + 1, op.operator());
                op.render(ctx)
            })
            .collect()
    }

    /// `{ aggregate: <collection>, pipeline: [...], ...options }`.
    ///
    /// # Errors
    /// See [`Aggregation::to_pipeline`].
    pub fn to_command(&self, collection: &str, ctx: &mut AggregationContext<'_>) -> Result<BsonDocument> {
        log::debug!(
            "rendering {} stage aggregation on '{collection}'{}",
            self.operations.len(),
            self.input_type.as_deref().map(|t| format!(" typed as {t}")).unwrap_or_default()
        );
        let pipeline = self.to_pipeline(ctx)?;
        let mut command = doc! {
            "aggregate": collection,
            "pipeline": pipeline.into_iter().map(Bson::Document).collect::<Vec<_>>(),
        };
        self.options.apply(&mut command);
        Ok(command)
    }
}
