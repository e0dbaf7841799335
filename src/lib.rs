//! Query and aggregation mapping for BSON document databases.
//!
//! Translates criteria, sort, field and example documents written against a typed domain model
//! into the wire documents a MongoDB-style server understands (property renames, `_id`
//! handling, enum/geo/reference conversion), and renders aggregation pipelines with per-stage
//! field reference checking.

pub mod aggregation;
pub mod config;
pub mod convert;
pub mod document;
pub mod errors;
pub mod logger;
pub mod mapping;
pub mod query;
pub mod utils;

pub use aggregation::{Aggregation, AggregationContext, AggregationOperation, AggregationOptions};
pub use config::MapperConfig;
pub use convert::ValueConverter;
pub use document::{DbRef, Document, EntityValue, EnumValue, GeoJson, Point, Value};
pub use errors::{MappingError, Result};
pub use mapping::{
    MappingContext, MappingMetadata, PersistentEntity, PersistentProperty, PropertyType,
};
pub use query::{Criteria, Direction, Example, MappedQuery, Query, QueryMapper};
