//! Query by example: a sample entity becomes equality criteria on every set property.

use bson::{Bson, Document as BsonDocument};

use crate::document::EntityValue;
use crate::errors::Result;
use crate::query::keywords;
use crate::query::mapper::QueryMapper;

#[derive(Debug, Clone, PartialEq)]
pub struct Example {
    sample: EntityValue,
    ignored: Vec<String>,
}

impl Example {
    #[must_use]
    pub fn of(sample: EntityValue) -> Self {
        Self { sample, ignored: Vec::new() }
    }

    /// Skips a mapped dotted path (and everything below it).
    #[must_use]
    pub fn ignoring(mut self, path: impl Into<String>) -> Self {
        self.ignored.push(path.into());
        self
    }

    #[must_use]
    pub fn sample(&self) -> &EntityValue {
        &self.sample
    }

    /// Writes the sample through the mapper's converter and flattens nested documents into dotted
    /// keys. Pointers and operator-shaped documents stay whole.
    ///
    /// # Errors
    /// Propagates conversion errors such as `UnresolvableReference`.
    pub fn to_criteria(&self, mapper: &QueryMapper<'_>) -> Result<BsonDocument> {
        let written = mapper.converter().write_entity(&self.sample, 0)?;
        let mut out = BsonDocument::new();
        self.flatten("", &written, &mut out);
        Ok(out)
    }

    fn flatten(&self, prefix: &str, doc: &BsonDocument, out: &mut BsonDocument) {
        for (k, v) in doc {
            let key = if prefix.is_empty() { k.clone() } else { format!("{prefix}.{k}") };
            if self.is_ignored(&key) {
                continue;
            }
            match v {
                Bson::Null => {}
                Bson::Document(inner) if !inner.keys().any(|k| keywords::has_sigil(k)) => {
                    self.flatten(&key, inner, out);
                }
                other => {
                    out.insert(key, other.clone());
                }
            }
        }
    }

    fn is_ignored(&self, key: &str) -> bool {
        self.ignored.iter().any(|i| {
            key == i || key.strip_prefix(i.as_str()).is_some_and(|rest| rest.starts_with('.'))
        })
    }
}
