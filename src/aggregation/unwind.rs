//! `$unwind` stage.

use bson::{Bson, Document as BsonDocument, doc};

use crate::aggregation::context::AggregationContext;
use crate::aggregation::fields::{ExposedField, Field};
use crate::errors::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnwindOperation {
    field: Field,
    array_index: Option<String>,
    preserve_null_and_empty_arrays: bool,
}

#[must_use]
pub fn unwind(path: &str) -> UnwindOperation {
    UnwindOperation::builder().path(path).no_array_index().skip_null_and_empty_arrays()
}

/// Unwinds and records each element's position in `index`.
#[must_use]
pub fn unwind_with_index(path: &str, index: &str) -> UnwindOperation {
    UnwindOperation::builder().path(path).array_index(index).skip_null_and_empty_arrays()
}

/// Unwinds, keeping documents whose array is missing, null or empty.
#[must_use]
pub fn unwind_preserve(path: &str) -> UnwindOperation {
    UnwindOperation::builder().path(path).no_array_index().preserve_null_and_empty_arrays()
}

#[must_use]
pub fn unwind_full(path: &str, index: &str, preserve: bool) -> UnwindOperation {
    let builder = UnwindOperation::builder().path(path).array_index(index);
    if preserve {
        builder.preserve_null_and_empty_arrays()
    } else {
        builder.skip_null_and_empty_arrays()
    }
}

impl UnwindOperation {
    #[must_use]
    pub fn builder() -> UnwindPathBuilder {
        UnwindPathBuilder
    }

    #[must_use]
    pub fn index_field(&self) -> Option<&str> {
        self.array_index.as_deref()
    }

    /// Renders the short form when no option is set.
    ///
    /// # Errors
    /// Returns `InvalidReference` for an unexposed path.
    pub fn render(&self, ctx: &AggregationContext<'_>) -> Result<BsonDocument> {
        let path = ctx.render_reference(self.field.target())?;
        if self.array_index.is_none() && !self.preserve_null_and_empty_arrays {
            return Ok(doc! { "$unwind": path });
        }
        let mut body = doc! { "path": path };
        if let Some(index) = &self.array_index {
            body.insert("includeArrayIndex", index.as_str());
        }
        body.insert("preserveNullAndEmptyArrays", Bson::Boolean(self.preserve_null_and_empty_arrays));
        Ok(doc! { "$unwind": body })
    }

    /// Field added on top of the incoming set, if any.
    #[must_use]
    pub fn exposed_index(&self) -> Option<ExposedField> {
        self.array_index.as_deref().map(ExposedField::plain)
    }
}

pub struct UnwindPathBuilder;

impl UnwindPathBuilder {
    /// Array path; a leading `$` is optional.
    #[must_use]
    pub fn path(self, path: &str) -> UnwindIndexBuilder {
        UnwindIndexBuilder { field: Field::new(path) }
    }
}

pub struct UnwindIndexBuilder {
    field: Field,
}

impl UnwindIndexBuilder {
    #[must_use]
    pub fn array_index(self, name: &str) -> UnwindNullBuilder {
        UnwindNullBuilder { field: self.field, array_index: Some(name.trim_start_matches('$').to_string()) }
    }

    #[must_use]
    pub fn no_array_index(self) -> UnwindNullBuilder {
        UnwindNullBuilder { field: self.field, array_index: None }
    }
}

pub struct UnwindNullBuilder {
    field: Field,
    array_index: Option<String>,
}

impl UnwindNullBuilder {
    #[must_use]
    pub fn preserve_null_and_empty_arrays(self) -> UnwindOperation {
        self.finish(true)
    }

    #[must_use]
    pub fn skip_null_and_empty_arrays(self) -> UnwindOperation {
        self.finish(false)
    }

    fn finish(self, preserve: bool) -> UnwindOperation {
        UnwindOperation {
            field: self.field,
            array_index: self.array_index,
            preserve_null_and_empty_arrays: preserve,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapperConfig;

    fn render(op: &UnwindOperation) -> BsonDocument {
        let cfg = MapperConfig::default();
        op.render(&AggregationContext::untyped(&cfg)).unwrap()
    }

    #[test]
    fn short_and_long_forms() {
        assert_eq!(render(&unwind("a")), doc! { "$unwind": "$a" });
        assert_eq!(
            render(&unwind_with_index("a", "index")),
            doc! { "$unwind": { "path": "$a", "includeArrayIndex": "index", "preserveNullAndEmptyArrays": false } }
        );
        assert_eq!(
            render(&unwind_preserve("a")),
            doc! { "$unwind": { "path": "$a", "preserveNullAndEmptyArrays": true } }
        );
        let built = UnwindOperation::builder().path("$foo").no_array_index().skip_null_and_empty_arrays();
        assert_eq!(render(&built), doc! { "$unwind": "$foo" });
    }

    #[test]
    fn only_index_is_exposed() {
        assert!(unwind("a").exposed_index().is_none());
        assert_eq!(unwind_full("a", "x", true).exposed_index().unwrap().name, "x");
    }
}
