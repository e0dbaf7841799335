//! Operator vocabulary recognized by the query mapper.

use crate::document::Document;

pub const SIGIL: char = '$';

pub const COMBINATORS: &[&str] = &["$and", "$or", "$nor"];

pub const GEO_OPERATORS: &[&str] = &["$near", "$nearSphere", "$geoWithin", "$geoIntersects"];

/// Operators whose operand is copied as is: it is not a value of the property.
pub const OPAQUE_OPERAND: &[&str] = &[
    "$exists",
    "$size",
    "$type",
    "$regex",
    "$options",
    "$mod",
    "$maxDistance",
    "$minDistance",
    "$meta",
];

/// Operators whose operand must be a list of property values.
pub const LIST_OPERATORS: &[&str] = &["$in", "$nin", "$all"];

const OPERATORS: &[&str] = &[
    "$eq",
    "$ne",
    "$in",
    "$nin",
    "$gt",
    "$gte",
    "$lt",
    "$lte",
    "$exists",
    "$all",
    "$and",
    "$or",
    "$nor",
    "$near",
    "$nearSphere",
    "$geoWithin",
    "$geoIntersects",
    "$geometry",
    "$meta",
    "$not",
    "$regex",
    "$options",
    "$size",
    "$elemMatch",
    "$type",
    "$mod",
    "$maxDistance",
    "$minDistance",
    "$text",
    "$search",
];

#[must_use]
pub fn is_keyword(key: &str) -> bool {
    OPERATORS.contains(&key)
}

#[must_use]
pub fn is_combinator(key: &str) -> bool {
    COMBINATORS.contains(&key)
}

#[must_use]
pub fn is_geo_operator(key: &str) -> bool {
    GEO_OPERATORS.contains(&key)
}

#[must_use]
pub fn has_sigil(key: &str) -> bool {
    key.starts_with(SIGIL)
}

/// Non-empty and made only of recognized operators.
#[must_use]
pub fn is_operator_document(doc: &Document) -> bool {
    !doc.is_empty() && doc.keys().all(|k| is_keyword(k))
}

/// Carries at least one sigil key outside the vocabulary; such documents are opaque data.
#[must_use]
pub fn has_unrecognized_sigil(doc: &Document) -> bool {
    doc.keys().any(|k| has_sigil(k) && !is_keyword(k))
}
