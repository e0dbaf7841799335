//! `$group` stage.

use bson::{Bson, Document as BsonDocument, doc};

use crate::aggregation::context::AggregationContext;
use crate::aggregation::expression::Expression;
use crate::aggregation::fields::{ExposedField, ExposedFields, Field};
use crate::errors::Result;
use crate::mapping::ID_FIELD;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accumulator {
    Sum,
    Avg,
    Min,
    Max,
    First,
    Last,
    Push,
    AddToSet,
}

impl Accumulator {
    #[must_use]
    pub fn operator(self) -> &'static str {
        match self {
            Self::Sum => "$sum",
            Self::Avg => "$avg",
            Self::Min => "$min",
            Self::Max => "$max",
            Self::First => "$first",
            Self::Last => "$last",
            Self::Push => "$push",
            Self::AddToSet => "$addToSet",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Accumulation {
    alias: String,
    accumulator: Accumulator,
    operand: Expression,
}

/// Groups by zero or more key fields and accumulates aliased outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupOperation {
    id_fields: Vec<Field>,
    accumulations: Vec<Accumulation>,
}

/// `group("a", "b")`; no keys groups everything under a `null` id.
#[must_use]
pub fn group(paths: &[&str]) -> GroupOperation {
    GroupOperation { id_fields: paths.iter().map(|p| Field::new(p)).collect(), accumulations: Vec::new() }
}

impl GroupOperation {
    #[must_use]
    pub fn group_fields(fields: Vec<Field>) -> Self {
        Self { id_fields: fields, accumulations: Vec::new() }
    }

    /// `{ $sum: 1 }`.
    #[must_use]
    pub fn count(self) -> GroupOperationBuilder {
        self.accumulate(Accumulator::Sum, Expression::literal(1))
    }

    #[must_use]
    pub fn sum(self, field: &str) -> GroupOperationBuilder {
        self.accumulate(Accumulator::Sum, Expression::field(field))
    }

    #[must_use]
    pub fn avg(self, field: &str) -> GroupOperationBuilder {
        self.accumulate(Accumulator::Avg, Expression::field(field))
    }

    #[must_use]
    pub fn min(self, field: &str) -> GroupOperationBuilder {
        self.accumulate(Accumulator::Min, Expression::field(field))
    }

    #[must_use]
    pub fn max(self, field: &str) -> GroupOperationBuilder {
        self.accumulate(Accumulator::Max, Expression::field(field))
    }

    #[must_use]
    pub fn first(self, field: &str) -> GroupOperationBuilder {
        self.accumulate(Accumulator::First, Expression::field(field))
    }

    #[must_use]
    pub fn last(self, field: &str) -> GroupOperationBuilder {
        self.accumulate(Accumulator::Last, Expression::field(field))
    }

    #[must_use]
    pub fn push(self, field: &str) -> GroupOperationBuilder {
        self.accumulate(Accumulator::Push, Expression::field(field))
    }

    #[must_use]
    pub fn add_to_set(self, field: &str) -> GroupOperationBuilder {
        self.accumulate(Accumulator::AddToSet, Expression::field(field))
    }

    /// Accumulates an arbitrary operand, e.g. a literal or a computed expression.
    #[must_use]
    pub fn accumulate(self, accumulator: Accumulator, operand: Expression) -> GroupOperationBuilder {
        GroupOperationBuilder { operation: self, accumulator, operand }
    }

    fn render_id(&self, ctx: &AggregationContext<'_>) -> Result<Bson> {
        match self.id_fields.as_slice() {
            [] => Ok(Bson::Null),
            [single] => ctx.render_reference(single.target()).map(Bson::String),
            many => {
                let mut id = BsonDocument::new();
                for field in many {
                    id.insert(field.name(), ctx.render_reference(field.target())?);
                }
                Ok(Bson::Document(id))
            }
        }
    }

    /// Renders `{ $group: { _id: ..., alias: { $acc: operand } } }`.
    ///
    /// # Errors
    /// Returns `InvalidReference` for key or operand fields not exposed to this stage.
    pub fn render(&self, ctx: &AggregationContext<'_>) -> Result<BsonDocument> {
        let mut body = doc! { ID_FIELD: self.render_id(ctx)? };
        for acc in &self.accumulations {
            let operand = acc.operand.render(ctx)?;
            body.insert(acc.alias.as_str(), doc! { acc.accumulator.operator(): operand });
        }
        Ok(doc! { "$group": body })
    }

    /// `_id`, the group keys (living under `_id`) and the accumulator aliases.
    #[must_use]
    pub fn exposed(&self) -> ExposedFields {
        let keys = self.id_fields.iter().map(|f| ExposedField::synthetic(f.name()));
        let aliases = self.accumulations.iter().map(|a| ExposedField::plain(a.alias.as_str()));
        keys.chain(aliases)
            .fold(ExposedFields::closed(vec![ExposedField::plain(ID_FIELD)]), ExposedFields::and)
    }
}

/// Accumulator waiting for its output name.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupOperationBuilder {
    operation: GroupOperation,
    accumulator: Accumulator,
    operand: Expression,
}

impl GroupOperationBuilder {
    #[must_use]
    pub fn alias(self, name: &str) -> GroupOperation {
        let mut operation = self.operation;
        operation.accumulations.retain(|a| a.alias != name);
        operation.accumulations.push(Accumulation {
            alias: name.to_string(),
            accumulator: self.accumulator,
            operand: self.operand,
        });
        operation
    }
}
