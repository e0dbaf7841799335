//! Projection expressions: `{ "$op": [operand, ...] }` trees over field references and literals.

use bson::{Bson, Document as BsonDocument};

use crate::aggregation::context::AggregationContext;
use crate::errors::{MappingError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpressionOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Mod,
    Hour,
    Minute,
    Second,
    Millisecond,
    Year,
    Month,
    Week,
    DayOfYear,
    DayOfMonth,
    DayOfWeek,
    Size,
}

impl ExpressionOp {
    #[must_use]
    pub fn operator(self) -> &'static str {
        match self {
            Self::Add => "$add",
            Self::Subtract => "$subtract",
            Self::Multiply => "$multiply",
            Self::Divide => "$divide",
            Self::Mod => "$mod",
            Self::Hour => "$hour",
            Self::Minute => "$minute",
            Self::Second => "$second",
            Self::Millisecond => "$millisecond",
            Self::Year => "$year",
            Self::Month => "$month",
            Self::Week => "$week",
            Self::DayOfYear => "$dayOfYear",
            Self::DayOfMonth => "$dayOfMonth",
            Self::DayOfWeek => "$dayOfWeek",
            Self::Size => "$size",
        }
    }

    /// Chains of these collapse into one operator.
    fn is_variadic(self) -> bool {
        matches!(self, Self::Add | Self::Multiply)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Field reference, resolved against the stage context when rendered.
    Field(String),
    Literal(Bson),
    Operation { op: ExpressionOp, operands: Vec<Expression> },
}

impl Expression {
    #[must_use]
    pub fn field(name: impl Into<String>) -> Self {
        Self::Field(name.into())
    }

    #[must_use]
    pub fn literal(value: impl Into<Bson>) -> Self {
        Self::Literal(value.into())
    }

    /// Builds an operation.
    ///
    /// # Errors
    /// Returns `DivisionByZero` when dividing or taking the modulo by a literal zero.
    pub fn operation(op: ExpressionOp, operands: Vec<Expression>) -> Result<Self> {
        if matches!(op, ExpressionOp::Divide | ExpressionOp::Mod)
            && operands.iter().skip(1).any(Expression::is_zero_literal)
        {
            return Err(MappingError::DivisionByZero(format!(
                "{} by literal zero",
                op.operator()
            )));
        }
        Ok(Self::Operation { op, operands })
    }

    /// Binary operation that flattens `(a + b) + c` into `a + b + c` for variadic operators.
    ///
    /// # Errors
    /// See [`Expression::operation`].
    pub fn binary(op: ExpressionOp, left: Expression, right: Expression) -> Result<Self> {
        match left {
            Self::Operation { op: inner, mut operands } if inner == op && op.is_variadic() => {
                operands.push(right);
                Ok(Self::Operation { op, operands })
            }
            left => Self::operation(op, vec![left, right]),
        }
    }

    fn is_zero_literal(&self) -> bool {
        match self {
            Self::Literal(Bson::Int32(v)) => *v == 0,
            Self::Literal(Bson::Int64(v)) => *v == 0,
            Self::Literal(Bson::Double(v)) => *v == 0.0,
            _ => false,
        }
    }

    /// Renders against the stage context.
    ///
    /// # Errors
    /// Returns `InvalidReference` for a field not exposed to the stage.
    pub fn render(&self, ctx: &AggregationContext<'_>) -> Result<Bson> {
        match self {
            Self::Field(name) => ctx.render_reference(name).map(Bson::String),
            Self::Literal(v) => Ok(v.clone()),
            Self::Operation { op, operands } => {
                let rendered =
                    operands.iter().map(|o| o.render(ctx)).collect::<Result<Vec<_>>>()?;
                let mut d = BsonDocument::new();
                d.insert(op.operator(), Bson::Array(rendered));
                Ok(Bson::Document(d))
            }
        }
    }
}

impl From<&str> for Expression {
    fn from(name: &str) -> Self {
        Self::Field(name.to_string())
    }
}

macro_rules! literal_from {
    ($($t:ty),*) => {
        $(impl From<$t> for Expression {
            fn from(v: $t) -> Self {
                Self::Literal(Bson::from(v))
            }
        })*
    };
}

literal_from!(i32, i64, f64, bool);
