//! `$project` stage.

use bson::{Bson, Document as BsonDocument, doc};

use crate::aggregation::context::AggregationContext;
use crate::aggregation::expression::{Expression, ExpressionOp};
use crate::aggregation::fields::{ExposedField, ExposedFields, Field};
use crate::aggregation::parser::parse_expression;
use crate::errors::{MappingError, Result};
use crate::mapping::ID_FIELD;

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Include(Field),
    Exclude(String),
    Expression { name: String, expr: Expression },
    /// Exposes the previous group's `_id` under a name.
    PreviousOperation(String),
}

impl Projection {
    fn output_name(&self) -> &str {
        match self {
            Self::Include(field) => field.name(),
            Self::Exclude(name) | Self::PreviousOperation(name) => name,
            Self::Expression { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectionOperation {
    projections: Vec<Projection>,
}

/// `project("a", "b")`: includes the given paths.
#[must_use]
pub fn project(paths: &[&str]) -> ProjectionOperation {
    ProjectionOperation::default().and_include(paths)
}

impl ProjectionOperation {
    #[must_use]
    pub fn project_fields(fields: Vec<Field>) -> Self {
        Self { projections: fields.into_iter().map(Projection::Include).collect() }
    }

    #[must_use]
    pub fn projections(&self) -> &[Projection] {
        &self.projections
    }

    /// Starts a projection derived from the field `name`.
    #[must_use]
    pub fn and(self, name: &str) -> ProjectionOperationBuilder {
        let field = Field::new(name);
        ProjectionOperationBuilder {
            operation: self,
            name: Some(field.name().to_string()),
            expression: Expression::field(field.target()),
            derived: false,
        }
    }

    /// Starts a projection over an infix expression such as `(a + b) * [0]`.
    ///
    /// # Errors
    /// Returns `Expression` or `DivisionByZero` from parsing.
    pub fn and_expression(self, expression: &str, params: &[Bson]) -> Result<ProjectionOperationBuilder> {
        let expression = parse_expression(expression, params)?;
        Ok(ProjectionOperationBuilder { operation: self, name: None, expression, derived: true })
    }

    #[must_use]
    pub fn and_include(mut self, paths: &[&str]) -> Self {
        self.projections.extend(paths.iter().map(|p| Projection::Include(Field::new(p))));
        self
    }

    /// Excludes fields.
    ///
    /// # Errors
    /// Returns `InvalidProjection` when excluding anything but `_id` next to inclusions.
    pub fn and_exclude(mut self, names: &[&str]) -> Result<Self> {
        self.projections.extend(names.iter().map(|n| Projection::Exclude((*n).to_string())));
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        let has_inclusions = self.projections.iter().any(|p| !matches!(p, Projection::Exclude(_)));
        if !has_inclusions {
            return Ok(());
        }
        match self.excluded().find(|name| *name != ID_FIELD) {
            Some(name) => Err(MappingError::InvalidProjection(format!(
                "cannot exclude '{name}' alongside inclusions; only {ID_FIELD} may be excluded"
            ))),
            None => Ok(()),
        }
    }

    /// Only exclusions: the stage passes everything else through.
    #[must_use]
    pub fn is_exclusion_only(&self) -> bool {
        self.projections.iter().all(|p| matches!(p, Projection::Exclude(_)))
    }

    pub(crate) fn excluded(&self) -> impl Iterator<Item = &str> {
        self.projections.iter().filter_map(|p| match p {
            Projection::Exclude(name) => Some(name.as_str()),
            _ => None,
        })
    }

    fn push(mut self, projection: Projection) -> Self {
        self.projections.retain(|p| p.output_name() != projection.output_name());
        self.projections.push(projection);
        self
    }

    /// Renders `{ $project: { ... } }` against the incoming fields.
    ///
    /// # Errors
    /// Returns `InvalidReference` for unexposed fields and `InvalidProjection` for mixed
    /// include/exclude.
    pub fn render(&self, ctx: &AggregationContext<'_>) -> Result<BsonDocument> {
        self.validate()?;
        let mut body = BsonDocument::new();
        for projection in &self.projections {
            let value = match projection {
                Projection::Include(field) => {
                    let reference = ctx.reference(field.target())?;
                    if !field.is_aliased() && reference.is_plain(field.name()) {
                        Bson::Int32(1)
                    } else {
                        Bson::String(reference.render())
                    }
                }
                Projection::Exclude(name) if name != ID_FIELD => {
                    let reference = ctx.reference(name)?;
                    body.insert(reference.raw(), Bson::Int32(0));
                    continue;
                }
                Projection::Exclude(_) => Bson::Int32(0),
                Projection::Expression { expr, .. } => expr.render(ctx)?,
                Projection::PreviousOperation(_) => Bson::String(format!("${ID_FIELD}")),
            };
            body.insert(projection.output_name(), value);
        }
        Ok(doc! { "$project": body })
    }

    /// Fields visible to the next stage.
    #[must_use]
    pub fn exposed(&self, incoming: ExposedFields) -> ExposedFields {
        let excluded: Vec<String> = self.excluded().map(str::to_string).collect();
        let outputs: Vec<ExposedField> = self
            .projections
            .iter()
            .filter(|p| !matches!(p, Projection::Exclude(_)))
            .map(|p| ExposedField::plain(p.output_name()))
            .collect();
        if outputs.is_empty() {
            return incoming.without(&excluded);
        }
        let base = if excluded.iter().any(|e| e == ID_FIELD) {
            ExposedFields::closed(Vec::new())
        } else {
            ExposedFields::closed(vec![ExposedField::plain(ID_FIELD)])
        };
        outputs.into_iter().fold(base, ExposedFields::and)
    }
}

/// Pending projection: an expression over a field (or parsed expression) awaiting a name.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionOperationBuilder {
    operation: ProjectionOperation,
    name: Option<String>,
    expression: Expression,
    derived: bool,
}

impl ProjectionOperationBuilder {
    /// Names the projection and returns to the stage.
    #[must_use]
    pub fn alias(self, name: &str) -> ProjectionOperation {
        let projection = match self.expression {
            Expression::Field(target) if !self.derived => {
                Projection::Include(Field::aliased(name, &target))
            }
            expr => Projection::Expression { name: name.to_string(), expr },
        };
        self.operation.push(projection)
    }

    /// Finishes under the original field name.
    ///
    /// # Errors
    /// Returns `InvalidProjection` for an unnamed expression projection.
    pub fn build(self) -> Result<ProjectionOperation> {
        let name = self.name.clone().ok_or_else(|| {
            MappingError::InvalidProjection("expression projection needs an alias".to_string())
        })?;
        Ok(self.alias(&name))
    }

    /// Projects the previous group's `_id` as this field and drops `_id` itself.
    ///
    /// # Errors
    /// Returns `InvalidProjection` for an unnamed expression projection.
    pub fn previous_operation(self) -> Result<ProjectionOperation> {
        let name = self.name.ok_or_else(|| {
            MappingError::InvalidProjection("previous operation needs a field name".to_string())
        })?;
        Ok(self
            .operation
            .push(Projection::Exclude(ID_FIELD.to_string()))
            .push(Projection::PreviousOperation(name)))
    }

    fn combine(self, op: ExpressionOp, operand: Expression) -> Result<Self> {
        let expression = Expression::operation(op, vec![self.expression.clone(), operand])?;
        Ok(Self { expression, derived: true, ..self })
    }

    fn unary(self, op: ExpressionOp) -> Self {
        let expression = Expression::Operation { op, operands: vec![self.expression.clone()] };
        Self { expression, derived: true, ..self }
    }

    fn arithmetic(self, op: ExpressionOp, operand: Expression) -> Self {
        let expression = Expression::Operation { op, operands: vec![self.expression.clone(), operand] };
        Self { expression, derived: true, ..self }
    }

    #[must_use]
    pub fn plus(self, operand: impl Into<Expression>) -> Self {
        self.arithmetic(ExpressionOp::Add, operand.into())
    }

    #[must_use]
    pub fn minus(self, operand: impl Into<Expression>) -> Self {
        self.arithmetic(ExpressionOp::Subtract, operand.into())
    }

    #[must_use]
    pub fn multiply(self, operand: impl Into<Expression>) -> Self {
        self.arithmetic(ExpressionOp::Multiply, operand.into())
    }

    /// # Errors
    /// Returns `DivisionByZero` for a literal zero divisor.
    pub fn divide(self, operand: impl Into<Expression>) -> Result<Self> {
        self.combine(ExpressionOp::Divide, operand.into())
    }

    /// # Errors
    /// Returns `DivisionByZero` for a literal zero divisor.
    pub fn modulo(self, operand: impl Into<Expression>) -> Result<Self> {
        self.combine(ExpressionOp::Mod, operand.into())
    }

    #[must_use]
    pub fn extract_hour(self) -> Self {
        self.unary(ExpressionOp::Hour)
    }

    #[must_use]
    pub fn extract_minute(self) -> Self {
        self.unary(ExpressionOp::Minute)
    }

    #[must_use]
    pub fn extract_second(self) -> Self {
        self.unary(ExpressionOp::Second)
    }

    #[must_use]
    pub fn extract_millisecond(self) -> Self {
        self.unary(ExpressionOp::Millisecond)
    }

    #[must_use]
    pub fn extract_year(self) -> Self {
        self.unary(ExpressionOp::Year)
    }

    #[must_use]
    pub fn extract_month(self) -> Self {
        self.unary(ExpressionOp::Month)
    }

    #[must_use]
    pub fn extract_week(self) -> Self {
        self.unary(ExpressionOp::Week)
    }

    #[must_use]
    pub fn extract_day_of_year(self) -> Self {
        self.unary(ExpressionOp::DayOfYear)
    }

    #[must_use]
    pub fn extract_day_of_month(self) -> Self {
        self.unary(ExpressionOp::DayOfMonth)
    }

    #[must_use]
    pub fn extract_day_of_week(self) -> Self {
        self.unary(ExpressionOp::DayOfWeek)
    }

    #[must_use]
    pub fn size(self) -> Self {
        self.unary(ExpressionOp::Size)
    }
}
