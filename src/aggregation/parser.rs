//! Infix arithmetic expressions for projections, e.g. `(netPrice + surCharge) * taxrate * [0]`.
//!
//! `* / %` bind tighter than `+ -`; `[n]` is the n-th positional parameter. Both parenthesis
//! nesting and operator chains are bounded by [`MAX_NESTING`].

use bson::Bson;
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit1, multispace0},
    combinator::{map, opt, recognize},
    error::{Error, ErrorKind, ParseError},
    sequence::{delimited, pair},
};

use crate::aggregation::expression::{Expression, ExpressionOp};
use crate::errors::{MappingError, Result};

/// Deepest expression tree (and parenthesis nesting) the parser accepts.
pub const MAX_NESTING: usize = 64;

/// Parses `input`, substituting `[n]` with `params[n]`.
///
/// # Errors
/// Returns `Expression` for syntax errors or a parameter index out of range, and
/// `DivisionByZero` for a literal zero divisor and `DepthExceeded` past [`MAX_NESTING`].
pub fn parse_expression(input: &str, params: &[Bson]) -> Result<Expression> {
    let (rest, ast) = additive(input, 0).map_err(|e| match e {
        nom::Err::Failure(err) if err.code == ErrorKind::TooLarge => {
            MappingError::DepthExceeded(MAX_NESTING)
        }
        e => MappingError::Expression(format!("cannot parse '{input}': {e}")),
    })?;
    if !rest.trim().is_empty() {
        return Err(MappingError::Expression(format!(
            "unexpected trailing input '{}' in '{input}'",
            rest.trim()
        )));
    }
    ast.build(params)
}

/// Parsed form before parameters are bound.
#[derive(Debug, Clone, PartialEq)]
enum Ast<'a> {
    Field(&'a str),
    Number(&'a str),
    Param(&'a str),
    Binary(ExpressionOp, Box<Ast<'a>>, Box<Ast<'a>>),
}

impl Ast<'_> {
    fn height(&self) -> usize {
        match self {
            Self::Binary(_, left, right) => 1 + left.height().max(right.height()),
            _ => 0,
        }
    }

    fn build(self, params: &[Bson]) -> Result<Expression> {
        match self {
            Self::Field(name) => Ok(Expression::field(name)),
            Self::Number(text) => number(text).map(Expression::Literal),
            Self::Param(index) => {
                let value = index
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| params.get(i))
                    .ok_or_else(|| {
                        MappingError::Expression(format!(
                            "parameter [{index}] out of range ({} given)",
                            params.len()
                        ))
                    })?;
                Ok(Expression::Literal(value.clone()))
            }
            Self::Binary(op, left, right) => {
                Expression::binary(op, left.build(params)?, right.build(params)?)
            }
        }
    }
}

fn number(text: &str) -> Result<Bson> {
    let parsed = if text.contains('.') {
        text.parse::<f64>().ok().map(Bson::Double)
    } else {
        text.parse::<i32>()
            .map(Bson::Int32)
            .or_else(|_| text.parse::<i64>().map(Bson::Int64))
            .ok()
    };
    parsed.ok_or_else(|| MappingError::Expression(format!("invalid number '{text}'")))
}

fn ws<'a, O, E: ParseError<&'a str>, F>(inner: F) -> impl Parser<&'a str, Output = O, Error = E>
where
    F: Parser<&'a str, Output = O, Error = E>,
{
    delimited(multispace0, inner, multispace0)
}

fn too_deep(input: &str) -> nom::Err<Error<&str>> {
    nom::Err::Failure(Error::new(input, ErrorKind::TooLarge))
}

/// Appends `rhs` to a left-leaning chain, failing once the tree grows past the bound.
fn chain<'a>(
    input: &'a str,
    op: ExpressionOp,
    lhs: Ast<'a>,
    rhs: Ast<'a>,
) -> std::result::Result<Ast<'a>, nom::Err<Error<&'a str>>> {
    let expr = Ast::Binary(op, Box::new(lhs), Box::new(rhs));
    if expr.height() > MAX_NESTING { Err(too_deep(input)) } else { Ok(expr) }
}

fn additive(input: &str, depth: usize) -> IResult<&str, Ast<'_>> {
    let (input, lhs) = multiplicative(input, depth)?;
    let mut remaining = input;
    let mut expr = lhs;
    loop {
        let op_result = ws(alt((
            map(tag("+"), |_| ExpressionOp::Add),
            map(tag("-"), |_| ExpressionOp::Subtract),
        )))
        .parse(remaining);
        match op_result {
            Ok((next, op)) => {
                let (next, rhs) = multiplicative(next, depth)?;
                expr = chain(next, op, expr, rhs)?;
                remaining = next;
            }
            Err(nom::Err::Error(_)) => break,
            Err(e) => return Err(e),
        }
    }
    Ok((remaining, expr))
}

fn multiplicative(input: &str, depth: usize) -> IResult<&str, Ast<'_>> {
    let (input, lhs) = primary(input, depth)?;
    let mut remaining = input;
    let mut expr = lhs;
    loop {
        let op_result = ws(alt((
            map(tag("*"), |_| ExpressionOp::Multiply),
            map(tag("/"), |_| ExpressionOp::Divide),
            map(tag("%"), |_| ExpressionOp::Mod),
        )))
        .parse(remaining);
        match op_result {
            Ok((next, op)) => {
                let (next, rhs) = primary(next, depth)?;
                expr = chain(next, op, expr, rhs)?;
                remaining = next;
            }
            Err(nom::Err::Error(_)) => break,
            Err(e) => return Err(e),
        }
    }
    Ok((remaining, expr))
}

fn primary<'a>(input: &'a str, depth: usize) -> IResult<&'a str, Ast<'a>> {
    if depth > MAX_NESTING {
        return Err(too_deep(input));
    }
    ws(alt((
        delimited(char('('), |i: &'a str| additive(i, depth + 1), ws(char(')'))),
        map(delimited(char('['), ws(digit1), char(']')), Ast::Param),
        map(recognize(pair(digit1, opt(pair(char('.'), digit1)))), Ast::Number),
        map(identifier, Ast::Field),
    )))
    .parse(input)
}

/// `name`, `a.b.c`, `$a`, `$$CURRENT.a`.
fn identifier(input: &str) -> IResult<&str, &str> {
    recognize((
        opt(alt((tag("$$"), tag("$")))),
        take_while1(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '.'),
    ))
    .parse(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::context::AggregationContext;
    use crate::config::MapperConfig;
    use bson::doc;

    fn render(expr: &Expression) -> Bson {
        let cfg = MapperConfig::default();
        let ctx = AggregationContext::untyped(&cfg);
        expr.render(&ctx).unwrap()
    }

    #[test]
    fn flattens_products_with_parameters() {
        let expr =
            parse_expression("(netPrice + surCharge) * taxrate * [0]", &[Bson::Int32(2)]).unwrap();
        assert_eq!(
            render(&expr),
            Bson::Document(doc! {
                "$multiply": [ { "$add": ["$netPrice", "$surCharge"] }, "$taxrate", 2 ]
            })
        );
    }

    #[test]
    fn integer_literals_stay_int32() {
        let expr = parse_expression("date + 86400000", &[]).unwrap();
        assert_eq!(render(&expr), Bson::Document(doc! { "$add": ["$date", 86_400_000_i32] }));
    }

    #[test]
    fn precedence_and_errors() {
        let expr = parse_expression("a - b * 2.5", &[]).unwrap();
        assert_eq!(
            render(&expr),
            Bson::Document(doc! { "$subtract": ["$a", { "$multiply": ["$b", 2.5] }] })
        );
        assert!(matches!(parse_expression("a / 0", &[]), Err(MappingError::DivisionByZero(_))));
        assert!(matches!(parse_expression("a * [3]", &[]), Err(MappingError::Expression(_))));
        assert!(matches!(parse_expression("a +", &[]), Err(MappingError::Expression(_))));
        assert!(matches!(parse_expression("a b", &[]), Err(MappingError::Expression(_))));
    }

    #[test]
    fn nesting_is_bounded() {
        let nested = format!("{}a{}", "(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
        assert_eq!(parse_expression(&nested, &[]).unwrap(), Expression::field("a"));

        let too_deep = format!("{}a{}", "(".repeat(MAX_NESTING + 1), ")".repeat(MAX_NESTING + 1));
        assert!(matches!(
            parse_expression(&too_deep, &[]),
            Err(MappingError::DepthExceeded(MAX_NESTING))
        ));

        let long_chain = vec!["a"; MAX_NESTING + 2].join(" - ");
        assert!(matches!(
            parse_expression(&long_chain, &[]),
            Err(MappingError::DepthExceeded(MAX_NESTING))
        ));
        let short_chain = vec!["a"; MAX_NESTING].join(" - ");
        assert!(parse_expression(&short_chain, &[]).is_ok());
    }
}
