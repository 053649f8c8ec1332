//! Silo Parser - The expression layer of the Silo feature store
//!
//! Parses textual feature expressions into typed, evaluable trees. Type
//! checking happens here, at definition time, against the declared input
//! schema; execution only evaluates and never re-infers types.

pub mod error;
mod expression_parser;
mod type_checker;

pub use error::{ExpressionError, Result};
pub use expression_parser::ExpressionParser;
pub use type_checker::TypeChecker;

use silo_core::ast::{AggFunc, Expr, TypedExpr};
use silo_core::types::{DType, Schema};

/// Parse and type-check an expression against an input schema.
///
/// Aggregation calls are rejected here; they are only legal at the top
/// level of a window-aggregation column, via [`check_aggregate`].
pub fn parse(text: &str, schema: &Schema) -> Result<TypedExpr> {
    let expr = ExpressionParser::parse(text)?;
    TypeChecker::new(schema).check(&expr)
}

/// Parse an expression without type checking
pub fn parse_raw(text: &str) -> Result<Expr> {
    ExpressionParser::parse(text)
}

/// Type-check an already parsed expression
pub fn check(expr: &Expr, schema: &Schema) -> Result<TypedExpr> {
    TypeChecker::new(schema).check(expr)
}

/// Type-check the argument of an aggregation column and return it together
/// with the function's statically determined result type
pub fn check_aggregate(
    func: AggFunc,
    arg: &Expr,
    schema: &Schema,
) -> Result<(TypedExpr, DType)> {
    TypeChecker::new(schema).check_aggregate(func, arg)
}
