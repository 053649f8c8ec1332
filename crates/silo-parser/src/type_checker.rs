//! Type checker
//!
//! Checks a parsed expression against the declared input schema and
//! produces a `TypedExpr` with every node's type statically determined and
//! every field reference resolved to a column index.

use crate::error::{ExpressionError, Result};
use silo_core::ast::{AggFunc, BinaryOp, Expr, TypedExpr, TypedExprKind, UnaryOp};
use silo_core::types::{DType, Schema, Value};

/// Type checker over a fixed input schema
pub struct TypeChecker<'a> {
    schema: &'a Schema,
}

impl<'a> TypeChecker<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        Self { schema }
    }

    /// Check a row-local expression. Aggregation calls are rejected; they
    /// are only legal at the top level of a window-aggregation column.
    pub fn check(&self, expr: &Expr) -> Result<TypedExpr> {
        match expr {
            Expr::Aggregate { func, .. } => Err(ExpressionError::TypeError(format!(
                "{} is an aggregation and is only usable inside a window aggregation",
                func.name()
            ))),
            _ => self.check_inner(expr),
        }
    }

    /// Check an aggregation column: validates the argument row-locally and
    /// returns it with the function's result type
    pub fn check_aggregate(&self, func: AggFunc, arg: &Expr) -> Result<(TypedExpr, DType)> {
        let typed_arg = self.check(arg)?;
        if !func.accepts(typed_arg.dtype) {
            return Err(ExpressionError::TypeError(format!(
                "{} cannot aggregate values of type {}",
                func.name(),
                typed_arg.dtype
            )));
        }
        let result = func.result_dtype(typed_arg.dtype);
        Ok((typed_arg, result))
    }

    fn check_inner(&self, expr: &Expr) -> Result<TypedExpr> {
        match expr {
            Expr::Literal(value) => {
                let dtype = value.dtype().ok_or_else(|| {
                    ExpressionError::TypeError(
                        "cannot infer the type of a standalone null".to_string(),
                    )
                })?;
                Ok(TypedExpr::new(TypedExprKind::Literal(value.clone()), dtype))
            }

            Expr::Field(name) => {
                let index = self
                    .schema
                    .index_of(name)
                    .ok_or_else(|| ExpressionError::UnknownField(name.clone()))?;
                let dtype = self.schema.fields()[index].dtype;
                Ok(TypedExpr::new(
                    TypedExprKind::Field {
                        index,
                        name: name.clone(),
                    },
                    dtype,
                ))
            }

            Expr::Binary { left, op, right } => self.check_binary(left, *op, right),

            Expr::Unary { op, operand } => {
                let typed = self.check_operand(operand, None)?;
                let dtype = match op {
                    UnaryOp::Not => {
                        if typed.dtype != DType::Bool {
                            return Err(ExpressionError::TypeError(format!(
                                "! requires bool, got {}",
                                typed.dtype
                            )));
                        }
                        DType::Bool
                    }
                    UnaryOp::Neg => {
                        if !typed.dtype.is_numeric() {
                            return Err(ExpressionError::TypeError(format!(
                                "unary - requires a numeric operand, got {}",
                                typed.dtype
                            )));
                        }
                        typed.dtype
                    }
                };
                Ok(TypedExpr::new(
                    TypedExprKind::Unary {
                        op: *op,
                        operand: Box::new(typed),
                    },
                    dtype,
                ))
            }

            Expr::If {
                condition,
                then_expr,
                else_expr,
            } => {
                let typed_condition = self.check_operand(condition, Some(DType::Bool))?;
                if typed_condition.dtype != DType::Bool {
                    return Err(ExpressionError::TypeError(format!(
                        "conditional requires a bool condition, got {}",
                        typed_condition.dtype
                    )));
                }

                let (typed_then, typed_else, dtype) =
                    self.unify_branches(then_expr, else_expr)?;
                Ok(TypedExpr::new(
                    TypedExprKind::If {
                        condition: Box::new(typed_condition),
                        then_expr: Box::new(typed_then),
                        else_expr: Box::new(typed_else),
                    },
                    dtype,
                ))
            }

            Expr::Aggregate { func, .. } => Err(ExpressionError::TypeError(format!(
                "{} cannot be nested inside another expression",
                func.name()
            ))),
        }
    }

    fn check_binary(&self, left: &Expr, op: BinaryOp, right: &Expr) -> Result<TypedExpr> {
        if op.is_logical() {
            let typed_left = self.check_operand(left, Some(DType::Bool))?;
            let typed_right = self.check_operand(right, Some(DType::Bool))?;
            for side in [&typed_left, &typed_right] {
                if side.dtype != DType::Bool {
                    return Err(ExpressionError::TypeError(format!(
                        "{} requires bool operands, got {}",
                        op.symbol(),
                        side.dtype
                    )));
                }
            }
            return Ok(TypedExpr::new(
                TypedExprKind::Binary {
                    left: Box::new(typed_left),
                    op,
                    right: Box::new(typed_right),
                },
                DType::Bool,
            ));
        }

        // A bare null on either side adopts the other side's type
        let (typed_left, typed_right) = if matches!(left, Expr::Literal(Value::Null)) {
            let typed_right = self.check_inner(right)?;
            let typed_left = self.check_operand(left, Some(typed_right.dtype))?;
            (typed_left, typed_right)
        } else {
            let typed_left = self.check_inner(left)?;
            let typed_right = self.check_operand(right, Some(typed_left.dtype))?;
            (typed_left, typed_right)
        };

        if op.is_comparison() {
            let comparable = match (typed_left.dtype, typed_right.dtype) {
                (a, b) if a == b => {
                    a.is_comparable() || matches!(op, BinaryOp::Eq | BinaryOp::NotEq)
                }
                (a, b) => a.numeric_join(b).is_some(),
            };
            if !comparable {
                return Err(ExpressionError::TypeError(format!(
                    "cannot compare {} and {} with {}",
                    typed_left.dtype,
                    typed_right.dtype,
                    op.symbol()
                )));
            }
            return Ok(TypedExpr::new(
                TypedExprKind::Binary {
                    left: Box::new(typed_left),
                    op,
                    right: Box::new(typed_right),
                },
                DType::Bool,
            ));
        }

        // Arithmetic
        let dtype = typed_left
            .dtype
            .numeric_join(typed_right.dtype)
            .ok_or_else(|| {
                ExpressionError::TypeError(format!(
                    "{} requires numeric operands, got {} and {}",
                    op.symbol(),
                    typed_left.dtype,
                    typed_right.dtype
                ))
            })?;
        // Division always widens to float
        let dtype = if op == BinaryOp::Div {
            DType::Float64
        } else {
            dtype
        };

        Ok(TypedExpr::new(
            TypedExprKind::Binary {
                left: Box::new(typed_left),
                op,
                right: Box::new(typed_right),
            },
            dtype,
        ))
    }

    /// Check an operand, letting a bare null literal adopt the expected
    /// type from its context
    fn check_operand(&self, expr: &Expr, expected: Option<DType>) -> Result<TypedExpr> {
        match (expr, expected) {
            (Expr::Literal(Value::Null), Some(dtype)) => {
                Ok(TypedExpr::new(TypedExprKind::Literal(Value::Null), dtype))
            }
            _ => self.check_inner(expr),
        }
    }

    /// Unify the two branches of a conditional
    fn unify_branches(
        &self,
        then_expr: &Expr,
        else_expr: &Expr,
    ) -> Result<(TypedExpr, TypedExpr, DType)> {
        let typed_then = match then_expr {
            Expr::Literal(Value::Null) => {
                let typed_else = self.check_inner(else_expr)?;
                let dtype = typed_else.dtype;
                return Ok((
                    TypedExpr::new(TypedExprKind::Literal(Value::Null), dtype),
                    typed_else,
                    dtype,
                ));
            }
            _ => self.check_inner(then_expr)?,
        };
        let typed_else = self.check_operand(else_expr, Some(typed_then.dtype))?;

        let dtype = if typed_then.dtype == typed_else.dtype {
            typed_then.dtype
        } else {
            typed_then
                .dtype
                .numeric_join(typed_else.dtype)
                .ok_or_else(|| {
                    ExpressionError::TypeError(format!(
                        "conditional branches have incompatible types {} and {}",
                        typed_then.dtype, typed_else.dtype
                    ))
                })?
        };
        Ok((typed_then, typed_else, dtype))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use silo_core::types::Field;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("user_id", DType::Int64),
            Field::new("amount", DType::Float64),
            Field::new("name", DType::String),
            Field::new("flag", DType::Bool),
            Field::new("ts", DType::Timestamp),
        ])
        .unwrap()
    }

    fn check(text: &str) -> Result<TypedExpr> {
        let expr = crate::ExpressionParser::parse(text)?;
        TypeChecker::new(&schema()).check(&expr)
    }

    #[test]
    fn test_field_resolution() {
        let typed = check("amount").unwrap();
        assert_eq!(typed.dtype, DType::Float64);
        assert!(matches!(
            typed.kind,
            TypedExprKind::Field { index: 1, .. }
        ));
    }

    #[test]
    fn test_unknown_field() {
        assert!(matches!(
            check("missing"),
            Err(ExpressionError::UnknownField(_))
        ));
    }

    #[test]
    fn test_numeric_widening() {
        assert_eq!(check("user_id + 1").unwrap().dtype, DType::Int64);
        assert_eq!(check("user_id + amount").unwrap().dtype, DType::Float64);
        assert_eq!(check("user_id / 2").unwrap().dtype, DType::Float64);
    }

    #[test]
    fn test_arithmetic_type_error() {
        assert!(matches!(
            check("name + 1"),
            Err(ExpressionError::TypeError(_))
        ));
    }

    #[test]
    fn test_comparison_yields_bool() {
        assert_eq!(check("amount > 10").unwrap().dtype, DType::Bool);
        assert_eq!(check("name == \"x\"").unwrap().dtype, DType::Bool);
    }

    #[test]
    fn test_string_number_comparison_rejected() {
        assert!(matches!(
            check("name > 3"),
            Err(ExpressionError::TypeError(_))
        ));
    }

    #[test]
    fn test_bool_ordering_rejected() {
        assert!(matches!(
            check("flag < true"),
            Err(ExpressionError::TypeError(_))
        ));
    }

    #[test]
    fn test_logical_requires_bool() {
        assert!(matches!(
            check("amount && flag"),
            Err(ExpressionError::TypeError(_))
        ));
        assert_eq!(check("flag && amount > 1").unwrap().dtype, DType::Bool);
    }

    #[test]
    fn test_conditional_unification() {
        assert_eq!(check("flag ? 1 : 2").unwrap().dtype, DType::Int64);
        assert_eq!(check("flag ? 1 : 2.5").unwrap().dtype, DType::Float64);
        assert!(matches!(
            check("flag ? 1 : \"x\""),
            Err(ExpressionError::TypeError(_))
        ));
    }

    #[test]
    fn test_null_adopts_context_type() {
        let typed = check("flag ? null : amount").unwrap();
        assert_eq!(typed.dtype, DType::Float64);
        let typed = check("amount == null").unwrap();
        assert_eq!(typed.dtype, DType::Bool);
        let typed = check("null == amount").unwrap();
        assert_eq!(typed.dtype, DType::Bool);
    }

    #[test]
    fn test_standalone_null_rejected() {
        assert!(matches!(
            check("null"),
            Err(ExpressionError::TypeError(_))
        ));
    }

    #[test]
    fn test_aggregate_rejected_row_local() {
        assert!(matches!(
            check("sum(amount)"),
            Err(ExpressionError::TypeError(_))
        ));
    }

    #[test]
    fn test_check_aggregate() {
        let checker_schema = schema();
        let checker = TypeChecker::new(&checker_schema);
        let arg = crate::ExpressionParser::parse("amount * 2").unwrap();
        let (typed, result) = checker.check_aggregate(AggFunc::Avg, &arg).unwrap();
        assert_eq!(typed.dtype, DType::Float64);
        assert_eq!(result, DType::Float64);

        let name_arg = Expr::field("name");
        assert!(checker.check_aggregate(AggFunc::Sum, &name_arg).is_err());
    }
}
