//! Typed expression trees
//!
//! A `TypedExpr` is the output of parse-time type checking: every node
//! carries its statically determined `DType` and field references are
//! resolved to column indexes. Evaluation is a pure function of the row, so
//! plans can be re-executed idempotently on any processor.

use super::operator::{BinaryOp, UnaryOp};
use crate::error::{CoreError, Result};
use crate::types::{DType, Row, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Typed expression node kinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypedExprKind {
    Literal(Value),

    /// Field resolved to a column index in the input schema
    Field { index: usize, name: String },

    Binary {
        left: Box<TypedExpr>,
        op: BinaryOp,
        right: Box<TypedExpr>,
    },

    Unary {
        op: UnaryOp,
        operand: Box<TypedExpr>,
    },

    If {
        condition: Box<TypedExpr>,
        then_expr: Box<TypedExpr>,
        else_expr: Box<TypedExpr>,
    },
}

/// A type-checked, evaluable expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedExpr {
    pub kind: TypedExprKind,
    pub dtype: DType,
}

impl TypedExpr {
    pub fn new(kind: TypedExprKind, dtype: DType) -> Self {
        Self { kind, dtype }
    }

    /// Evaluate against a single row. Null propagates through arithmetic
    /// and comparisons; a null condition selects the else branch.
    pub fn eval(&self, row: &Row) -> Result<Value> {
        match &self.kind {
            TypedExprKind::Literal(value) => Ok(value.clone()),

            TypedExprKind::Field { index, name } => row
                .values
                .get(*index)
                .cloned()
                .ok_or_else(|| CoreError::FieldNotFound(name.clone())),

            TypedExprKind::Binary { left, op, right } => {
                let lhs = left.eval(row)?;
                let rhs = right.eval(row)?;
                if op.is_logical() {
                    eval_logical(&lhs, *op, &rhs)
                } else if op.is_comparison() {
                    eval_compare(&lhs, *op, &rhs)
                } else {
                    eval_arithmetic(&lhs, *op, &rhs, self.dtype)
                }
            }

            TypedExprKind::Unary { op, operand } => {
                let value = operand.eval(row)?;
                eval_unary(*op, &value)
            }

            TypedExprKind::If {
                condition,
                then_expr,
                else_expr,
            } => match condition.eval(row)? {
                Value::Bool(true) => then_expr.eval(row),
                _ => else_expr.eval(row),
            },
        }
    }
}

fn eval_arithmetic(left: &Value, op: BinaryOp, right: &Value, result: DType) -> Result<Value> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }

    match result {
        DType::Int64 => {
            let a = left
                .as_i64()
                .ok_or_else(|| type_error(left, op, right))?;
            let b = right
                .as_i64()
                .ok_or_else(|| type_error(left, op, right))?;
            let value = match op {
                BinaryOp::Add => a.wrapping_add(b),
                BinaryOp::Sub => a.wrapping_sub(b),
                BinaryOp::Mul => a.wrapping_mul(b),
                BinaryOp::Mod => {
                    if b == 0 {
                        return Err(CoreError::DivisionByZero);
                    }
                    a % b
                }
                // Div is typed Float64 and never reaches the Int64 arm
                _ => return Err(type_error(left, op, right)),
            };
            Ok(Value::Int64(value))
        }
        DType::Float64 => {
            let a = left
                .as_f64()
                .ok_or_else(|| type_error(left, op, right))?;
            let b = right
                .as_f64()
                .ok_or_else(|| type_error(left, op, right))?;
            let value = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => {
                    if b == 0.0 {
                        return Err(CoreError::DivisionByZero);
                    }
                    a / b
                }
                BinaryOp::Mod => {
                    if b == 0.0 {
                        return Err(CoreError::DivisionByZero);
                    }
                    a % b
                }
                _ => return Err(type_error(left, op, right)),
            };
            Ok(Value::Float64(value))
        }
        _ => Err(type_error(left, op, right)),
    }
}

fn eval_compare(left: &Value, op: BinaryOp, right: &Value) -> Result<Value> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }

    let ordering = match (left, right) {
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => match op {
            BinaryOp::Eq => return Ok(Value::Bool(a == b)),
            BinaryOp::NotEq => return Ok(Value::Bool(a != b)),
            _ => return Err(type_error(left, op, right)),
        },
        _ => {
            let a = left
                .as_f64()
                .ok_or_else(|| type_error(left, op, right))?;
            let b = right
                .as_f64()
                .ok_or_else(|| type_error(left, op, right))?;
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
    };

    let result = match op {
        BinaryOp::Eq => ordering == Ordering::Equal,
        BinaryOp::NotEq => ordering != Ordering::Equal,
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::LtEq => ordering != Ordering::Greater,
        BinaryOp::Gt => ordering == Ordering::Greater,
        BinaryOp::GtEq => ordering != Ordering::Less,
        _ => return Err(type_error(left, op, right)),
    };
    Ok(Value::Bool(result))
}

fn eval_logical(left: &Value, op: BinaryOp, right: &Value) -> Result<Value> {
    // Three-valued logic: false && x == false and true || x == true even
    // when x is null
    match op {
        BinaryOp::And => match (left.as_bool(), right.as_bool()) {
            (Some(false), _) | (_, Some(false)) => Ok(Value::Bool(false)),
            (Some(true), Some(true)) => Ok(Value::Bool(true)),
            _ if left.is_null() || right.is_null() => Ok(Value::Null),
            _ => Err(type_error(left, op, right)),
        },
        BinaryOp::Or => match (left.as_bool(), right.as_bool()) {
            (Some(true), _) | (_, Some(true)) => Ok(Value::Bool(true)),
            (Some(false), Some(false)) => Ok(Value::Bool(false)),
            _ if left.is_null() || right.is_null() => Ok(Value::Null),
            _ => Err(type_error(left, op, right)),
        },
        _ => Err(type_error(left, op, right)),
    }
}

fn eval_unary(op: UnaryOp, value: &Value) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    match (op, value) {
        (UnaryOp::Not, Value::Bool(v)) => Ok(Value::Bool(!v)),
        (UnaryOp::Neg, Value::Int64(v)) => Ok(Value::Int64(-v)),
        (UnaryOp::Neg, Value::Float64(v)) => Ok(Value::Float64(-v)),
        _ => Err(CoreError::TypeError(format!(
            "cannot apply {} to {:?}",
            op.symbol(),
            value
        ))),
    }
}

fn type_error(left: &Value, op: BinaryOp, right: &Value) -> CoreError {
    CoreError::TypeError(format!(
        "cannot apply {} to {:?} and {:?}",
        op.symbol(),
        left,
        right
    ))
}
