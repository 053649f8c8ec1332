//! Expression AST nodes

use super::operator::{AggFunc, BinaryOp, UnaryOp};
use crate::types::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Expression AST node
///
/// The `Display` impl renders the canonical textual form, which parses back
/// to a structurally equal tree. Rendering is fully parenthesized so no
/// precedence information is lost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Literal value
    Literal(Value),

    /// Reference to an input field by name
    Field(String),

    /// Binary operation
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },

    /// Unary operation
    Unary { op: UnaryOp, operand: Box<Expr> },

    /// Conditional (condition ? then_expr : else_expr)
    If {
        condition: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },

    /// Aggregation call, legal only at the top level of a
    /// window-aggregation column
    Aggregate { func: AggFunc, arg: Box<Expr> },
}

impl Expr {
    /// Create a literal expression
    pub fn literal(value: Value) -> Self {
        Expr::Literal(value)
    }

    /// Create a field reference
    pub fn field(name: impl Into<String>) -> Self {
        Expr::Field(name.into())
    }

    /// Create a binary expression
    pub fn binary(left: Expr, op: BinaryOp, right: Expr) -> Self {
        Expr::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// Create a unary expression
    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    /// Create a conditional expression
    pub fn if_else(condition: Expr, then_expr: Expr, else_expr: Expr) -> Self {
        Expr::If {
            condition: Box::new(condition),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
        }
    }

    /// Create an aggregation call
    pub fn aggregate(func: AggFunc, arg: Expr) -> Self {
        Expr::Aggregate {
            func,
            arg: Box::new(arg),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(value) => match value {
                Value::Null => write!(f, "null"),
                Value::Bool(v) => write!(f, "{}", v),
                Value::Int64(v) => write!(f, "{}", v),
                // {:?} keeps the decimal point on round floats so the
                // literal re-parses as Float64
                Value::Float64(v) => write!(f, "{:?}", v),
                Value::String(v) => write!(f, "\"{}\"", v),
                Value::Timestamp(v) => write!(f, "{}", v),
            },
            Expr::Field(name) => write!(f, "{}", name),
            Expr::Binary { left, op, right } => write!(f, "({} {} {})", left, op.symbol(), right),
            Expr::Unary { op, operand } => write!(f, "{}{}", op.symbol(), operand),
            Expr::If {
                condition,
                then_expr,
                else_expr,
            } => write!(f, "({} ? {} : {})", condition, then_expr, else_expr),
            Expr::Aggregate { func, arg } => write!(f, "{}({})", func.name(), arg),
        }
    }
}
