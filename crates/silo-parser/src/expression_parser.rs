//! Expression parser
//!
//! Parses string expressions into `Expr` AST nodes.
//!
//! Supported syntax:
//! - Field references: `amount`, `user_id`
//! - Literals: `42`, `3.5`, `"string"`, `true`, `false`, `null`
//! - Binary operators: `>`, `<`, `>=`, `<=`, `==`, `!=`, `+`, `-`, `*`,
//!   `/`, `%`, `&&`, `||`
//! - Unary operators: `!`, `-`
//! - Conditional: `cond ? a : b`
//! - Aggregation calls: `sum(amount)`, `count(order_id)`
//! - Parentheses for grouping: `(a + b) * c`
//!
//! The grammar round-trips: parsing the `Display` form of any `Expr`
//! reproduces a structurally equal tree.

use crate::error::{ExpressionError, Result};
use silo_core::ast::{AggFunc, BinaryOp, Expr, UnaryOp};
use silo_core::types::Value;

/// Expression parser
pub struct ExpressionParser;

impl ExpressionParser {
    /// Parse an expression from a string
    pub fn parse(input: &str) -> Result<Expr> {
        let input = input.trim();

        if input.is_empty() {
            return Err(ExpressionError::SyntaxError("empty expression".to_string()));
        }

        Self::parse_expression(input)
    }

    /// Parse a complete expression (handles the conditional and binary
    /// operators by precedence)
    fn parse_expression(input: &str) -> Result<Expr> {
        let input = input.trim();

        // Conditional has the lowest precedence
        if let Some((condition, then_expr, else_expr)) = Self::split_ternary(input)? {
            return Ok(Expr::if_else(
                Self::parse_expression(condition)?,
                Self::parse_expression(then_expr)?,
                Self::parse_expression(else_expr)?,
            ));
        }

        // Binary operators, loosest binding first
        for operators in [
            &["||"][..],
            &["&&"][..],
            &["==", "!=", "<=", ">=", "<", ">"][..],
            &["+", "-"][..],
            &["*", "/", "%"][..],
        ] {
            if let Some((left, op, right)) = Self::split_by_operator(input, operators) {
                let op = BinaryOp::from_symbol(op).ok_or_else(|| {
                    ExpressionError::SyntaxError(format!("invalid operator '{}'", op))
                })?;
                return Ok(Expr::binary(
                    Self::parse_expression(left)?,
                    op,
                    Self::parse_expression(right)?,
                ));
            }
        }

        Self::parse_primary(input)
    }

    /// Parse a primary expression
    fn parse_primary(input: &str) -> Result<Expr> {
        let input = input.trim();

        if input.is_empty() {
            return Err(ExpressionError::SyntaxError("empty expression".to_string()));
        }

        // Unary operators
        if let Some(rest) = input.strip_prefix('!') {
            return Ok(Expr::unary(UnaryOp::Not, Self::parse_primary(rest.trim())?));
        }
        if let Some(rest) = input.strip_prefix('-') {
            let rest = rest.trim();
            if !rest.starts_with(|c: char| c.is_ascii_digit()) {
                return Ok(Expr::unary(UnaryOp::Neg, Self::parse_primary(rest)?));
            }
        }

        // Parentheses wrapping the whole expression
        if input.starts_with('(') && input.ends_with(')') && Self::is_wrapped(input) {
            return Self::parse_expression(&input[1..input.len() - 1]);
        }

        // String literals (no escape sequences in the grammar)
        if input.len() >= 2 && input.starts_with('"') && input.ends_with('"') {
            let s = &input[1..input.len() - 1];
            if s.contains('"') {
                return Err(ExpressionError::SyntaxError(format!(
                    "unterminated string literal: {}",
                    input
                )));
            }
            return Ok(Expr::literal(Value::String(s.to_string())));
        }

        // Keyword literals
        match input {
            "true" => return Ok(Expr::literal(Value::Bool(true))),
            "false" => return Ok(Expr::literal(Value::Bool(false))),
            "null" => return Ok(Expr::literal(Value::Null)),
            _ => {}
        }

        // Number literals: a decimal point or exponent makes a float
        if input.starts_with(|c: char| c.is_ascii_digit() || c == '-') {
            if input.contains('.') || input.contains('e') || input.contains('E') {
                if let Ok(num) = input.parse::<f64>() {
                    return Ok(Expr::literal(Value::Float64(num)));
                }
            } else if let Ok(num) = input.parse::<i64>() {
                return Ok(Expr::literal(Value::Int64(num)));
            }
        }

        // Aggregation calls
        if let Some(paren_pos) = input.find('(') {
            let func_name = input[..paren_pos].trim();
            let is_identifier = !func_name.is_empty()
                && func_name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_');
            if input.ends_with(')') && is_identifier {
                let arg_str = &input[paren_pos + 1..input.len() - 1];

                let func = AggFunc::from_name(func_name)
                    .ok_or_else(|| ExpressionError::UnknownFunction(func_name.to_string()))?;

                if arg_str.trim().is_empty() {
                    return Err(ExpressionError::SyntaxError(format!(
                        "{} takes exactly one argument",
                        func_name
                    )));
                }
                return Ok(Expr::aggregate(func, Self::parse_expression(arg_str)?));
            }
        }

        // Identifier is a field reference
        if input
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
            && input.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
        {
            return Ok(Expr::field(input));
        }

        Err(ExpressionError::SyntaxError(format!(
            "cannot parse: {}",
            input
        )))
    }

    /// Split a top-level `cond ? then : else`
    fn split_ternary(input: &str) -> Result<Option<(&str, &str, &str)>> {
        let bytes = input.as_bytes();
        let mut paren_depth = 0i32;
        let mut in_string = false;

        for i in 0..input.len() {
            let c = bytes[i] as char;
            match c {
                '"' => in_string = !in_string,
                '(' if !in_string => paren_depth += 1,
                ')' if !in_string => paren_depth -= 1,
                '?' if !in_string && paren_depth == 0 => {
                    // find the matching ':', skipping nested conditionals
                    let mut nested = 0;
                    let mut in_string2 = false;
                    for j in i + 1..input.len() {
                        let d = bytes[j] as char;
                        match d {
                            '"' => in_string2 = !in_string2,
                            '(' if !in_string2 => paren_depth += 1,
                            ')' if !in_string2 => paren_depth -= 1,
                            '?' if !in_string2 && paren_depth == 0 => nested += 1,
                            ':' if !in_string2 && paren_depth == 0 => {
                                if nested == 0 {
                                    return Ok(Some((
                                        input[..i].trim(),
                                        input[i + 1..j].trim(),
                                        input[j + 1..].trim(),
                                    )));
                                }
                                nested -= 1;
                            }
                            _ => {}
                        }
                    }
                    return Err(ExpressionError::SyntaxError(format!(
                        "conditional missing ':' in: {}",
                        input
                    )));
                }
                _ => {}
            }
        }
        Ok(None)
    }

    /// Split input at the rightmost top-level occurrence of one of the
    /// operators (right-to-left scan gives left-to-right associativity)
    fn split_by_operator<'a>(
        input: &'a str,
        operators: &[&str],
    ) -> Option<(&'a str, &'a str, &'a str)> {
        let bytes = input.as_bytes();
        let mut paren_depth = 0i32;
        let mut in_string = false;

        // Pre-scan string regions so the reverse scan can skip them
        let mut string_mask = vec![false; input.len()];
        for (i, &b) in bytes.iter().enumerate() {
            if b == b'"' {
                in_string = !in_string;
                string_mask[i] = true;
            } else {
                string_mask[i] = in_string;
            }
        }

        for i in (0..input.len()).rev() {
            if string_mask[i] {
                continue;
            }
            let c = bytes[i] as char;

            if c == ')' {
                paren_depth += 1;
            } else if c == '(' {
                paren_depth -= 1;
            }

            if paren_depth != 0 {
                continue;
            }

            for &op in operators {
                if i + op.len() <= input.len() && &input[i..i + op.len()] == op {
                    // Not part of a longer operator
                    let standalone = (i == 0 || !Self::is_operator_char(bytes[i - 1] as char))
                        && (i + op.len() >= input.len()
                            || !Self::is_operator_char(bytes[i + op.len()] as char));
                    if !standalone {
                        continue;
                    }

                    let left = input[..i].trim_end();
                    // A leading operator or empty left side means this
                    // occurrence is unary, not binary
                    if left.is_empty()
                        || left.ends_with(|c: char| Self::is_operator_char(c))
                        || left.ends_with('?')
                        || left.ends_with(':')
                    {
                        continue;
                    }

                    return Some((left, &input[i..i + op.len()], input[i + op.len()..].trim()));
                }
            }
        }

        None
    }

    /// Whether the parentheses at both ends wrap the entire input
    fn is_wrapped(input: &str) -> bool {
        let bytes = input.as_bytes();
        let mut depth = 0i32;
        let mut in_string = false;
        for i in 0..input.len() {
            match bytes[i] as char {
                '"' => in_string = !in_string,
                '(' if !in_string => depth += 1,
                ')' if !in_string => {
                    depth -= 1;
                    if depth == 0 && i != input.len() - 1 {
                        return false;
                    }
                }
                _ => {}
            }
        }
        depth == 0
    }

    /// Check if a character is part of an operator
    fn is_operator_char(c: char) -> bool {
        matches!(c, '=' | '!' | '<' | '>' | '&' | '|' | '+' | '-' | '*' | '/' | '%')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_literals() {
        assert_eq!(
            ExpressionParser::parse("42").unwrap(),
            Expr::literal(Value::Int64(42))
        );
        assert_eq!(
            ExpressionParser::parse("3.5").unwrap(),
            Expr::literal(Value::Float64(3.5))
        );
        assert_eq!(
            ExpressionParser::parse("\"hi\"").unwrap(),
            Expr::literal(Value::String("hi".to_string()))
        );
        assert_eq!(
            ExpressionParser::parse("true").unwrap(),
            Expr::literal(Value::Bool(true))
        );
        assert_eq!(
            ExpressionParser::parse("null").unwrap(),
            Expr::literal(Value::Null)
        );
    }

    #[test]
    fn test_parse_negative_literal() {
        assert_eq!(
            ExpressionParser::parse("-3").unwrap(),
            Expr::literal(Value::Int64(-3))
        );
    }

    #[test]
    fn test_precedence() {
        // a + b * c parses as a + (b * c)
        let expr = ExpressionParser::parse("a + b * c").unwrap();
        assert_eq!(
            expr,
            Expr::binary(
                Expr::field("a"),
                BinaryOp::Add,
                Expr::binary(Expr::field("b"), BinaryOp::Mul, Expr::field("c")),
            )
        );
    }

    #[test]
    fn test_parentheses() {
        let expr = ExpressionParser::parse("(a + b) * c").unwrap();
        assert_eq!(
            expr,
            Expr::binary(
                Expr::binary(Expr::field("a"), BinaryOp::Add, Expr::field("b")),
                BinaryOp::Mul,
                Expr::field("c"),
            )
        );
    }

    #[test]
    fn test_adjacent_paren_groups_not_stripped() {
        let expr = ExpressionParser::parse("(a) * (b)").unwrap();
        assert_eq!(
            expr,
            Expr::binary(Expr::field("a"), BinaryOp::Mul, Expr::field("b"))
        );
    }

    #[test]
    fn test_comparison_and_logic() {
        let expr = ExpressionParser::parse("amount > 10 && flag").unwrap();
        assert_eq!(
            expr,
            Expr::binary(
                Expr::binary(
                    Expr::field("amount"),
                    BinaryOp::Gt,
                    Expr::literal(Value::Int64(10)),
                ),
                BinaryOp::And,
                Expr::field("flag"),
            )
        );
    }

    #[test]
    fn test_ternary() {
        let expr = ExpressionParser::parse("a > 0 ? a : 0").unwrap();
        assert_eq!(
            expr,
            Expr::if_else(
                Expr::binary(Expr::field("a"), BinaryOp::Gt, Expr::literal(Value::Int64(0))),
                Expr::field("a"),
                Expr::literal(Value::Int64(0)),
            )
        );
    }

    #[test]
    fn test_nested_ternary_right_associative() {
        let expr = ExpressionParser::parse("a ? 1 : b ? 2 : 3").unwrap();
        assert_eq!(
            expr,
            Expr::if_else(
                Expr::field("a"),
                Expr::literal(Value::Int64(1)),
                Expr::if_else(
                    Expr::field("b"),
                    Expr::literal(Value::Int64(2)),
                    Expr::literal(Value::Int64(3)),
                ),
            )
        );
    }

    #[test]
    fn test_aggregate_call() {
        let expr = ExpressionParser::parse("sum(amount * 2)").unwrap();
        assert_eq!(
            expr,
            Expr::aggregate(
                AggFunc::Sum,
                Expr::binary(
                    Expr::field("amount"),
                    BinaryOp::Mul,
                    Expr::literal(Value::Int64(2)),
                ),
            )
        );
    }

    #[test]
    fn test_unknown_function() {
        let result = ExpressionParser::parse("median(amount)");
        assert!(matches!(result, Err(ExpressionError::UnknownFunction(_))));
    }

    #[test]
    fn test_unary_not() {
        let expr = ExpressionParser::parse("!flag").unwrap();
        assert_eq!(expr, Expr::unary(UnaryOp::Not, Expr::field("flag")));
    }

    #[test]
    fn test_unary_neg_of_field() {
        let expr = ExpressionParser::parse("-amount").unwrap();
        assert_eq!(expr, Expr::unary(UnaryOp::Neg, Expr::field("amount")));
    }

    #[test]
    fn test_binary_with_negative_literal() {
        let expr = ExpressionParser::parse("a < -3").unwrap();
        assert_eq!(
            expr,
            Expr::binary(Expr::field("a"), BinaryOp::Lt, Expr::literal(Value::Int64(-3)))
        );
    }

    #[test]
    fn test_operator_inside_string_ignored() {
        let expr = ExpressionParser::parse("name == \"a+b\"").unwrap();
        assert_eq!(
            expr,
            Expr::binary(
                Expr::field("name"),
                BinaryOp::Eq,
                Expr::literal(Value::String("a+b".to_string())),
            )
        );
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(
            ExpressionParser::parse("   "),
            Err(ExpressionError::SyntaxError(_))
        ));
    }

    #[test]
    fn test_display_round_trip() {
        for text in [
            "((a + 3) * b)",
            "((amount < 0) ? 0 : amount)",
            "sum((amount * 2))",
            "(!flag || (a >= 2.5))",
        ] {
            let expr = ExpressionParser::parse(text).unwrap();
            let reparsed = ExpressionParser::parse(&expr.to_string()).unwrap();
            assert_eq!(expr, reparsed);
        }
    }
}
