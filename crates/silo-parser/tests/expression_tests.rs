//! Integration tests for the expression layer: grammar round-trips and the
//! definition-time error taxonomy

use silo_core::ast::{AggFunc, BinaryOp, Expr, UnaryOp};
use silo_core::types::{DType, Field, Schema, Value};
use silo_parser::{check_aggregate, parse, parse_raw, ExpressionError};

fn schema() -> Schema {
    Schema::new(vec![
        Field::new("user_id", DType::Int64),
        Field::new("amount", DType::Float64),
        Field::new("country", DType::String),
        Field::new("is_vip", DType::Bool),
        Field::new("ts", DType::Timestamp),
    ])
    .unwrap()
}

#[test]
fn parses_and_types_a_full_expression() {
    let typed = parse("is_vip ? amount * 0.9 : amount + 1", &schema()).unwrap();
    assert_eq!(typed.dtype, DType::Float64);
}

#[test]
fn round_trips_canonical_form() {
    let cases = [
        "((amount + 3.5) * 2.0)",
        "((user_id > 100) && !is_vip)",
        "((country == \"SE\") ? 25.0 : 0.0)",
        "-amount",
        "((amount % 3.0) != 0.0)",
    ];
    for text in cases {
        let first = parse_raw(text).unwrap();
        let second = parse_raw(&first.to_string()).unwrap();
        assert_eq!(first, second, "round trip failed for {}", text);
    }
}

#[test]
fn round_trips_builder_constructed_trees() {
    let expr = Expr::if_else(
        Expr::binary(
            Expr::unary(UnaryOp::Not, Expr::field("is_vip")),
            BinaryOp::And,
            Expr::binary(
                Expr::field("amount"),
                BinaryOp::GtEq,
                Expr::literal(Value::Float64(10.0)),
            ),
        ),
        Expr::literal(Value::String("standard".to_string())),
        Expr::field("country"),
    );
    assert_eq!(parse_raw(&expr.to_string()).unwrap(), expr);
}

#[test]
fn unknown_field_is_typed_error_kind() {
    match parse("amont > 10", &schema()) {
        Err(ExpressionError::UnknownField(name)) => assert_eq!(name, "amont"),
        other => panic!("expected UnknownField, got {:?}", other.map(|t| t.dtype)),
    }
}

#[test]
fn unknown_function_is_typed_error_kind() {
    match parse_raw("median(amount)") {
        Err(ExpressionError::UnknownFunction(name)) => assert_eq!(name, "median"),
        other => panic!("expected UnknownFunction, got {:?}", other),
    }
}

#[test]
fn operand_mismatch_is_type_error() {
    assert!(matches!(
        parse("country * 2", &schema()),
        Err(ExpressionError::TypeError(_))
    ));
    assert!(matches!(
        parse("is_vip + 1", &schema()),
        Err(ExpressionError::TypeError(_))
    ));
}

#[test]
fn aggregates_are_rejected_outside_windows() {
    assert!(matches!(
        parse("sum(amount)", &schema()),
        Err(ExpressionError::TypeError(_))
    ));
}

#[test]
fn aggregate_argument_checked_against_schema() {
    let arg = parse_raw("amount * 2.0").unwrap();
    let (typed, result) = check_aggregate(AggFunc::Sum, &arg, &schema()).unwrap();
    assert_eq!(typed.dtype, DType::Float64);
    assert_eq!(result, DType::Float64);

    let (_, count_dtype) = check_aggregate(AggFunc::Count, &arg, &schema()).unwrap();
    assert_eq!(count_dtype, DType::Int64);

    let bad = parse_raw("country").unwrap();
    assert!(matches!(
        check_aggregate(AggFunc::Avg, &bad, &schema()),
        Err(ExpressionError::TypeError(_))
    ));
}

#[test]
fn evaluation_is_pure_and_repeatable() {
    use silo_core::types::Row;
    let typed = parse("is_vip ? amount * 0.5 : amount", &schema()).unwrap();
    let row = Row::new(vec![
        Value::Int64(1),
        Value::Float64(8.0),
        Value::String("SE".to_string()),
        Value::Bool(true),
        Value::Timestamp(0),
    ]);
    let first = typed.eval(&row).unwrap();
    let second = typed.eval(&row).unwrap();
    assert_eq!(first, Value::Float64(4.0));
    assert_eq!(first, second);
}
