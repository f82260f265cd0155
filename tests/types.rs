use proptest::prelude::*;
use serde_json::{Value, json};
use vizbind::types::{DataType, coerce_value, infer_type, resolve_type};

fn strings(values: &[&str]) -> Vec<Value> {
    values.iter().map(|v| Value::from(*v)).collect()
}

#[test]
fn infer_type_examples() {
    assert_eq!(infer_type(&strings(&["1", "2", "3"])), DataType::Integer);
    assert_eq!(infer_type(&strings(&["1", "2.5"])), DataType::Number);
    assert_eq!(infer_type(&strings(&["true", "false"])), DataType::Boolean);
    assert_eq!(infer_type(&Vec::<Value>::new()), DataType::String);
}

#[test]
fn infer_type_recognizes_dates_before_numbers() {
    assert_eq!(
        infer_type(&strings(&["2024-01-01", "2024/02/29", "Jan 05, 2023"])),
        DataType::Date
    );
    assert_eq!(
        infer_type(&strings(&["2024-01-01T10:30:00Z", "2024-01-02 08:00:00"])),
        DataType::Date
    );
    assert_eq!(infer_type(&strings(&["2024-01-01", "7"])), DataType::String);
}

#[test]
fn infer_type_skips_missing_values() {
    let values = vec![Value::Null, json!(""), json!("  "), json!("42")];
    assert_eq!(infer_type(&values), DataType::Integer);
    assert_eq!(infer_type(&[Value::Null, json!("")]), DataType::String);
}

#[test]
fn infer_type_reads_native_json_values() {
    assert_eq!(infer_type(&[json!(1), json!(2)]), DataType::Integer);
    assert_eq!(infer_type(&[json!(1), json!(0.5)]), DataType::Number);
    assert_eq!(infer_type(&[json!(true), json!("false")]), DataType::Boolean);
    assert_eq!(infer_type(&[json!("0-9"), json!("10-19")]), DataType::String);
}

#[test]
fn declared_types_are_not_reinferred() {
    let values = strings(&["1", "2"]);
    assert_eq!(resolve_type(DataType::String, &values), DataType::String);
    assert_eq!(resolve_type(DataType::Auto, &values), DataType::Integer);
}

#[test]
fn coerce_value_follows_target_type() {
    assert_eq!(coerce_value(&json!("42"), DataType::Integer), json!(42));
    assert_eq!(coerce_value(&json!("2.5"), DataType::Number), json!(2.5));
    assert_eq!(coerce_value(&json!("TRUE"), DataType::Boolean), json!(true));
    assert_eq!(coerce_value(&json!(7), DataType::String), json!("7"));
    assert_eq!(coerce_value(&json!(""), DataType::Integer), Value::Null);
    assert_eq!(coerce_value(&json!("abc"), DataType::Number), Value::Null);
}

#[test]
fn date_coercion_keeps_the_ingested_form() {
    assert_eq!(
        coerce_value(&json!("03/15/2024"), DataType::Date),
        json!("03/15/2024")
    );
}

#[test]
fn data_type_parses_aliases() {
    assert_eq!("int".parse::<DataType>().unwrap(), DataType::Integer);
    assert_eq!("Float".parse::<DataType>().unwrap(), DataType::Number);
    assert_eq!("datetime".parse::<DataType>().unwrap(), DataType::Date);
    assert!("decimal".parse::<DataType>().is_err());
}

fn token_strategy() -> impl Strategy<Value = Vec<String>> {
    let tokens = vec![
        "1", "-4", "2.5", "true", "false", "2024-01-01", "03/15/2024", "abc", "",
    ];
    prop::collection::vec(prop::sample::select(tokens).prop_map(str::to_string), 0..12)
}

proptest! {
    #[test]
    fn infer_type_ignores_value_order(tokens in token_strategy()) {
        let values = tokens.iter().map(|t| Value::from(t.as_str())).collect::<Vec<_>>();
        let mut reversed = values.clone();
        reversed.reverse();
        let mut sorted = values.clone();
        sorted.sort_by_key(|v| v.to_string());
        let expected = infer_type(&values);
        prop_assert_eq!(infer_type(&reversed), expected);
        prop_assert_eq!(infer_type(&sorted), expected);
    }
}
