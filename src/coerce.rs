//! Conversion of raw form strings into typed JSON values.

use serde_json::{Number, Value};

use crate::error::ConversionError;
use crate::types::{ParseErrorStrategy, PathType};

/// Largest magnitude at which every integer is exactly representable in an `f64`.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Convert the raw values received for `name` into a JSON value of type `ty`.
///
/// Singular fields use the last value; `array<number>` and `array<boolean>`
/// convert every element on its own. Returns `Ok(None)` if there are no
/// values at all.
///
/// # Errors
///
/// Returns a `ConversionError` only under
/// `ParseErrorStrategy::ReturnOnConversionErrors`.
pub fn coerce(
    name: &str,
    raw: &[String],
    ty: PathType,
    strategy: ParseErrorStrategy,
) -> Result<Option<Value>, ConversionError> {
    let Some(last) = raw.last() else {
        return Ok(None);
    };

    let value = match ty {
        PathType::Number => convert(name, None, last, Scalar::Number, strategy)?,
        PathType::Boolean => convert(name, None, last, Scalar::Boolean, strategy)?,
        PathType::String | PathType::Object => Value::String(last.clone()),
        PathType::ArrayOfNumber => convert_all(name, raw, Scalar::Number, strategy)?,
        PathType::ArrayOfBoolean => convert_all(name, raw, Scalar::Boolean, strategy)?,
        PathType::ArrayOfString | PathType::ArrayOfObject | PathType::ArrayOfAny => {
            Value::Array(raw.iter().cloned().map(Value::String).collect())
        }
    };

    Ok(Some(value))
}

/// Parse a number the way form values are parsed: any finite `f64`.
///
/// Integral values within the exactly representable range become JSON integers.
pub fn parse_number(raw: &str) -> Result<Number, String> {
    let f: f64 = raw.parse().map_err(|e| format!("parsing \"{}\": {}", raw, e))?;
    if f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER {
        return Ok(Number::from(f as i64));
    }
    Number::from_f64(f).ok_or_else(|| format!("parsing \"{}\": value is not a finite number", raw))
}

/// Parse a boolean: `1 t T TRUE true True` or `0 f F FALSE false False`.
pub fn parse_bool(raw: &str) -> Result<bool, String> {
    match raw {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
        _ => Err(format!("parsing \"{}\": invalid syntax", raw)),
    }
}

#[derive(Clone, Copy)]
enum Scalar {
    Number,
    Boolean,
}

impl Scalar {
    fn name(self) -> &'static str {
        match self {
            Scalar::Number => "number",
            Scalar::Boolean => "boolean",
        }
    }

    fn parse(self, raw: &str) -> Result<Value, String> {
        match self {
            Scalar::Number => parse_number(raw).map(Value::Number),
            Scalar::Boolean => parse_bool(raw).map(Value::Bool),
        }
    }

    fn zero(self) -> Value {
        match self {
            Scalar::Number => Value::from(0),
            Scalar::Boolean => Value::Bool(false),
        }
    }
}

fn convert(
    name: &str,
    index: Option<usize>,
    raw: &str,
    scalar: Scalar,
    strategy: ParseErrorStrategy,
) -> Result<Value, ConversionError> {
    match scalar.parse(raw) {
        Ok(value) => Ok(value),
        Err(parse_error) => match strategy {
            ParseErrorStrategy::IgnoreConversionErrors => Ok(Value::String(raw.to_string())),
            ParseErrorStrategy::UseEmptyValueOnConversionErrors => Ok(scalar.zero()),
            ParseErrorStrategy::ReturnOnConversionErrors => Err(ConversionError {
                name: name.to_string(),
                index,
                value: raw.to_string(),
                expected: scalar.name(),
                parse_error,
            }),
        },
    }
}

fn convert_all(
    name: &str,
    raw: &[String],
    scalar: Scalar,
    strategy: ParseErrorStrategy,
) -> Result<Value, ConversionError> {
    raw.iter()
        .enumerate()
        .map(|(i, v)| convert(name, Some(i), v, scalar, strategy))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::types::ParseErrorStrategy::*;

    fn raw(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn number_strategies() {
        let values = raw(&["foobar"]);
        assert_eq!(
            coerce("ratio", &values, PathType::Number, IgnoreConversionErrors).unwrap(),
            Some(json!("foobar"))
        );
        assert_eq!(
            coerce("ratio", &values, PathType::Number, UseEmptyValueOnConversionErrors).unwrap(),
            Some(json!(0))
        );

        let err = coerce("ratio", &values, PathType::Number, ReturnOnConversionErrors).unwrap_err();
        assert_eq!(err.name, "ratio");
        assert_eq!(err.value, "foobar");
        assert_eq!(err.index, None);
        assert_eq!(err.expected, "number");
        assert!(err.parse_error.contains("foobar"));
    }

    #[test]
    fn boolean_strategies() {
        let values = raw(&["maybe"]);
        assert_eq!(
            coerce("ok", &values, PathType::Boolean, IgnoreConversionErrors).unwrap(),
            Some(json!("maybe"))
        );
        assert_eq!(
            coerce("ok", &values, PathType::Boolean, UseEmptyValueOnConversionErrors).unwrap(),
            Some(json!(false))
        );
        let err = coerce("ok", &values, PathType::Boolean, ReturnOnConversionErrors).unwrap_err();
        assert_eq!(err.expected, "boolean");
    }

    #[test]
    fn scalars_take_the_last_value() {
        let values = raw(&["1", "2.5"]);
        assert_eq!(
            coerce("n", &values, PathType::Number, ReturnOnConversionErrors).unwrap(),
            Some(json!(2.5))
        );
        let values = raw(&["true", "false"]);
        assert_eq!(
            coerce("b", &values, PathType::Boolean, ReturnOnConversionErrors).unwrap(),
            Some(json!(false))
        );
        let values = raw(&["first", "second"]);
        assert_eq!(
            coerce("s", &values, PathType::String, ReturnOnConversionErrors).unwrap(),
            Some(json!("second"))
        );
    }

    #[test]
    fn earlier_invalid_scalar_values_are_ignored() {
        let values = raw(&["nope", "3"]);
        assert_eq!(
            coerce("n", &values, PathType::Number, ReturnOnConversionErrors).unwrap(),
            Some(json!(3))
        );
    }

    #[test]
    fn number_arrays_convert_each_element() {
        let values = raw(&["1", "x", "2.5"]);
        assert_eq!(
            coerce("n", &values, PathType::ArrayOfNumber, IgnoreConversionErrors).unwrap(),
            Some(json!([1, "x", 2.5]))
        );
        assert_eq!(
            coerce("n", &values, PathType::ArrayOfNumber, UseEmptyValueOnConversionErrors).unwrap(),
            Some(json!([1, 0, 2.5]))
        );

        let err = coerce("n", &values, PathType::ArrayOfNumber, ReturnOnConversionErrors)
            .unwrap_err();
        assert_eq!(err.index, Some(1));
        assert_eq!(err.value, "x");
    }

    #[test]
    fn boolean_arrays_convert_each_element() {
        let values = raw(&["t", "no", "0"]);
        assert_eq!(
            coerce("b", &values, PathType::ArrayOfBoolean, IgnoreConversionErrors).unwrap(),
            Some(json!([true, "no", false]))
        );
    }

    #[test]
    fn string_like_types_are_inserted_as_is() {
        let values = raw(&["1", "true"]);
        for ty in [
            PathType::ArrayOfString,
            PathType::ArrayOfObject,
            PathType::ArrayOfAny,
        ] {
            assert_eq!(
                coerce("a", &values, ty, ReturnOnConversionErrors).unwrap(),
                Some(json!(["1", "true"]))
            );
        }
        assert_eq!(
            coerce("o", &raw(&["{}"]), PathType::Object, ReturnOnConversionErrors).unwrap(),
            Some(json!("{}"))
        );
    }

    #[test]
    fn no_values_produce_nothing() {
        assert_eq!(
            coerce("n", &[], PathType::Number, ReturnOnConversionErrors).unwrap(),
            None
        );
    }

    #[test]
    fn parse_number_forms() {
        assert_eq!(parse_number("42").unwrap(), Number::from(42));
        assert_eq!(parse_number("-7.0").unwrap(), Number::from(-7));
        assert_eq!(parse_number("1e3").unwrap(), Number::from(1000));
        assert_eq!(parse_number("0.5").unwrap(), Number::from_f64(0.5).unwrap());
        assert!(parse_number("").is_err());
        assert!(parse_number("NaN").is_err());
        assert!(parse_number("inf").is_err());
        assert!(parse_number("12abc").is_err());
    }

    #[test]
    fn parse_bool_forms() {
        for t in ["1", "t", "T", "TRUE", "true", "True"] {
            assert_eq!(parse_bool(t), Ok(true));
        }
        for f in ["0", "f", "F", "FALSE", "false", "False"] {
            assert_eq!(parse_bool(f), Ok(false));
        }
        assert!(parse_bool("yes").is_err());
        assert!(parse_bool("tRuE").is_err());
    }
}
