pub mod dates;

use crate::value::Value;
use chrono::{DateTime, Utc};
use dates::DateExpr;
use thiserror::Error as ThisError;
use uuid::Uuid;
use webquery_schema::DeclaredType;

///
/// Value coercion
///
/// Turns a raw literal into a typed [`Value`] against a property's
/// declared type. Coercion happens at compile time, never parse time:
/// the evaluation instant is supplied by the compiler so date anchors
/// reflect the moment of query execution.
///

///
/// CoerceError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[error("cannot read '{literal}' as {target}: {reason}")]
pub struct CoerceError {
    pub literal: String,
    pub target: String,
    pub reason: String,
}

impl CoerceError {
    fn new(literal: &str, target: &DeclaredType, reason: impl Into<String>) -> Self {
        Self {
            literal: literal.to_string(),
            target: target.to_string(),
            reason: reason.into(),
        }
    }
}

/// Coerce one literal against a declared type.
pub fn coerce(
    literal: &str,
    declared: &DeclaredType,
    at: DateTime<Utc>,
) -> Result<Value, CoerceError> {
    match declared {
        DeclaredType::Int => coerce_int(literal).map(Value::Int),
        DeclaredType::Decimal => coerce_decimal(literal).map(Value::Decimal),
        DeclaredType::Bool => coerce_bool(literal).map(Value::Bool),
        DeclaredType::Text => Ok(Value::Text(literal.to_string())),
        DeclaredType::DateTime => coerce_datetime(literal, at).map(Value::DateTime),
        DeclaredType::Uuid => Uuid::parse_str(literal)
            .map(Value::Uuid)
            .map_err(|e| CoerceError::new(literal, declared, e.to_string())),
        DeclaredType::Enum { variants } => coerce_enum(literal, variants).map(Value::Enum),
    }
}

fn coerce_int(literal: &str) -> Result<i64, CoerceError> {
    // `min` / `max` sentinels let callers write open-ended bounds
    // without knowing the backing integer width.
    if literal.eq_ignore_ascii_case("min") {
        return Ok(i64::MIN);
    }
    if literal.eq_ignore_ascii_case("max") {
        return Ok(i64::MAX);
    }

    literal
        .parse()
        .map_err(|_| CoerceError::new(literal, &DeclaredType::Int, "not an integer"))
}

fn coerce_decimal(literal: &str) -> Result<f64, CoerceError> {
    if literal.eq_ignore_ascii_case("min") {
        return Ok(f64::MIN);
    }
    if literal.eq_ignore_ascii_case("max") {
        return Ok(f64::MAX);
    }

    literal
        .parse()
        .map_err(|_| CoerceError::new(literal, &DeclaredType::Decimal, "not a number"))
}

fn coerce_bool(literal: &str) -> Result<bool, CoerceError> {
    const TRUE: &[&str] = &["true", "yes", "on"];
    const FALSE: &[&str] = &["false", "no", "off"];

    if TRUE.iter().any(|t| literal.eq_ignore_ascii_case(t)) {
        Ok(true)
    } else if FALSE.iter().any(|f| literal.eq_ignore_ascii_case(f)) {
        Ok(false)
    } else {
        Err(CoerceError::new(
            literal,
            &DeclaredType::Bool,
            "expected true/yes/on or false/no/off",
        ))
    }
}

fn coerce_datetime(literal: &str, at: DateTime<Utc>) -> Result<DateTime<Utc>, CoerceError> {
    let expr = DateExpr::parse(literal)
        .map_err(|reason| CoerceError::new(literal, &DeclaredType::DateTime, reason))?;

    expr.resolve(at)
        .map_err(|reason| CoerceError::new(literal, &DeclaredType::DateTime, reason))
}

fn coerce_enum(literal: &str, variants: &[String]) -> Result<String, CoerceError> {
    variants
        .iter()
        .find(|v| v.eq_ignore_ascii_case(literal))
        .cloned()
        .ok_or_else(|| {
            CoerceError::new(
                literal,
                &DeclaredType::Enum {
                    variants: variants.to_vec(),
                },
                format!("expected one of: {}", variants.join(", ")),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 16, 15, 30, 45).unwrap()
    }

    #[test]
    fn integers_with_sentinels() {
        assert_eq!(coerce("42", &DeclaredType::Int, at()), Ok(Value::Int(42)));
        assert_eq!(
            coerce("min", &DeclaredType::Int, at()),
            Ok(Value::Int(i64::MIN))
        );
        assert_eq!(
            coerce("MAX", &DeclaredType::Int, at()),
            Ok(Value::Int(i64::MAX))
        );
        assert!(coerce("four", &DeclaredType::Int, at()).is_err());
    }

    #[test]
    fn booleans_accept_form_spellings() {
        for (text, expected) in [("true", true), ("YES", true), ("on", true), ("off", false)] {
            assert_eq!(
                coerce(text, &DeclaredType::Bool, at()),
                Ok(Value::Bool(expected))
            );
        }
        assert!(coerce("1", &DeclaredType::Bool, at()).is_err());
    }

    #[test]
    fn enums_match_case_insensitively_to_canonical_variant() {
        let declared = DeclaredType::Enum {
            variants: vec!["Queued".to_string(), "Running".to_string()],
        };

        assert_eq!(
            coerce("running", &declared, at()),
            Ok(Value::Enum("Running".to_string()))
        );

        let err = coerce("done", &declared, at()).unwrap_err();
        assert!(err.reason.contains("Queued"));
    }

    #[test]
    fn uuids_parse_or_fail() {
        assert!(matches!(
            coerce("8c5f1130-4f0b-42c5-b0c1-faf40e6b3b1d", &DeclaredType::Uuid, at()),
            Ok(Value::Uuid(_))
        ));
        assert!(coerce("not-a-uuid", &DeclaredType::Uuid, at()).is_err());
    }

    #[test]
    fn datetimes_resolve_relative_to_the_supplied_instant() {
        let Ok(Value::DateTime(resolved)) = coerce("now-PT30M", &DeclaredType::DateTime, at())
        else {
            panic!("expected datetime");
        };
        assert_eq!(at() - resolved, chrono::Duration::minutes(30));
    }

    #[test]
    fn text_passes_through() {
        assert_eq!(
            coerce("anything at all", &DeclaredType::Text, at()),
            Ok(Value::Text("anything at all".to_string()))
        );
    }
}
