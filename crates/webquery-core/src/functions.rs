use crate::ast::{CompareOp, Literal};
use thiserror::Error as ThisError;

///
/// Restriction function registry
///
/// A static, priority-ordered table of handlers for the HTTP parameter
/// convention: each entry declares which raw parameter values it claims
/// (`_null`, a `_f_<fn>_` prefix, or the bare-equality fallback) and how
/// to decode them into an operator plus operands. Dispatch demands
/// exactly one claimant — zero or several is a hard error, never a
/// guess.
///

/// Separator between the bounds of a `_f_range_` value.
const RANGE_SEPARATOR: &str = "..";

///
/// DispatchError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum DispatchError {
    #[error("no restriction function claims value '{raw}' for field '{field}'")]
    Unmatched { field: String, raw: String },

    #[error("{count} restriction functions claim value '{raw}' for field '{field}'")]
    Ambiguous {
        field: String,
        raw: String,
        count: usize,
    },

    #[error("malformed value '{raw}' for restriction function '{function}': {reason}")]
    Malformed {
        function: &'static str,
        raw: String,
        reason: String,
    },

    #[error("unknown control field '{field}', expected one of: {expected}")]
    UnknownControlField { field: String, expected: String },

    #[error("control field '{field}' takes a single value")]
    RepeatedControlField { field: String },

    #[error("control field '{field}': '{raw}' is not a valid value")]
    InvalidControlValue { field: String, raw: String },

    #[error("'{field}' is not a valid property path: {reason}")]
    InvalidFieldPath { field: String, reason: String },
}

enum Claim {
    /// Whole-value token, compared case-insensitively (`_null`).
    Exact(&'static str),
    /// `_f_<fn>_` value prefix; the remainder is the operand.
    Prefix(&'static str),
    /// Everything that is not function-encoded: plain equality.
    Bare,
}

enum Shape {
    /// No operand (`IS NULL` family).
    Unary,
    /// Single operand after the prefix.
    Valued,
    /// Two `..`-separated bounds, either of which may be empty.
    Range,
}

///
/// RestrictionFunction
///

pub struct RestrictionFunction {
    pub name: &'static str,
    pub op: CompareOp,
    claim: Claim,
    shape: Shape,
}

impl RestrictionFunction {
    /// Whether this handler claims the raw parameter value.
    #[must_use]
    pub fn claims(&self, raw: &str) -> bool {
        match &self.claim {
            Claim::Exact(token) => raw.eq_ignore_ascii_case(token),
            Claim::Prefix(prefix) => raw
                .get(..prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(prefix)),
            Claim::Bare => {
                !raw.starts_with("_f_")
                    && !raw.eq_ignore_ascii_case("_null")
                    && !raw.eq_ignore_ascii_case("_notnull")
            }
        }
    }

    /// Decode the claimed value into the operator and its operands.
    pub fn decode(&self, raw: &str) -> Result<(CompareOp, Vec<Literal>), DispatchError> {
        let operand = match &self.claim {
            Claim::Exact(_) => "",
            Claim::Prefix(prefix) => &raw[prefix.len()..],
            Claim::Bare => raw,
        };

        let values = match self.shape {
            Shape::Unary => Vec::new(),
            Shape::Valued => vec![Literal::bare(operand)],
            Shape::Range => {
                let Some((lo, hi)) = operand.split_once(RANGE_SEPARATOR) else {
                    return Err(DispatchError::Malformed {
                        function: self.name,
                        raw: raw.to_string(),
                        reason: format!(
                            "expected '[min]{RANGE_SEPARATOR}[max]' with at least one bound"
                        ),
                    });
                };
                if lo.is_empty() && hi.is_empty() {
                    return Err(DispatchError::Malformed {
                        function: self.name,
                        raw: raw.to_string(),
                        reason: "range needs at least one bound".to_string(),
                    });
                }
                vec![Literal::bare(lo), Literal::bare(hi)]
            }
        };

        Ok((self.op, values))
    }
}

/// The built-in handlers, evaluated top to bottom. Order is cosmetic —
/// claims are mutually exclusive and dispatch checks them all — but
/// more specific conventions are listed before the bare fallback.
pub static RESTRICTION_FUNCTIONS: &[RestrictionFunction] = &[
    RestrictionFunction {
        name: "is-null",
        op: CompareOp::IsNull,
        claim: Claim::Exact("_null"),
        shape: Shape::Unary,
    },
    RestrictionFunction {
        name: "not-null",
        op: CompareOp::NotNull,
        claim: Claim::Exact("_notnull"),
        shape: Shape::Unary,
    },
    RestrictionFunction {
        name: "eq",
        op: CompareOp::Eq,
        claim: Claim::Prefix("_f_eq_"),
        shape: Shape::Valued,
    },
    RestrictionFunction {
        name: "neq",
        op: CompareOp::Neq,
        claim: Claim::Prefix("_f_neq_"),
        shape: Shape::Valued,
    },
    RestrictionFunction {
        name: "contains",
        op: CompareOp::Contains,
        claim: Claim::Prefix("_f_contains_"),
        shape: Shape::Valued,
    },
    RestrictionFunction {
        name: "not-contains",
        op: CompareOp::NotContains,
        claim: Claim::Prefix("_f_ncontains_"),
        shape: Shape::Valued,
    },
    RestrictionFunction {
        name: "starts-with",
        op: CompareOp::StartsWith,
        claim: Claim::Prefix("_f_starts_"),
        shape: Shape::Valued,
    },
    RestrictionFunction {
        name: "not-starts-with",
        op: CompareOp::NotStartsWith,
        claim: Claim::Prefix("_f_nstarts_"),
        shape: Shape::Valued,
    },
    RestrictionFunction {
        name: "range",
        op: CompareOp::Range,
        claim: Claim::Prefix("_f_range_"),
        shape: Shape::Range,
    },
    RestrictionFunction {
        name: "ge",
        op: CompareOp::Ge,
        claim: Claim::Prefix("_f_ge_"),
        shape: Shape::Valued,
    },
    RestrictionFunction {
        name: "gt",
        op: CompareOp::Gt,
        claim: Claim::Prefix("_f_gt_"),
        shape: Shape::Valued,
    },
    RestrictionFunction {
        name: "le",
        op: CompareOp::Le,
        claim: Claim::Prefix("_f_le_"),
        shape: Shape::Valued,
    },
    RestrictionFunction {
        name: "lt",
        op: CompareOp::Lt,
        claim: Claim::Prefix("_f_lt_"),
        shape: Shape::Valued,
    },
    RestrictionFunction {
        name: "eq-ref",
        op: CompareOp::EqRef,
        claim: Claim::Prefix("_f_eqref_"),
        shape: Shape::Valued,
    },
    RestrictionFunction {
        name: "neq-ref",
        op: CompareOp::NeqRef,
        claim: Claim::Prefix("_f_neqref_"),
        shape: Shape::Valued,
    },
    RestrictionFunction {
        name: "gt-ref",
        op: CompareOp::GtRef,
        claim: Claim::Prefix("_f_gtref_"),
        shape: Shape::Valued,
    },
    RestrictionFunction {
        name: "ge-ref",
        op: CompareOp::GeRef,
        claim: Claim::Prefix("_f_geref_"),
        shape: Shape::Valued,
    },
    RestrictionFunction {
        name: "lt-ref",
        op: CompareOp::LtRef,
        claim: Claim::Prefix("_f_ltref_"),
        shape: Shape::Valued,
    },
    RestrictionFunction {
        name: "le-ref",
        op: CompareOp::LeRef,
        claim: Claim::Prefix("_f_leref_"),
        shape: Shape::Valued,
    },
    RestrictionFunction {
        name: "bare-eq",
        op: CompareOp::Eq,
        claim: Claim::Bare,
        shape: Shape::Valued,
    },
];

/// Dispatch one raw parameter value through the registry.
///
/// Exactly one handler must claim the value; anything else fails with
/// [`DispatchError::Unmatched`] or [`DispatchError::Ambiguous`].
pub fn dispatch(field: &str, raw: &str) -> Result<(CompareOp, Vec<Literal>), DispatchError> {
    let claimants: Vec<&RestrictionFunction> = RESTRICTION_FUNCTIONS
        .iter()
        .filter(|f| f.claims(raw))
        .collect();

    match claimants.as_slice() {
        [] => Err(DispatchError::Unmatched {
            field: field.to_string(),
            raw: raw.to_string(),
        }),
        [function] => function.decode(raw),
        _ => Err(DispatchError::Ambiguous {
            field: field.to_string(),
            raw: raw.to_string(),
            count: claimants.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_values_are_equality() {
        let (op, values) = dispatch("name", "alice").unwrap();
        assert_eq!(op, CompareOp::Eq);
        assert_eq!(values, vec![Literal::bare("alice")]);
    }

    #[test]
    fn null_tokens() {
        assert_eq!(dispatch("f", "_null").unwrap().0, CompareOp::IsNull);
        assert_eq!(dispatch("f", "_NOTNULL").unwrap().0, CompareOp::NotNull);
    }

    #[test]
    fn function_prefixes_decode_operands() {
        let (op, values) = dispatch("f", "_f_contains_abc").unwrap();
        assert_eq!(op, CompareOp::Contains);
        assert_eq!(values, vec![Literal::bare("abc")]);

        let (op, _) = dispatch("f", "_f_nstarts_abc").unwrap();
        assert_eq!(op, CompareOp::NotStartsWith);

        let (op, values) = dispatch("f", "_f_eqref_other.id").unwrap();
        assert_eq!(op, CompareOp::EqRef);
        assert_eq!(values[0].text, "other.id");
    }

    #[test]
    fn ranges_split_on_dotdot_with_open_sides() {
        let (_, values) = dispatch("f", "_f_range_1..2").unwrap();
        assert_eq!(values, vec![Literal::bare("1"), Literal::bare("2")]);

        let (_, values) = dispatch("f", "_f_range_1..").unwrap();
        assert_eq!(values, vec![Literal::bare("1"), Literal::bare("")]);

        let (_, values) = dispatch("f", "_f_range_..9").unwrap();
        assert_eq!(values, vec![Literal::bare(""), Literal::bare("9")]);
    }

    #[test]
    fn range_without_bounds_is_malformed() {
        assert!(matches!(
            dispatch("f", "_f_range_..").unwrap_err(),
            DispatchError::Malformed { .. }
        ));
        assert!(matches!(
            dispatch("f", "_f_range_5").unwrap_err(),
            DispatchError::Malformed { .. }
        ));
    }

    #[test]
    fn unknown_function_prefix_is_unmatched() {
        assert!(matches!(
            dispatch("f", "_f_squint_5").unwrap_err(),
            DispatchError::Unmatched { .. }
        ));
    }

    #[test]
    fn every_value_has_at_most_one_claimant() {
        // Prefixes are chosen so no handler's claim overlaps another's;
        // this guards against a new entry breaking that.
        let samples = [
            "plain",
            "_null",
            "_notnull",
            "_f_eq_x",
            "_f_neq_x",
            "_f_eqref_x",
            "_f_neqref_x",
            "_f_contains_x",
            "_f_ncontains_x",
            "_f_starts_x",
            "_f_nstarts_x",
            "_f_range_1..2",
            "_f_ge_1",
            "_f_gt_1",
            "_f_le_1",
            "_f_lt_1",
            "_f_geref_x",
            "_f_gtref_x",
            "_f_leref_x",
            "_f_ltref_x",
        ];

        for sample in samples {
            let claimants = RESTRICTION_FUNCTIONS
                .iter()
                .filter(|f| f.claims(sample))
                .count();
            assert_eq!(claimants, 1, "{sample}");
        }
    }
}
