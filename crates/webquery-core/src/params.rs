use crate::{
    ast::{Comparison, CompareOp, ConstraintNode, Direction, Group, GroupOp, Literal, OrderSpec,
        ParsedQuery, PropertyPath},
    error::QueryError,
    functions::{self, DispatchError},
    parse,
};

///
/// Parameter-convention decoder
///
/// Decodes a set of named form/query parameters into a [`ParsedQuery`]:
/// control fields (`q`, `_order`, `_offset`, `_limit`, `_subclass`)
/// steer the query as a whole, every other name is a field constraint
/// whose values dispatch through the restriction function registry.
/// Multiple values for one field OR together; all-equality value sets
/// collapse into a single IN.
///

/// Control field carrying a textual-grammar query.
pub const FIELD_TEXT_QUERY: &str = "q";
/// Control field carrying `field [asc|desc]` order entries.
pub const FIELD_ORDER: &str = "_order";
/// Control field carrying the result offset.
pub const FIELD_OFFSET: &str = "_offset";
/// Control field carrying the result limit.
pub const FIELD_LIMIT: &str = "_limit";
/// Control field carrying the subclass discriminator filter.
pub const FIELD_SUBCLASS: &str = "_subclass";

const CONTROL_FIELDS: &[&str] = &[
    FIELD_TEXT_QUERY,
    FIELD_ORDER,
    FIELD_OFFSET,
    FIELD_LIMIT,
    FIELD_SUBCLASS,
];

/// Decode `(name, values)` pairs into a [`ParsedQuery`].
///
/// Pair order is preserved for field constraints. The text query is
/// applied first so an explicit `_order` can override an `ORDER BY`
/// inside it.
pub fn decode_params(pairs: &[(String, Vec<String>)]) -> Result<ParsedQuery, QueryError> {
    let mut query = ParsedQuery::new();

    if let Some(text) = single_control_value(pairs, FIELD_TEXT_QUERY)? {
        query = parse::parse(text)?;
    }

    for (field, values) in pairs {
        if field == FIELD_TEXT_QUERY {
            continue;
        }

        if field.starts_with('_') {
            decode_control_field(&mut query, field, values)?;
        } else {
            let node = decode_field_constraint(field, values)?;
            query.constraints.push(node);
        }
    }

    Ok(query)
}

fn single_control_value<'a>(
    pairs: &'a [(String, Vec<String>)],
    field: &str,
) -> Result<Option<&'a str>, DispatchError> {
    let mut found = None;

    for (name, values) in pairs {
        if name == field {
            if found.is_some() || values.len() > 1 {
                return Err(DispatchError::RepeatedControlField {
                    field: field.to_string(),
                });
            }
            found = values.first().map(String::as_str);
        }
    }

    Ok(found)
}

fn decode_control_field(
    query: &mut ParsedQuery,
    field: &str,
    values: &[String],
) -> Result<(), DispatchError> {
    match field {
        FIELD_ORDER => {
            // An explicit order list replaces whatever the text query set.
            query.order = values
                .iter()
                .map(|value| parse_order_entry(value))
                .collect::<Result<_, _>>()?;
            Ok(())
        }
        FIELD_OFFSET => {
            query.offset = Some(parse_u32(field, values)?);
            Ok(())
        }
        FIELD_LIMIT => {
            query.limit = Some(parse_u32(field, values)?);
            Ok(())
        }
        FIELD_SUBCLASS => {
            query.subclass = Some(values.join(","));
            Ok(())
        }
        _ => Err(DispatchError::UnknownControlField {
            field: field.to_string(),
            expected: CONTROL_FIELDS.join(", "),
        }),
    }
}

/// `field`, `field asc` or `field desc` (case-insensitive).
fn parse_order_entry(value: &str) -> Result<OrderSpec, DispatchError> {
    let (path_text, direction) = match value.rsplit_once(char::is_whitespace) {
        Some((head, tail)) if tail.eq_ignore_ascii_case("asc") => (head.trim(), Direction::Asc),
        Some((head, tail)) if tail.eq_ignore_ascii_case("desc") => (head.trim(), Direction::Desc),
        _ => (value.trim(), Direction::Asc),
    };

    let path = PropertyPath::parse(path_text).map_err(|reason| {
        DispatchError::InvalidFieldPath {
            field: value.to_string(),
            reason,
        }
    })?;

    Ok(OrderSpec { path, direction })
}

fn parse_u32(field: &str, values: &[String]) -> Result<u32, DispatchError> {
    let [value] = values else {
        return Err(DispatchError::RepeatedControlField {
            field: field.to_string(),
        });
    };

    value
        .parse()
        .map_err(|_| DispatchError::InvalidControlValue {
            field: field.to_string(),
            raw: value.clone(),
        })
}

fn decode_field_constraint(
    field: &str,
    values: &[String],
) -> Result<ConstraintNode, DispatchError> {
    let path = PropertyPath::parse(field).map_err(|reason| DispatchError::InvalidFieldPath {
        field: field.to_string(),
        reason,
    })?;

    let mut decoded = Vec::with_capacity(values.len());
    for raw in values {
        decoded.push(functions::dispatch(field, raw)?);
    }

    // All plain equalities collapse into one implicit IN; anything else
    // ORs the individual constraints together.
    let all_plain_eq = decoded.len() > 1
        && decoded
            .iter()
            .all(|(op, values)| *op == CompareOp::Eq && values.len() == 1);

    if all_plain_eq {
        let values = decoded
            .into_iter()
            .flat_map(|(_, values)| values)
            .collect::<Vec<Literal>>();
        return Ok(Comparison::new(path, CompareOp::Eq, values).into());
    }

    let mut nodes: Vec<ConstraintNode> = decoded
        .into_iter()
        .map(|(op, values)| Comparison::new(path.clone(), op, values).into())
        .collect();

    Ok(if nodes.len() == 1 {
        nodes.remove(0)
    } else {
        Group::new(GroupOp::Or, nodes).into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(entries: &[(&str, &[&str])]) -> Vec<(String, Vec<String>)> {
        entries
            .iter()
            .map(|(name, values)| {
                (
                    (*name).to_string(),
                    values.iter().map(ToString::to_string).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn bare_parameters_are_equality_constraints() {
        let query = decode_params(&pairs(&[("name", &["alice"])])).unwrap();
        assert_eq!(query.render(), "name = alice");
    }

    #[test]
    fn multiple_equality_values_collapse_to_in() {
        let query = decode_params(&pairs(&[("id", &["1", "2", "3"])])).unwrap();
        assert_eq!(query.render(), "id IN(1, 2, 3)");
    }

    #[test]
    fn mixed_functions_or_together() {
        let query =
            decode_params(&pairs(&[("id", &["1", "_f_contains_some_value"])])).unwrap();
        assert_eq!(query.render(), "(id = 1 OR id ~= some_value)");
    }

    #[test]
    fn null_and_function_values_decode() {
        let query = decode_params(&pairs(&[
            ("archived", &["_null"]),
            ("created", &["_f_ge_today"]),
            ("priority", &["_f_range_1..5"]),
        ]))
        .unwrap();

        assert_eq!(
            query.render(),
            "archived IS NULL\nAND created >= today\nAND priority BETWEEN 1 AND 5"
        );
    }

    #[test]
    fn open_range_values_decode_to_single_bounds() {
        let query = decode_params(&pairs(&[("priority", &["_f_range_2.."])])).unwrap();
        assert_eq!(query.render(), "priority >= 2");

        let query = decode_params(&pairs(&[("priority", &["_f_range_..9"])])).unwrap();
        assert_eq!(query.render(), "priority <= 9");
    }

    #[test]
    fn text_query_combines_with_field_parameters() {
        let query = decode_params(&pairs(&[
            ("q", &["id < 100 order by id"]),
            ("name", &["alice"]),
        ]))
        .unwrap();

        assert_eq!(query.render(), "id < 100\nAND name = alice\nORDER BY id");
    }

    #[test]
    fn explicit_order_overrides_text_query_order() {
        let query = decode_params(&pairs(&[
            ("q", &["id < 100 order by id"]),
            ("_order", &["name desc", "id asc"]),
        ]))
        .unwrap();

        assert_eq!(query.order.len(), 2);
        assert_eq!(query.order[0].path.to_string(), "name");
        assert_eq!(query.order[0].direction, Direction::Desc);
        assert_eq!(query.order[1].direction, Direction::Asc);
    }

    #[test]
    fn pagination_and_subclass_controls() {
        let query = decode_params(&pairs(&[
            ("_offset", &["40"]),
            ("_limit", &["20"]),
            ("_subclass", &["batch", "stream"]),
        ]))
        .unwrap();

        assert_eq!(query.offset, Some(40));
        assert_eq!(query.limit, Some(20));
        assert_eq!(query.subclass.as_deref(), Some("batch,stream"));
    }

    #[test]
    fn unknown_control_fields_list_the_valid_ones() {
        let err = decode_params(&pairs(&[("_fancy", &["x"])])).unwrap_err();
        let QueryError::Dispatch(DispatchError::UnknownControlField { expected, .. }) = err
        else {
            panic!("expected control-field error");
        };
        assert!(expected.contains("_order"));
    }

    #[test]
    fn repeated_text_query_is_rejected() {
        let err = decode_params(&pairs(&[("q", &["id=1", "id=2"])])).unwrap_err();
        assert!(matches!(
            err,
            QueryError::Dispatch(DispatchError::RepeatedControlField { .. })
        ));
    }

    #[test]
    fn bad_pagination_value_is_rejected() {
        let err = decode_params(&pairs(&[("_limit", &["lots"])])).unwrap_err();
        assert!(matches!(
            err,
            QueryError::Dispatch(DispatchError::InvalidControlValue { .. })
        ));
    }

    #[test]
    fn unknown_function_prefix_is_rejected() {
        let err = decode_params(&pairs(&[("id", &["_f_squint_5"])])).unwrap_err();
        assert!(matches!(
            err,
            QueryError::Dispatch(DispatchError::Unmatched { .. })
        ));
    }

    #[test]
    fn dotted_field_names_are_paths() {
        let query = decode_params(&pairs(&[("owner.name", &["alice"])])).unwrap();
        assert_eq!(query.render(), "owner.name = alice");
    }
}
