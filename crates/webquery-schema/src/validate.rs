use crate::{MAX_IDENT_LEN, descriptor::EntityDescriptor};
use std::collections::BTreeMap;
use thiserror::Error as ThisError;

///
/// SchemaError
///
/// Build-time rejection of a structurally invalid registry. All
/// violations are collected before failing so a misdeclared schema is
/// reported once, completely.
///

#[derive(Debug, ThisError)]
#[error("invalid schema registry: {}", format_violations(.violations))]
pub struct SchemaError {
    pub violations: Vec<SchemaViolation>,
}

fn format_violations(violations: &[SchemaViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

///
/// SchemaViolation
///

#[derive(Debug, ThisError)]
pub enum SchemaViolation {
    #[error("entity '{entity}': invalid identifier '{ident}'")]
    InvalidIdentifier { entity: String, ident: String },

    #[error("entity '{entity}': property and relation both named '{name}'")]
    NameCollision { entity: String, name: String },

    #[error("entity '{entity}': relation '{relation}' targets unknown entity '{target}'")]
    DanglingRelation {
        entity: String,
        relation: String,
        target: String,
    },

    #[error("entity '{entity}': alias '{alias}' shadows a declared property or relation")]
    AliasShadowsMember { entity: String, alias: String },

    #[error("entity '{entity}': alias '{alias}' resolves to nothing ('{replacement}')")]
    DanglingAlias {
        entity: String,
        alias: String,
        replacement: String,
    },

    #[error("entity '{entity}': subtype link to unknown entity '{subtype}'")]
    DanglingSubtype { entity: String, subtype: String },

    #[error(
        "entity '{entity}': duplicate discriminator '{value}' shared with entity '{other}'"
    )]
    DuplicateDiscriminator {
        entity: String,
        value: String,
        other: String,
    },
}

/// Validate the full entity graph. Read-side code may assume every
/// relation target, alias head, and subtype link resolves.
pub(crate) fn validate(
    entities: &BTreeMap<String, EntityDescriptor>,
) -> Result<(), SchemaError> {
    let mut violations = Vec::new();

    for entity in entities.values() {
        validate_identifiers(entity, &mut violations);
        validate_members(entity, entities, &mut violations);
        validate_aliases(entity, &mut violations);
        validate_subtypes(entity, entities, &mut violations);
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(SchemaError { violations })
    }
}

fn is_identifier(ident: &str) -> bool {
    !ident.is_empty()
        && ident.len() <= MAX_IDENT_LEN
        && ident
            .chars()
            .enumerate()
            .all(|(i, c)| c == '_' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit()))
}

fn validate_identifiers(entity: &EntityDescriptor, violations: &mut Vec<SchemaViolation>) {
    let mut check = |ident: &str| {
        if !is_identifier(ident) {
            violations.push(SchemaViolation::InvalidIdentifier {
                entity: entity.name.clone(),
                ident: ident.to_string(),
            });
        }
    };

    check(&entity.name);
    for name in entity.properties.keys() {
        check(name);
    }
    for name in entity.relations.keys() {
        check(name);
    }
    for name in entity.aliases.keys() {
        check(name);
    }
}

fn validate_members(
    entity: &EntityDescriptor,
    entities: &BTreeMap<String, EntityDescriptor>,
    violations: &mut Vec<SchemaViolation>,
) {
    for name in entity.properties.keys() {
        if entity.relations.contains_key(name) {
            violations.push(SchemaViolation::NameCollision {
                entity: entity.name.clone(),
                name: name.clone(),
            });
        }
    }

    for relation in entity.relations.values() {
        if !entities.contains_key(&relation.target) {
            violations.push(SchemaViolation::DanglingRelation {
                entity: entity.name.clone(),
                relation: relation.name.clone(),
                target: relation.target.clone(),
            });
        }
    }
}

fn validate_aliases(entity: &EntityDescriptor, violations: &mut Vec<SchemaViolation>) {
    for (alias, replacement) in &entity.aliases {
        if entity.properties.contains_key(alias) || entity.relations.contains_key(alias) {
            violations.push(SchemaViolation::AliasShadowsMember {
                entity: entity.name.clone(),
                alias: alias.clone(),
            });
        }

        // Only the head segment can be checked locally; the tail is
        // resolved against related entities at query time.
        let head = replacement.split('.').next().unwrap_or_default();
        if !entity.properties.contains_key(head) && !entity.relations.contains_key(head) {
            violations.push(SchemaViolation::DanglingAlias {
                entity: entity.name.clone(),
                alias: alias.clone(),
                replacement: replacement.clone(),
            });
        }
    }
}

fn validate_subtypes(
    entity: &EntityDescriptor,
    entities: &BTreeMap<String, EntityDescriptor>,
    violations: &mut Vec<SchemaViolation>,
) {
    let mut seen: BTreeMap<&str, &str> = BTreeMap::new();

    if !entity.is_abstract {
        seen.insert(entity.discriminator_value(), &entity.name);
    }

    for subtype in &entity.subtypes {
        let Some(target) = entities.get(subtype) else {
            violations.push(SchemaViolation::DanglingSubtype {
                entity: entity.name.clone(),
                subtype: subtype.clone(),
            });
            continue;
        };

        if let Some(other) = seen.insert(target.discriminator_value(), &target.name) {
            violations.push(SchemaViolation::DuplicateDiscriminator {
                entity: entity.name.clone(),
                value: target.discriminator_value().to_string(),
                other: other.to_string(),
            });
        }
    }
}
