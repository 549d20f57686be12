use crate::ast::{PathSegment, PropertyPath};
use std::collections::VecDeque;
use thiserror::Error as ThisError;
use webquery_schema::{DeclaredType, EntityDescriptor, SchemaRegistry};

///
/// Path resolution
///
/// Walks a dotted property path from a root entity through its
/// relations, expanding search-field aliases, honoring explicit
/// `[alias]` join aliases, and recognizing the `:size` pseudo-property
/// on collection relations. Resolution fails closed: a non-queryable
/// property is rejected with its own error class and never reaches the
/// compiler.
///

///
/// ResolveError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum ResolveError {
    #[error("unknown property '{property}' on entity '{entity}'")]
    UnknownProperty { entity: String, property: String },

    #[error("property '{property}' on entity '{entity}' may not be queried")]
    PrivatePropertyUseRejected { entity: String, property: String },

    #[error("cannot traverse through non-relation property '{property}' on entity '{entity}'")]
    InvalidRelationTraversal { entity: String, property: String },

    #[error("unknown subclass '{subclass}' of entity '{entity}'")]
    UnknownSubclass { entity: String, subclass: String },

    #[error("unknown entity '{entity}'")]
    UnknownEntity { entity: String },
}

///
/// PropertyKind
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PropertyKind {
    Scalar,
    Relation { target: String },
    /// The element count of a collection relation; declared type is
    /// always integer.
    CollectionSize,
}

///
/// JoinStep
///
/// One relation hop on the way to the terminal property. Two paths
/// produce the same join only if relation names and explicit aliases
/// both match, which is what lets `owner[a].x` and `owner[b].x` address
/// two distinct joins of the same relation.
///

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct JoinStep {
    pub relation: String,
    pub alias: Option<String>,
    pub target: String,
}

///
/// PropertyRef
///
/// A validated, schema-resolved reference. Every `PropertyRef` the
/// resolver hands out is queryable by construction.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PropertyRef {
    /// Entity owning the terminal property.
    pub entity: String,
    /// Terminal property name (relation name for `:size` references).
    pub name: String,
    pub declared: DeclaredType,
    pub nullable: bool,
    pub kind: PropertyKind,
    /// Relation hops from the root, in traversal order.
    pub joins: Vec<JoinStep>,
}

///
/// PathResolver
///

pub struct PathResolver<'a> {
    registry: &'a SchemaRegistry,
    root: &'a EntityDescriptor,
}

impl<'a> PathResolver<'a> {
    pub fn new(registry: &'a SchemaRegistry, root: &str) -> Result<Self, ResolveError> {
        let root = registry
            .entity(root)
            .ok_or_else(|| ResolveError::UnknownEntity {
                entity: root.to_string(),
            })?;

        Ok(Self { registry, root })
    }

    #[must_use]
    pub const fn root(&self) -> &'a EntityDescriptor {
        self.root
    }

    pub fn resolve(&self, path: &PropertyPath) -> Result<PropertyRef, ResolveError> {
        let mut entity = self.root;
        let mut joins = Vec::new();
        let mut pending: VecDeque<PathSegment> = path.segments.iter().cloned().collect();

        while let Some(segment) = pending.pop_front() {
            let terminal = pending.is_empty();

            if terminal {
                if let Some(relation_name) = segment.name.strip_suffix(":size") {
                    return Self::resolve_size(entity, relation_name, joins);
                }
            }

            // Search-field aliases rewrite the query surface onto real
            // paths so storage renames don't break callers.
            if let Some(replacement) = entity.aliases.get(&segment.name) {
                let expanded = PropertyPath::parse(replacement).map_err(|_| {
                    ResolveError::UnknownProperty {
                        entity: entity.name.clone(),
                        property: segment.name.clone(),
                    }
                })?;
                for expanded_segment in expanded.segments.into_iter().rev() {
                    pending.push_front(expanded_segment);
                }
                continue;
            }

            if let Some(property) = entity.properties.get(&segment.name) {
                if !terminal {
                    return Err(ResolveError::InvalidRelationTraversal {
                        entity: entity.name.clone(),
                        property: segment.name.clone(),
                    });
                }
                if !property.queryable {
                    return Err(ResolveError::PrivatePropertyUseRejected {
                        entity: entity.name.clone(),
                        property: segment.name.clone(),
                    });
                }

                return Ok(PropertyRef {
                    entity: entity.name.clone(),
                    name: property.name.clone(),
                    declared: property.declared.clone(),
                    nullable: property.nullable,
                    kind: PropertyKind::Scalar,
                    joins,
                });
            }

            if let Some(relation) = entity.relations.get(&segment.name) {
                let target = self.registry.entity(&relation.target).ok_or_else(|| {
                    ResolveError::UnknownEntity {
                        entity: relation.target.clone(),
                    }
                })?;

                joins.push(JoinStep {
                    relation: relation.name.clone(),
                    alias: segment.alias.clone(),
                    target: relation.target.clone(),
                });

                if terminal {
                    // A path ending at a relation constrains the related
                    // entity's identifier.
                    let declared = target
                        .properties
                        .get("id")
                        .map_or(DeclaredType::Text, |id| id.declared.clone());

                    return Ok(PropertyRef {
                        entity: entity.name.clone(),
                        name: "id".to_string(),
                        declared,
                        nullable: relation.nullable,
                        kind: PropertyKind::Relation {
                            target: relation.target.clone(),
                        },
                        joins,
                    });
                }

                entity = target;
                continue;
            }

            return Err(ResolveError::UnknownProperty {
                entity: entity.name.clone(),
                property: segment.name.clone(),
            });
        }

        // PropertyPath::parse guarantees at least one segment.
        Err(ResolveError::UnknownProperty {
            entity: entity.name.clone(),
            property: String::new(),
        })
    }

    fn resolve_size(
        entity: &EntityDescriptor,
        relation_name: &str,
        joins: Vec<JoinStep>,
    ) -> Result<PropertyRef, ResolveError> {
        let Some(relation) = entity.relations.get(relation_name) else {
            return Err(ResolveError::UnknownProperty {
                entity: entity.name.clone(),
                property: format!("{relation_name}:size"),
            });
        };

        if !relation.collection {
            // Only collections have a size; a single-valued relation
            // exposes no such pseudo-property.
            return Err(ResolveError::UnknownProperty {
                entity: entity.name.clone(),
                property: format!("{relation_name}:size"),
            });
        }

        Ok(PropertyRef {
            entity: entity.name.clone(),
            name: relation.name.clone(),
            declared: DeclaredType::Int,
            nullable: false,
            kind: PropertyKind::CollectionSize,
            joins,
        })
    }

    /// Resolve a comma-separated subclass filter to entity names.
    pub fn resolve_subclass(&self, values: &str) -> Result<Vec<String>, ResolveError> {
        let requested: Vec<String> = values
            .split(',')
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();

        self.registry
            .resolve_discriminators(self.root, &requested)
            .map(|matched| matched.into_iter().map(|e| e.name.clone()).collect())
            .map_err(|unmatched| ResolveError::UnknownSubclass {
                entity: self.root.name.clone(),
                subclass: unmatched,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webquery_schema::{PropertyDescriptor, RelationDescriptor};

    fn registry() -> SchemaRegistry {
        SchemaRegistry::builder()
            .register(
                EntityDescriptor::new("Job")
                    .property(PropertyDescriptor::new("id", DeclaredType::Int))
                    .property(PropertyDescriptor::new("name", DeclaredType::Text))
                    .property(
                        PropertyDescriptor::new("internalState", DeclaredType::Text).private(),
                    )
                    .relation(RelationDescriptor::new("owner", "User"))
                    .relation(RelationDescriptor::new("children", "Task").collection())
                    .alias("ownerName", "owner.name"),
            )
            .register(
                EntityDescriptor::new("User")
                    .property(PropertyDescriptor::new("id", DeclaredType::Uuid))
                    .property(PropertyDescriptor::new("name", DeclaredType::Text)),
            )
            .register(
                EntityDescriptor::new("Task")
                    .property(PropertyDescriptor::new("id", DeclaredType::Int)),
            )
            .build()
            .unwrap()
    }

    fn resolve(path: &str) -> Result<PropertyRef, ResolveError> {
        let registry = registry();
        let resolver = PathResolver::new(&registry, "Job").unwrap();
        resolver.resolve(&PropertyPath::parse(path).unwrap())
    }

    #[test]
    fn scalar_on_root() {
        let r = resolve("name").unwrap();
        assert_eq!(r.entity, "Job");
        assert_eq!(r.kind, PropertyKind::Scalar);
        assert!(r.joins.is_empty());
    }

    #[test]
    fn scalar_through_relation_records_the_join() {
        let r = resolve("owner.name").unwrap();
        assert_eq!(r.entity, "User");
        assert_eq!(r.declared, DeclaredType::Text);
        assert_eq!(r.joins.len(), 1);
        assert_eq!(r.joins[0].relation, "owner");
        assert_eq!(r.joins[0].target, "User");
    }

    #[test]
    fn explicit_join_aliases_are_kept() {
        let r = resolve("owner[o].name").unwrap();
        assert_eq!(r.joins[0].alias.as_deref(), Some("o"));
    }

    #[test]
    fn search_alias_expands_to_real_path() {
        let direct = resolve("owner.name").unwrap();
        let aliased = resolve("ownerName").unwrap();
        assert_eq!(direct, aliased);
    }

    #[test]
    fn unknown_property_through_relation_fails_precisely() {
        let err = resolve("owner.nope").unwrap_err();
        assert_eq!(
            err,
            ResolveError::UnknownProperty {
                entity: "User".to_string(),
                property: "nope".to_string(),
            }
        );
    }

    #[test]
    fn private_property_has_its_own_failure_mode() {
        let err = resolve("internalState").unwrap_err();
        assert!(matches!(
            err,
            ResolveError::PrivatePropertyUseRejected { .. }
        ));
    }

    #[test]
    fn traversal_through_scalar_is_rejected() {
        let err = resolve("name.length").unwrap_err();
        assert!(matches!(err, ResolveError::InvalidRelationTraversal { .. }));
    }

    #[test]
    fn collection_size_pseudo_property() {
        let r = resolve("children:size").unwrap();
        assert_eq!(r.kind, PropertyKind::CollectionSize);
        assert_eq!(r.declared, DeclaredType::Int);
        assert_eq!(r.name, "children");
    }

    #[test]
    fn size_of_single_valued_relation_does_not_exist() {
        let err = resolve("owner:size").unwrap_err();
        assert!(matches!(err, ResolveError::UnknownProperty { .. }));
    }

    #[test]
    fn terminal_relation_resolves_to_target_identifier() {
        let r = resolve("owner").unwrap();
        assert_eq!(r.kind, PropertyKind::Relation {
            target: "User".to_string()
        });
        assert_eq!(r.name, "id");
        assert_eq!(r.declared, DeclaredType::Uuid);
        assert_eq!(r.joins.len(), 1);
    }

    #[test]
    fn subclass_resolution_fails_closed() {
        let registry = registry();
        let resolver = PathResolver::new(&registry, "Job").unwrap();
        let err = resolver.resolve_subclass("ghost").unwrap_err();
        assert!(matches!(err, ResolveError::UnknownSubclass { .. }));
    }
}
