use crate::{
    descriptor::EntityDescriptor,
    validate::{self, SchemaError},
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc};

///
/// SchemaRegistry
///
/// Immutable entity-name → descriptor map. Built exactly once (per
/// snapshot) through [`SchemaRegistryBuilder`], which validates the
/// whole graph before anything is published.
///
/// Concurrency model: share a registry as a [`SharedRegistry`]
/// (`Arc<SchemaRegistry>`). If the schema can change at runtime, build a
/// new registry and swap the `Arc` — never mutate in place. In-flight
/// compilations keep the snapshot they observed.
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SchemaRegistry {
    entities: BTreeMap<String, EntityDescriptor>,
}

/// A published, read-only registry snapshot.
pub type SharedRegistry = Arc<SchemaRegistry>;

impl SchemaRegistry {
    #[must_use]
    pub fn builder() -> SchemaRegistryBuilder {
        SchemaRegistryBuilder::default()
    }

    #[must_use]
    pub fn entity(&self, name: &str) -> Option<&EntityDescriptor> {
        self.entities.get(name)
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityDescriptor> {
        self.entities.values()
    }

    /// Resolve discriminator values against the subtype family of `root`.
    ///
    /// Candidates are the root's registered subtypes, plus the root
    /// itself when it is concrete. Returns the matched entities in the
    /// caller's order; any unmatched value fails the whole resolution.
    pub fn resolve_discriminators<'a>(
        &'a self,
        root: &'a EntityDescriptor,
        values: &[String],
    ) -> Result<Vec<&'a EntityDescriptor>, String> {
        let mut candidates: BTreeMap<&str, &EntityDescriptor> = BTreeMap::new();

        for subtype in &root.subtypes {
            if let Some(entity) = self.entity(subtype) {
                candidates.insert(entity.discriminator_value(), entity);
            }
        }

        if !root.is_abstract {
            candidates.insert(root.discriminator_value(), root);
        }

        let mut matched = Vec::with_capacity(values.len());
        for value in values {
            match candidates.get(value.as_str()) {
                Some(entity) => matched.push(*entity),
                None => return Err(value.clone()),
            }
        }

        Ok(matched)
    }
}

///
/// SchemaRegistryBuilder
///

#[derive(Debug, Default)]
pub struct SchemaRegistryBuilder {
    entities: BTreeMap<String, EntityDescriptor>,
}

impl SchemaRegistryBuilder {
    #[must_use]
    pub fn register(mut self, entity: EntityDescriptor) -> Self {
        self.entities.insert(entity.name.clone(), entity);
        self
    }

    /// Validate the whole entity graph and publish an immutable registry.
    pub fn build(self) -> Result<SchemaRegistry, SchemaError> {
        validate::validate(&self.entities)?;

        Ok(SchemaRegistry {
            entities: self.entities,
        })
    }

    /// Build and wrap in an `Arc` for sharing across compilations.
    pub fn build_shared(self) -> Result<SharedRegistry, SchemaError> {
        self.build().map(Arc::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        descriptor::{PropertyDescriptor, RelationDescriptor},
        types::DeclaredType,
    };

    fn base() -> SchemaRegistryBuilder {
        SchemaRegistry::builder()
            .register(
                EntityDescriptor::new("Job")
                    .abstract_base()
                    .property(PropertyDescriptor::new("id", DeclaredType::Int))
                    .relation(RelationDescriptor::new("children", "Task").collection())
                    .subtype("BatchJob")
                    .subtype("StreamJob"),
            )
            .register(
                EntityDescriptor::new("BatchJob")
                    .discriminator("batch")
                    .property(PropertyDescriptor::new("id", DeclaredType::Int)),
            )
            .register(
                EntityDescriptor::new("StreamJob")
                    .discriminator("stream")
                    .property(PropertyDescriptor::new("id", DeclaredType::Int)),
            )
            .register(
                EntityDescriptor::new("Task")
                    .property(PropertyDescriptor::new("id", DeclaredType::Int)),
            )
    }

    #[test]
    fn build_validates_and_publishes() {
        let registry = base().build().unwrap();
        assert!(registry.entity("Job").is_some());
        assert!(registry.entity("Missing").is_none());
    }

    #[test]
    fn discriminators_resolve_against_subtype_family() {
        let registry = base().build().unwrap();
        let root = registry.entity("Job").unwrap();

        let matched = registry
            .resolve_discriminators(root, &["batch".to_string()])
            .unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].name, "BatchJob");

        // The abstract root is not itself a candidate.
        let err = registry
            .resolve_discriminators(root, &["Job".to_string()])
            .unwrap_err();
        assert_eq!(err, "Job");
    }

    #[test]
    fn concrete_root_is_a_discriminator_candidate() {
        let registry = SchemaRegistry::builder()
            .register(
                EntityDescriptor::new("Asset")
                    .property(PropertyDescriptor::new("id", DeclaredType::Int)),
            )
            .build()
            .unwrap();

        let root = registry.entity("Asset").unwrap();
        let matched = registry
            .resolve_discriminators(root, &["Asset".to_string()])
            .unwrap();
        assert_eq!(matched[0].name, "Asset");
    }
}
