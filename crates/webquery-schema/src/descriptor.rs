use crate::types::DeclaredType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

///
/// PropertyDescriptor
///
/// One scalar, queryable-or-not property of an entity.
///
/// `queryable = false` marks a property that exists on the entity but
/// must never be referenced by caller-supplied queries; resolution of
/// such a property fails closed.
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    pub name: String,
    pub declared: DeclaredType,

    #[serde(default)]
    pub nullable: bool,

    #[serde(default = "default_queryable")]
    pub queryable: bool,
}

const fn default_queryable() -> bool {
    true
}

impl PropertyDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>, declared: DeclaredType) -> Self {
        Self {
            name: name.into(),
            declared,
            nullable: false,
            queryable: true,
        }
    }

    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Mark the property non-queryable (private to the persistence layer).
    #[must_use]
    pub const fn private(mut self) -> Self {
        self.queryable = false;
        self
    }
}

///
/// RelationDescriptor
///
/// A navigable relation to another registered entity. Collection-valued
/// relations additionally expose a `<name>:size` pseudo-property.
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RelationDescriptor {
    pub name: String,
    pub target: String,

    #[serde(default)]
    pub collection: bool,

    #[serde(default)]
    pub nullable: bool,
}

impl RelationDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            collection: false,
            nullable: false,
        }
    }

    #[must_use]
    pub const fn collection(mut self) -> Self {
        self.collection = true;
        self
    }

    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

///
/// EntityDescriptor
///
/// The full queryable surface of one entity: properties, relations,
/// search-field aliases (query-API names rewritten to real paths so the
/// storage schema can change without breaking callers), and subclass
/// links for discriminator filtering.
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub name: String,

    #[serde(default)]
    pub is_abstract: bool,

    /// Discriminator value identifying this entity among its siblings.
    /// Defaults to the entity name when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discriminator: Option<String>,

    #[serde(default)]
    pub properties: BTreeMap<String, PropertyDescriptor>,

    #[serde(default)]
    pub relations: BTreeMap<String, RelationDescriptor>,

    /// alias name → replacement dotted path.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,

    /// Entity names of direct and transitive subtypes.
    #[serde(default)]
    pub subtypes: Vec<String>,
}

impl EntityDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_abstract: false,
            discriminator: None,
            properties: BTreeMap::new(),
            relations: BTreeMap::new(),
            aliases: BTreeMap::new(),
            subtypes: Vec::new(),
        }
    }

    #[must_use]
    pub const fn abstract_base(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    #[must_use]
    pub fn discriminator(mut self, value: impl Into<String>) -> Self {
        self.discriminator = Some(value.into());
        self
    }

    #[must_use]
    pub fn property(mut self, property: PropertyDescriptor) -> Self {
        self.properties.insert(property.name.clone(), property);
        self
    }

    #[must_use]
    pub fn relation(mut self, relation: RelationDescriptor) -> Self {
        self.relations.insert(relation.name.clone(), relation);
        self
    }

    #[must_use]
    pub fn alias(mut self, name: impl Into<String>, replacement: impl Into<String>) -> Self {
        self.aliases.insert(name.into(), replacement.into());
        self
    }

    #[must_use]
    pub fn subtype(mut self, entity_name: impl Into<String>) -> Self {
        self.subtypes.push(entity_name.into());
        self
    }

    /// Resolve the discriminator value used for subclass filtering.
    #[must_use]
    pub fn discriminator_value(&self) -> &str {
        self.discriminator.as_deref().unwrap_or(&self.name)
    }
}
