//! Declarative entity models
//!
//! An [`EntityModel`] is everything the engine knows about one domain type:
//! how it is named in Cypher, JSON:API and URLs, how tenant ownership is
//! expressed in the graph, which attributes and relationships it exposes,
//! and which properties may be searched or sorted on.

use crate::error::CoreResult;
use crate::neo4j::GraphNode;
use futures::future::BoxFuture;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// The four names of a domain type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityDescriptor {
    /// Cypher variable and relationship alias prefix (`employee`)
    pub name: &'static str,
    /// Node label (`Employee`)
    pub label: &'static str,
    /// JSON:API `type` (`employees`)
    pub api_type: &'static str,
    /// URL segment under the API base (`employees`)
    pub endpoint: &'static str,
}

/// How a node is tied to its tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// `(node)-[:EDGE]->(:Company)`
    Edge(&'static str),
    /// The node is the tenant itself
    Tenant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// Where a dynamic relationship reads its target type from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discriminator {
    /// First node label that the registry recognises
    Label,
    /// A stored property holding a name, label or type
    Property(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipTarget {
    Static(&'static EntityDescriptor),
    Dynamic {
        discriminator: Discriminator,
        /// Unresolvable targets are dropped instead of failing the document
        optional: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationshipSpec {
    /// Exposed JSON:API relationship name
    pub key: &'static str,
    pub edge: &'static str,
    pub direction: Direction,
    pub cardinality: Cardinality,
    pub target: RelationshipTarget,
}

impl RelationshipSpec {
    pub fn one(key: &'static str, edge: &'static str, target: &'static EntityDescriptor) -> Self {
        Self {
            key,
            edge,
            direction: Direction::Outgoing,
            cardinality: Cardinality::One,
            target: RelationshipTarget::Static(target),
        }
    }

    pub fn many(key: &'static str, edge: &'static str, target: &'static EntityDescriptor) -> Self {
        Self {
            cardinality: Cardinality::Many,
            ..Self::one(key, edge, target)
        }
    }

    pub fn dynamic(key: &'static str, edge: &'static str, discriminator: Discriminator) -> Self {
        Self {
            key,
            edge,
            direction: Direction::Outgoing,
            cardinality: Cardinality::One,
            target: RelationshipTarget::Dynamic {
                discriminator,
                optional: false,
            },
        }
    }

    pub fn incoming(mut self) -> Self {
        self.direction = Direction::Incoming;
        self
    }

    pub fn optional(mut self) -> Self {
        if let RelationshipTarget::Dynamic { discriminator, .. } = self.target {
            self.target = RelationshipTarget::Dynamic {
                discriminator,
                optional: true,
            };
        }
        self
    }

    /// Label constraint for the target node, if statically known
    pub fn target_label(&self) -> Option<&'static str> {
        match self.target {
            RelationshipTarget::Static(descriptor) => Some(descriptor.label),
            RelationshipTarget::Dynamic { .. } => None,
        }
    }
}

pub type SyncResolver = fn(&GraphNode) -> Value;
pub type AsyncResolver = Arc<dyn Fn(GraphNode) -> BoxFuture<'static, CoreResult<Value>> + Send + Sync>;

/// How one attribute value is produced from the hydrated node
#[derive(Clone)]
pub enum Attribute {
    /// Copy a stored property
    Literal(&'static str),
    /// Derive a value synchronously
    Computed(SyncResolver),
    /// Derive a value through an external collaborator (e.g. URL signing)
    AsyncComputed(AsyncResolver),
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attribute::Literal(property) => write!(f, "Literal({})", property),
            Attribute::Computed(_) => f.write_str("Computed"),
            Attribute::AsyncComputed(_) => f.write_str("AsyncComputed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSpec {
    pub index: String,
    pub properties: Vec<&'static str>,
}

#[derive(Debug, Clone)]
pub struct EntityModel {
    pub descriptor: EntityDescriptor,
    pub ownership: Ownership,
    pub attributes: Vec<(&'static str, Attribute)>,
    pub meta: Vec<(&'static str, Attribute)>,
    pub relationships: Vec<RelationshipSpec>,
    pub search: Option<SearchSpec>,
    pub sortable: Vec<&'static str>,
}

pub const OWNERSHIP_EDGE: &str = "BELONGS_TO";

impl EntityModel {
    /// A tenant-owned model linked to its company through `BELONGS_TO`
    pub fn new(descriptor: EntityDescriptor) -> Self {
        Self {
            descriptor,
            ownership: Ownership::Edge(OWNERSHIP_EDGE),
            attributes: Vec::new(),
            meta: vec![
                ("createdAt", Attribute::Literal("createdAt")),
                ("updatedAt", Attribute::Literal("updatedAt")),
            ],
            relationships: Vec::new(),
            search: None,
            sortable: vec!["createdAt", "updatedAt"],
        }
    }

    pub fn tenant_root(mut self) -> Self {
        self.ownership = Ownership::Tenant;
        self
    }

    /// Expose stored properties under their own names
    pub fn literals(mut self, properties: &[&'static str]) -> Self {
        for property in properties {
            self.attributes.push((property, Attribute::Literal(property)));
        }
        self
    }

    pub fn attribute(mut self, name: &'static str, attribute: Attribute) -> Self {
        self.attributes.push((name, attribute));
        self
    }

    pub fn relationship(mut self, spec: RelationshipSpec) -> Self {
        self.relationships.push(spec);
        self
    }

    /// Enable full-text search over `properties`
    pub fn searchable(mut self, properties: &[&'static str]) -> Self {
        self.search = Some(SearchSpec {
            index: format!("{}_search_index", self.descriptor.name),
            properties: properties.to_vec(),
        });
        self
    }

    pub fn sortable(mut self, properties: &[&'static str]) -> Self {
        for property in properties {
            if !self.sortable.contains(property) {
                self.sortable.push(property);
            }
        }
        self
    }

    pub fn name(&self) -> &'static str {
        self.descriptor.name
    }

    pub fn label(&self) -> &'static str {
        self.descriptor.label
    }

    pub fn api_type(&self) -> &'static str {
        self.descriptor.api_type
    }

    /// Stored property behind a writable attribute
    pub fn writable_property(&self, attribute: &str) -> Option<&'static str> {
        self.attributes.iter().find_map(|(name, source)| match source {
            Attribute::Literal(property) if *name == attribute => Some(*property),
            _ => None,
        })
    }

    pub fn find_relationship(&self, key: &str) -> Option<&RelationshipSpec> {
        self.relationships.iter().find(|r| r.key == key)
    }

    /// Column alias carrying a relationship in returned rows (`employee_company`)
    pub fn relationship_column(&self, spec: &RelationshipSpec) -> String {
        format!("{}_{}", self.descriptor.name, spec.key)
    }

    /// Every column a hydrating query returns, entity first
    pub fn columns(&self) -> Vec<String> {
        std::iter::once(self.descriptor.name.to_string())
            .chain(self.relationships.iter().map(|r| self.relationship_column(r)))
            .collect()
    }
}
