//! JSON:API document shapes

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// `{ type, id }` pair identifying a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub id: String,
}

/// Relationship linkage: a single (possibly null) identifier or a list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelationshipData {
    Many(Vec<ResourceIdentifier>),
    One(Option<ResourceIdentifier>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub data: RelationshipData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLinks {
    #[serde(rename = "self")]
    pub self_link: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceObject {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub id: String,
    pub attributes: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<String, Relationship>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<ResourceLinks>,
}

impl ResourceObject {
    pub fn identifier(&self) -> ResourceIdentifier {
        ResourceIdentifier {
            resource_type: self.resource_type.clone(),
            id: self.id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Links {
    #[serde(rename = "self")]
    pub self_link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PrimaryData {
    Single(Box<ResourceObject>),
    Many(Vec<ResourceObject>),
}

/// A complete response document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub data: PrimaryData,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub included: Vec<ResourceObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

impl Document {
    /// Primary resources as a slice, whatever the data shape
    pub fn resources(&self) -> Vec<&ResourceObject> {
        match &self.data {
            PrimaryData::Single(resource) => vec![resource.as_ref()],
            PrimaryData::Many(resources) => resources.iter().collect(),
        }
    }
}

// ============================================================================
// Write payloads
// ============================================================================

/// Body of a create/update request
#[derive(Debug, Clone, Deserialize)]
pub struct WriteDocument {
    pub data: WriteResource,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WriteResource {
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub relationships: BTreeMap<String, Relationship>,
}
