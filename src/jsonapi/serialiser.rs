//! Shapes hydrated rows into JSON:API documents
//!
//! Attribute maps come from the [`EntityModel`]; relationship targets are
//! resolved through the [`ModelRegistry`], so polymorphic edges render with
//! the type of whatever node they actually point at.

use super::document::{
    Document, PrimaryData, Relationship, RelationshipData, ResourceIdentifier, ResourceLinks,
    ResourceObject,
};
use super::paginator::JsonApiPaginator;
use crate::error::{CoreError, CoreResult};
use crate::model::{
    Attribute, Cardinality, Discriminator, EntityModel, ModelRegistry, RelationshipSpec,
    RelationshipTarget,
};
use crate::neo4j::{GraphNode, Record};
use futures::future::try_join_all;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Per-request rendering choices taken from the query string
#[derive(Debug, Clone, Copy, Default)]
struct Selection<'a> {
    paginator: Option<&'a JsonApiPaginator>,
}

impl<'a> Selection<'a> {
    fn fields(&self, resource_type: &str) -> Option<&'a [String]> {
        self.paginator.and_then(|p| p.fields_for(resource_type))
    }

    fn includes(&self, key: &str) -> bool {
        match self.paginator.and_then(JsonApiPaginator::include) {
            None => true,
            Some(names) => names.iter().any(|n| n == key),
        }
    }
}

fn selected(fields: Option<&[String]>, name: &str) -> bool {
    fields.map_or(true, |f| f.iter().any(|n| n == name))
}

/// One primary resource with the related resources it pulled in
struct Rendered {
    resource: ResourceObject,
    included: Vec<ResourceObject>,
}

#[derive(Clone)]
pub struct JsonApiSerialiser {
    registry: Arc<ModelRegistry>,
    api_base_url: String,
}

impl JsonApiSerialiser {
    pub fn new(registry: Arc<ModelRegistry>, api_base_url: impl Into<String>) -> Self {
        Self {
            registry,
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// `{base}/{endpoint}/{id}`
    pub fn self_url(&self, model: &EntityModel, id: &str) -> String {
        format!("{}/{}/{}", self.api_base_url, model.descriptor.endpoint, id)
    }

    /// Render one hydrated row as a `{data, included}` document
    pub async fn build_single(
        &self,
        model: &EntityModel,
        record: &Record,
        paginator: Option<&JsonApiPaginator>,
    ) -> CoreResult<Document> {
        let selection = Selection { paginator };
        let rendered = self.render_record(model, record, selection).await?;
        let mut included = Included::new([rendered.resource.identifier()]);
        included.extend(rendered.included);

        Ok(Document {
            data: PrimaryData::Single(Box::new(rendered.resource)),
            included: included.into_vec(),
            links: None,
            meta: None,
        })
    }

    /// Render a page of rows.
    ///
    /// `records` may hold the over-fetched `size + 1`th row; link generation
    /// trims it before anything is rendered. With `fetch_all` only a `self`
    /// link is produced. Row order is preserved.
    pub async fn build_list(
        &self,
        model: &EntityModel,
        mut records: Vec<Record>,
        paginator: &mut JsonApiPaginator,
        url: &str,
        fetch_all: bool,
    ) -> CoreResult<Document> {
        let links = if fetch_all {
            paginator.self_link(url)
        } else {
            paginator.generate_links(&mut records, url)
        };

        let selection = Selection {
            paginator: Some(&*paginator),
        };
        let rendered = try_join_all(
            records
                .iter()
                .map(|record| self.render_record(model, record, selection)),
        )
        .await?;

        let mut included = Included::new(rendered.iter().map(|r| r.resource.identifier()));
        let mut data = Vec::with_capacity(rendered.len());
        for item in rendered {
            included.extend(item.included);
            data.push(item.resource);
        }

        Ok(Document {
            data: PrimaryData::Many(data),
            included: included.into_vec(),
            links: Some(links),
            meta: None,
        })
    }

    async fn render_record(
        &self,
        model: &EntityModel,
        record: &Record,
        selection: Selection<'_>,
    ) -> CoreResult<Rendered> {
        let node = record.node(model.name()).ok_or_else(|| {
            CoreError::Decode(format!("row has no '{}' column", model.name()))
        })?;
        let fields = selection.fields(model.api_type());
        let mut resource = self.render_node(model, node, fields).await?;
        let mut included = Vec::new();

        for spec in &model.relationships {
            if !selected(fields, spec.key) {
                continue;
            }
            let column = model.relationship_column(spec);
            let mut identifiers = Vec::new();

            for related in record.nodes(&column) {
                let Some(target) = self.resolve_target(spec, related)? else {
                    continue;
                };
                let Some(id) = related.id() else {
                    tracing::warn!("Skipping {} target without id", column);
                    continue;
                };
                identifiers.push(ResourceIdentifier {
                    resource_type: target.api_type().to_string(),
                    id,
                });
                if selection.includes(spec.key) {
                    let fields = selection.fields(target.api_type());
                    included.push(self.render_node(&target, related, fields).await?);
                }
            }

            let data = match spec.cardinality {
                Cardinality::One => RelationshipData::One(identifiers.into_iter().next()),
                Cardinality::Many => RelationshipData::Many(identifiers),
            };
            resource
                .relationships
                .insert(spec.key.to_string(), Relationship { data });
        }

        Ok(Rendered { resource, included })
    }

    /// Attributes, meta and self link of a single node
    async fn render_node(
        &self,
        model: &EntityModel,
        node: &GraphNode,
        fields: Option<&[String]>,
    ) -> CoreResult<ResourceObject> {
        let id = node
            .id()
            .ok_or_else(|| CoreError::Decode(format!("{} node without id", model.label())))?;

        let selected_attributes: Vec<_> = model
            .attributes
            .iter()
            .filter(|(name, _)| selected(fields, name))
            .collect();
        let values = try_join_all(
            selected_attributes
                .iter()
                .map(|(_, attribute)| resolve_attribute(attribute, node)),
        )
        .await?;
        let attributes: Map<String, Value> = selected_attributes
            .iter()
            .map(|(name, _)| name.to_string())
            .zip(values)
            .collect();

        let meta_values = try_join_all(
            model
                .meta
                .iter()
                .map(|(_, attribute)| resolve_attribute(attribute, node)),
        )
        .await?;
        let meta: Map<String, Value> = model
            .meta
            .iter()
            .map(|(name, _)| name.to_string())
            .zip(meta_values)
            .collect();

        Ok(ResourceObject {
            resource_type: model.api_type().to_string(),
            links: Some(ResourceLinks {
                self_link: self.self_url(model, &id),
            }),
            id,
            attributes,
            meta: Some(meta).filter(|m| !m.is_empty()),
            relationships: BTreeMap::new(),
        })
    }

    /// The model a related node renders as, or `None` when an optional
    /// dynamic target cannot be resolved
    fn resolve_target(
        &self,
        spec: &RelationshipSpec,
        node: &GraphNode,
    ) -> CoreResult<Option<Arc<EntityModel>>> {
        let (resolved, discriminator, optional) = match spec.target {
            RelationshipTarget::Static(descriptor) => (
                self.registry.resolve_model(descriptor.name),
                descriptor.name.to_string(),
                false,
            ),
            RelationshipTarget::Dynamic {
                discriminator: Discriminator::Label,
                optional,
            } => (
                node.labels
                    .iter()
                    .find_map(|label| self.registry.resolve_model(label)),
                node.labels.join(":"),
                optional,
            ),
            RelationshipTarget::Dynamic {
                discriminator: Discriminator::Property(property),
                optional,
            } => {
                let value = node.get_str(property).unwrap_or_default();
                (
                    Some(value)
                        .filter(|v| !v.is_empty())
                        .and_then(|v| self.registry.resolve_model(v)),
                    value.to_string(),
                    optional,
                )
            }
        };

        match resolved {
            Some(model) => Ok(Some(model)),
            None if optional => {
                tracing::debug!(
                    "Dropping unresolved optional '{}' target '{}'",
                    spec.key,
                    discriminator
                );
                Ok(None)
            }
            None => Err(CoreError::Taxonomy {
                relationship: spec.key.to_string(),
                discriminator,
            }),
        }
    }
}

async fn resolve_attribute(attribute: &Attribute, node: &GraphNode) -> CoreResult<Value> {
    match attribute {
        Attribute::Literal(property) => Ok(node.get(property).cloned().unwrap_or(Value::Null)),
        Attribute::Computed(resolve) => Ok(resolve(node)),
        Attribute::AsyncComputed(resolve) => resolve(node.clone()).await,
    }
}

/// `included` accumulator keyed by (type, id). Primary resources are seeded
/// as seen so they are never repeated in `included`.
struct Included {
    seen: HashSet<ResourceIdentifier>,
    resources: Vec<ResourceObject>,
}

impl Included {
    fn new(primary: impl IntoIterator<Item = ResourceIdentifier>) -> Self {
        Self {
            seen: primary.into_iter().collect(),
            resources: Vec::new(),
        }
    }

    fn extend(&mut self, resources: Vec<ResourceObject>) {
        for resource in resources {
            if self.seen.insert(resource.identifier()) {
                self.resources.push(resource);
            }
        }
    }

    fn into_vec(self) -> Vec<ResourceObject> {
        self.resources
    }
}
