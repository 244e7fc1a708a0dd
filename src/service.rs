//! Resource service: the list/get/create/update/delete flow for any
//! registered entity, shared by every endpoint

use crate::auth::TenantContext;
use crate::error::CoreError;
use crate::jsonapi::{
    Document, JsonApiPaginator, JsonApiSerialiser, RelationshipData, WriteDocument, WriteResource,
};
use crate::model::{EntityModel, ModelRegistry, RelationshipTarget};
use crate::neo4j::QueryExecutor;
use crate::repository::{EntityRepository, EntityWrite, FindParams, RelationshipWrite};
use serde_json::Map;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("unknown resource '{0}'")]
    UnknownResource(String),

    #[error("{0}")]
    Invalid(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Clone)]
pub struct ResourceService {
    registry: Arc<ModelRegistry>,
    executor: Arc<dyn QueryExecutor>,
    serialiser: JsonApiSerialiser,
}

impl ResourceService {
    pub fn new(
        registry: Arc<ModelRegistry>,
        executor: Arc<dyn QueryExecutor>,
        api_base_url: &str,
    ) -> Self {
        Self {
            serialiser: JsonApiSerialiser::new(registry.clone(), api_base_url),
            registry,
            executor,
        }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    fn resolve(&self, endpoint: &str) -> ServiceResult<(Arc<EntityModel>, EntityRepository)> {
        let model = self
            .registry
            .by_endpoint(endpoint)
            .ok_or_else(|| ServiceError::UnknownResource(endpoint.to_string()))?;
        let repository = EntityRepository::new(model.clone(), self.executor.clone());
        Ok((model, repository))
    }

    /// `query` is the raw query string; `url` the request path used for links
    pub async fn list(
        &self,
        ctx: &TenantContext,
        endpoint: &str,
        query: Option<&str>,
        url: &str,
    ) -> ServiceResult<Document> {
        let (model, repository) = self.resolve(endpoint)?;
        let mut paginator = JsonApiPaginator::from_query(query);
        let fetch_all = matches!(paginator.param("fetchAll"), Some("true") | Some("1"));

        let records = repository
            .find(
                ctx,
                FindParams {
                    fetch_all,
                    term: paginator.param("search").map(str::to_string),
                    order_by: paginator.param("orderBy").map(str::to_string),
                    cursor: Some(paginator.generate_cursor()),
                },
            )
            .await?;

        Ok(self
            .serialiser
            .build_list(&model, records, &mut paginator, url, fetch_all)
            .await?)
    }

    pub async fn get(
        &self,
        ctx: &TenantContext,
        endpoint: &str,
        id: &str,
        query: Option<&str>,
    ) -> ServiceResult<Document> {
        let (model, repository) = self.resolve(endpoint)?;
        let record = repository.find_by_id(ctx, id).await?;
        let paginator = JsonApiPaginator::from_query(query);
        Ok(self
            .serialiser
            .build_single(&model, &record, Some(&paginator))
            .await?)
    }

    pub async fn create(
        &self,
        ctx: &TenantContext,
        endpoint: &str,
        body: WriteDocument,
    ) -> ServiceResult<Document> {
        let (model, repository) = self.resolve(endpoint)?;
        check_type(&model, &body.data)?;
        let id = body
            .data
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let write = to_write(&model, id, body.data)?;
        let record = repository.create(ctx, write).await?;
        Ok(self.serialiser.build_single(&model, &record, None).await?)
    }

    pub async fn update(
        &self,
        ctx: &TenantContext,
        endpoint: &str,
        id: &str,
        body: WriteDocument,
    ) -> ServiceResult<Document> {
        let (model, repository) = self.resolve(endpoint)?;
        check_type(&model, &body.data)?;
        if let Some(body_id) = body.data.id.as_deref() {
            if body_id != id {
                return Err(ServiceError::Conflict(format!(
                    "body id '{}' does not match '{}'",
                    body_id, id
                )));
            }
        }

        let write = to_write(&model, id.to_string(), body.data)?;
        let record = repository.put(ctx, write).await?;
        Ok(self.serialiser.build_single(&model, &record, None).await?)
    }

    pub async fn delete(&self, ctx: &TenantContext, endpoint: &str, id: &str) -> ServiceResult<()> {
        let (_, repository) = self.resolve(endpoint)?;
        repository.delete(ctx, id).await?;
        Ok(())
    }
}

fn check_type(model: &EntityModel, resource: &WriteResource) -> ServiceResult<()> {
    if resource.resource_type != model.api_type() {
        return Err(ServiceError::Conflict(format!(
            "type '{}' does not match endpoint type '{}'",
            resource.resource_type,
            model.api_type()
        )));
    }
    Ok(())
}

/// Map a JSON:API write payload onto stored properties and linkage.
/// Only literal attributes and statically typed relationships are writable.
fn to_write(model: &EntityModel, id: String, resource: WriteResource) -> ServiceResult<EntityWrite> {
    let mut properties = Map::new();
    for (name, value) in resource.attributes {
        let property = model.writable_property(&name).ok_or_else(|| {
            ServiceError::Invalid(format!(
                "'{}' is not a writable attribute of {}",
                name,
                model.api_type()
            ))
        })?;
        properties.insert(property.to_string(), value);
    }

    let mut relationships = Vec::new();
    for (key, relationship) in resource.relationships {
        let spec = model.find_relationship(&key).ok_or_else(|| {
            ServiceError::Invalid(format!("unknown relationship '{}'", key))
        })?;
        let RelationshipTarget::Static(target) = spec.target else {
            return Err(ServiceError::Invalid(format!(
                "relationship '{}' is read-only",
                key
            )));
        };

        let identifiers = match relationship.data {
            RelationshipData::One(identifier) => identifier.into_iter().collect(),
            RelationshipData::Many(identifiers) => identifiers,
        };
        let mut ids = Vec::with_capacity(identifiers.len());
        for identifier in identifiers {
            if identifier.resource_type != target.api_type {
                return Err(ServiceError::Conflict(format!(
                    "relationship '{}' expects '{}', got '{}'",
                    key, target.api_type, identifier.resource_type
                )));
            }
            ids.push(identifier.id);
        }
        relationships.push(RelationshipWrite { key, ids });
    }

    Ok(EntityWrite {
        id,
        properties,
        relationships,
    })
}
