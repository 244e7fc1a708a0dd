//! Generic entity repository
//!
//! Composes [`CypherBuilder`] fragments through a [`QueryPipeline`], runs
//! them on a [`QueryExecutor`] and hands back hydrated rows: the entity plus
//! every relationship column declared by its model.

pub mod schema;

pub use schema::bootstrap_schema;

use crate::auth::TenantContext;
use crate::cypher::{ownership_predicate, CypherBuilder, DefaultOptions, QueryPipeline, SearchField};
use crate::error::{CoreError, CoreResult};
use crate::jsonapi::Cursor;
use crate::model::{Direction, EntityModel, Ownership, RelationshipTarget, OWNERSHIP_EDGE};
use crate::neo4j::{QueryExecutor, QueryObject, Record};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Options for [`EntityRepository::find`]
#[derive(Debug, Clone, Default)]
pub struct FindParams {
    /// Ignore the cursor and return every matching row
    pub fetch_all: bool,
    /// Full-text search term; switches to relevance ordering
    pub term: Option<String>,
    pub order_by: Option<String>,
    pub cursor: Option<Cursor>,
}

/// Replacement linkage for one relationship
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipWrite {
    pub key: String,
    pub ids: Vec<String>,
}

/// Payload for `create` and `put`, already mapped to stored property names
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityWrite {
    pub id: String,
    pub properties: Map<String, Value>,
    pub relationships: Vec<RelationshipWrite>,
}

pub struct EntityRepository {
    model: Arc<EntityModel>,
    executor: Arc<dyn QueryExecutor>,
}

impl EntityRepository {
    pub fn new(model: Arc<EntityModel>, executor: Arc<dyn QueryExecutor>) -> Self {
        Self { model, executor }
    }

    pub fn model(&self) -> &Arc<EntityModel> {
        &self.model
    }

    fn builder(&self) -> CypherBuilder<'_> {
        CypherBuilder::new(&self.model)
    }

    /// List entities visible to `ctx`
    pub async fn find(&self, ctx: &TenantContext, params: FindParams) -> CoreResult<Vec<Record>> {
        let builder = self.builder();
        let cursor = if params.fetch_all { None } else { params.cursor };
        let term = params
            .term
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());

        let pipeline = match (term, builder.full_text(ctx)) {
            (Some(term), Some(search)) => QueryPipeline::new(ctx, search)
                .order("ORDER BY score DESC".to_string())
                .param("term", lucene_query(term)),
            (term, _) => {
                if term.is_some() {
                    tracing::debug!("{} has no search index, ignoring term", self.model.name());
                }
                QueryPipeline::new(ctx, builder.default(ctx, DefaultOptions::default()))
                    .access(builder.user_has_access(ctx))
                    .order(builder.order_by(params.order_by.as_deref()))
            }
        };

        let query = pipeline
            .paginate(cursor)
            .returning(builder.return_statement(), self.model.columns())
            .assemble();
        self.executor.read_many(query).await
    }

    /// Load one entity; `Forbidden` when it exists under another tenant
    pub async fn find_by_id(&self, ctx: &TenantContext, id: &str) -> CoreResult<Record> {
        let builder = self.builder();
        let query = QueryPipeline::new(
            ctx,
            builder.default(
                ctx,
                DefaultOptions {
                    search_field: Some(SearchField::id()),
                    block_company_and_user: false,
                },
            ),
        )
        .access(builder.user_has_access(ctx))
        .returning(builder.return_statement(), self.model.columns())
        .param("searchValue", id)
        .assemble();

        match self.executor.read_one(query).await? {
            Some(record) => Ok(record),
            None => Err(self.forbidden_or_missing(id).await?),
        }
    }

    /// Probe for the node with no tenant in scope. A hit means the caller
    /// asked for something that exists outside its tenant.
    async fn forbidden_or_missing(&self, id: &str) -> CoreResult<CoreError> {
        let system = TenantContext::system();
        let probe = QueryPipeline::new(
            &system,
            self.builder().default(
                &system,
                DefaultOptions {
                    search_field: Some(SearchField::id()),
                    block_company_and_user: true,
                },
            ),
        )
        .returning(
            format!("RETURN {}.id AS id\nLIMIT 1", self.model.name()),
            vec!["id".to_string()],
        )
        .param("searchValue", id)
        .assemble();

        Ok(match self.executor.read_one(probe).await? {
            Some(_) => CoreError::forbidden(self.model.name(), id),
            None => CoreError::not_found(self.model.name(), id),
        })
    }

    pub async fn create(&self, ctx: &TenantContext, write: EntityWrite) -> CoreResult<Record> {
        let var = self.model.name();
        let now = chrono::Utc::now().to_rfc3339();
        let mut query = QueryObject::scoped(ctx)
            .param("id", write.id.clone())
            .param("properties", Value::Object(write.properties))
            .param("now", now);
        query.push(&format!(
            "CREATE ({var}:{label} {{id: $id}})\n\
             SET {var} += $properties, {var}.createdAt = $now, {var}.updatedAt = $now",
            var = var,
            label = self.model.label(),
        ));
        self.push_relationship_writes(&mut query, &write.relationships);
        self.push_ownership(&mut query);
        query.push(&format!("RETURN {}.id AS id", var));
        query.columns = vec!["id".to_string()];

        self.executor.write_one(query).await?;
        tracing::debug!("Created {} {}", var, write.id);
        self.find_by_id(ctx, &write.id).await
    }

    /// Update attributes and replace the linkage of listed relationships
    pub async fn put(&self, ctx: &TenantContext, write: EntityWrite) -> CoreResult<Record> {
        let var = self.model.name();
        let mut query = QueryObject::scoped(ctx)
            .param("searchValue", write.id.clone())
            .param("properties", Value::Object(write.properties))
            .param("now", chrono::Utc::now().to_rfc3339());
        query.push(&format!(
            "MATCH ({var}:{label} {{id: $searchValue}})\n\
             WHERE {predicate}\n\
             SET {var} += $properties, {var}.updatedAt = $now",
            var = var,
            label = self.model.label(),
            predicate = self.builder().tenant_predicate(),
        ));
        self.push_relationship_writes(&mut query, &write.relationships);
        self.push_ownership(&mut query);
        query.push(&format!("RETURN {}.id AS id", var));
        query.columns = vec!["id".to_string()];

        match self.executor.write_one(query).await? {
            Some(_) => self.find_by_id(ctx, &write.id).await,
            None => Err(self.forbidden_or_missing(&write.id).await?),
        }
    }

    pub async fn delete(&self, ctx: &TenantContext, id: &str) -> CoreResult<()> {
        let var = self.model.name();
        let mut query = QueryObject::scoped(ctx).param("searchValue", id);
        query.push(&format!(
            "MATCH ({var}:{label} {{id: $searchValue}})\n\
             WHERE {predicate}\n\
             DETACH DELETE {var}\n\
             RETURN count(*) AS deleted",
            var = var,
            label = self.model.label(),
            predicate = self.builder().tenant_predicate(),
        ));
        query.columns = vec!["deleted".to_string()];

        let deleted = self
            .executor
            .write_one(query)
            .await?
            .and_then(|r| r.get_i64("deleted"))
            .unwrap_or(0);
        if deleted == 0 {
            return Err(self.forbidden_or_missing(id).await?);
        }
        tracing::debug!("Deleted {} {}", var, id);
        Ok(())
    }

    /// Re-link the node to the acting tenant
    fn push_ownership(&self, query: &mut QueryObject) {
        let Ownership::Edge(edge) = self.model.ownership else {
            return;
        };
        let var = self.model.name();
        query.push(&format!(
            "WITH {var}\n\
             OPTIONAL MATCH (owner:Company {{id: $companyId}})\n\
             FOREACH (o IN CASE WHEN owner IS NULL THEN [] ELSE [owner] END | MERGE ({var})-[:{edge}]->(o))\n\
             WITH DISTINCT {var}",
            var = var,
            edge = edge,
        ));
    }

    fn push_relationship_writes(&self, query: &mut QueryObject, writes: &[RelationshipWrite]) {
        let var = self.model.name();
        for (i, write) in writes.iter().enumerate() {
            let Some(spec) = self.model.find_relationship(&write.key) else {
                tracing::warn!("Ignoring unknown relationship '{}' on {}", write.key, var);
                continue;
            };
            let RelationshipTarget::Static(target) = spec.target else {
                tracing::warn!("Ignoring write to dynamic relationship '{}'", write.key);
                continue;
            };

            let (old, new) = match spec.direction {
                Direction::Outgoing => (
                    format!("({})-[old{}:{}]->(:{})", var, i, spec.edge, target.label),
                    format!("({})-[:{}]->(t)", var, spec.edge),
                ),
                Direction::Incoming => (
                    format!("({})<-[old{}:{}]-(:{})", var, i, spec.edge, target.label),
                    format!("({})<-[:{}]-(t)", var, spec.edge),
                ),
            };
            let target_ownership = if target.label == crate::cypher::TENANT_LABEL {
                Ownership::Tenant
            } else {
                Ownership::Edge(OWNERSHIP_EDGE)
            };
            let param = format!("rel{}", i);

            query.push(&format!(
                "WITH {var}\n\
                 OPTIONAL MATCH {old}\n\
                 DELETE old{i}\n\
                 WITH DISTINCT {var}\n\
                 OPTIONAL MATCH (target{i}:{label})\n\
                 WHERE target{i}.id IN ${param} AND ({predicate})\n\
                 WITH {var}, collect(target{i}) AS targets{i}\n\
                 FOREACH (t IN targets{i} | MERGE {new})",
                var = var,
                old = old,
                i = i,
                label = target.label,
                param = param,
                predicate = ownership_predicate(&format!("target{}", i), target_ownership),
                new = new,
            ));
            query.params.insert(
                param,
                Value::Array(write.ids.iter().cloned().map(Value::String).collect()),
            );
        }
    }
}

/// Escape Lucene syntax and prefix-match every word of `term`
pub fn lucene_query(term: &str) -> String {
    const SPECIAL: &[char] = &[
        '+', '-', '&', '|', '!', '(', ')', '{', '}', '[', ']', '^', '"', '~', '*', '?', ':', '\\',
        '/',
    ];
    term.split_whitespace()
        .map(|word| {
            let mut escaped = String::with_capacity(word.len() + 1);
            for c in word.chars() {
                if SPECIAL.contains(&c) {
                    escaped.push('\\');
                }
                escaped.push(c);
            }
            escaped.push('*');
            escaped
        })
        .collect::<Vec<_>>()
        .join(" ")
}
