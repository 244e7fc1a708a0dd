//! Startup schema bootstrap: id uniqueness and full-text indexes

use crate::error::CoreResult;
use crate::model::{EntityModel, ModelRegistry};
use crate::neo4j::{QueryExecutor, QueryObject};
use serde_json::Value;

/// Ensure every registered model has its constraints and search index.
/// Any failure is fatal to startup.
pub async fn bootstrap_schema(
    executor: &dyn QueryExecutor,
    registry: &ModelRegistry,
) -> CoreResult<()> {
    let mut models: Vec<_> = registry.models().collect();
    models.sort_by_key(|m| m.name());

    for model in models {
        ensure_id_constraint(executor, model).await?;
        ensure_search_index(executor, model).await?;
    }
    tracing::info!("Schema bootstrap complete for {} models", registry.len());
    Ok(())
}

async fn ensure_id_constraint(executor: &dyn QueryExecutor, model: &EntityModel) -> CoreResult<()> {
    executor
        .write_one(QueryObject::new(format!(
            "CREATE CONSTRAINT {}_id IF NOT EXISTS FOR (n:{}) REQUIRE n.id IS UNIQUE",
            model.name(),
            model.label()
        )))
        .await?;
    Ok(())
}

async fn ensure_search_index(executor: &dyn QueryExecutor, model: &EntityModel) -> CoreResult<()> {
    let Some(search) = &model.search else {
        return Ok(());
    };

    let existing = executor
        .read_one(
            QueryObject::new(
                "SHOW FULLTEXT INDEXES YIELD name, labelsOrTypes, properties \
                 WHERE name = $name \
                 RETURN labelsOrTypes, properties",
            )
            .param("name", search.index.clone())
            .returning(["labelsOrTypes", "properties"]),
        )
        .await?;

    if let Some(record) = existing {
        let labels = string_list(record.scalar("labelsOrTypes"));
        let properties = string_list(record.scalar("properties"));
        let mut wanted: Vec<String> = search.properties.iter().map(|p| p.to_string()).collect();
        wanted.sort();

        if labels == [model.label()] && sorted(properties.clone()) == wanted {
            tracing::debug!("Full-text index {} is up to date", search.index);
            return Ok(());
        }
        tracing::warn!(
            "Full-text index {} drifted (labels {:?}, properties {:?}); recreating",
            search.index,
            labels,
            properties
        );
        executor
            .write_one(QueryObject::new(format!(
                "DROP INDEX {} IF EXISTS",
                search.index
            )))
            .await?;
    }

    let on_each = search
        .properties
        .iter()
        .map(|p| format!("n.{}", p))
        .collect::<Vec<_>>()
        .join(", ");
    executor
        .write_one(QueryObject::new(format!(
            "CREATE FULLTEXT INDEX {} IF NOT EXISTS FOR (n:{}) ON EACH [{}]",
            search.index,
            model.label(),
            on_each
        )))
        .await?;
    tracing::info!("Created full-text index {}", search.index);
    Ok(())
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn sorted(mut items: Vec<String>) -> Vec<String> {
    items.sort();
    items
}
