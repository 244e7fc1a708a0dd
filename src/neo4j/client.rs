//! Neo4j-backed query executor

use super::query::QueryObject;
use super::record::{GraphNode, Record, RecordValue};
use super::traits::QueryExecutor;
use crate::error::{CoreError, CoreResult};
use anyhow::Context;
use async_trait::async_trait;
use neo4rs::{BoltType, Graph, Query};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Query executor over a pooled `neo4rs::Graph`.
///
/// Every call checks out its own connection from the driver pool, so
/// concurrent requests never share a session or transaction.
pub struct Neo4jService {
    graph: Arc<Graph>,
    timeout: Duration,
}

impl Neo4jService {
    /// Connect to Neo4j
    pub async fn new(uri: &str, user: &str, password: &str, timeout: Duration) -> CoreResult<Self> {
        let graph = Graph::new(uri, user, password)
            .await
            .context("Failed to connect to Neo4j")?;

        tracing::info!("Connected to Neo4j at {}", uri);

        Ok(Self {
            graph: Arc::new(graph),
            timeout,
        })
    }

    async fn read_rows(&self, q: QueryObject) -> CoreResult<Vec<Record>> {
        let columns = q.columns.clone();
        let fut = async {
            let mut stream = self
                .graph
                .execute(to_neo4rs(&q))
                .await
                .context("Neo4j read failed")?;
            let mut rows = Vec::new();
            while let Some(row) = stream.next().await.context("Neo4j row stream failed")? {
                rows.push(decode_row(&row, &columns));
            }
            Ok::<_, anyhow::Error>(rows)
        };
        self.bounded(fut, CoreError::ReadTimeout(self.timeout)).await
    }

    async fn bounded<T, F>(&self, fut: F, on_timeout: CoreError) -> CoreResult<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(CoreError::Graph),
            Err(_) => Err(on_timeout),
        }
    }
}

#[async_trait]
impl QueryExecutor for Neo4jService {
    async fn read_one(&self, query: QueryObject) -> CoreResult<Option<Record>> {
        Ok(self.read_rows(query).await?.into_iter().next())
    }

    async fn read_many(&self, query: QueryObject) -> CoreResult<Vec<Record>> {
        self.read_rows(query).await
    }

    async fn write_one(&self, q: QueryObject) -> CoreResult<Option<Record>> {
        let columns = q.columns.clone();
        let fut = async {
            let mut stream = self
                .graph
                .execute(to_neo4rs(&q))
                .await
                .context("Neo4j write failed")?;
            let first = stream.next().await.context("Neo4j row stream failed")?;
            Ok::<_, anyhow::Error>(first.map(|row| decode_row(&row, &columns)))
        };
        self.bounded(fut, CoreError::AmbiguousWrite(self.timeout)).await
    }

    async fn execute_in_transaction(&self, statements: Vec<QueryObject>) -> CoreResult<()> {
        let fut = async {
            let mut txn = self
                .graph
                .start_txn()
                .await
                .context("Failed to start transaction")?;
            for statement in &statements {
                if let Err(e) = txn.run(to_neo4rs(statement)).await {
                    txn.rollback()
                        .await
                        .context("Failed to rollback transaction")?;
                    return Err(anyhow::Error::new(e).context("Transaction statement failed"));
                }
            }
            txn.commit().await.context("Failed to commit transaction")?;
            Ok(())
        };
        self.bounded(fut, CoreError::AmbiguousWrite(self.timeout)).await
    }
}

fn to_neo4rs(q: &QueryObject) -> Query {
    tracing::debug!(query = %q.query, "cypher");
    q.params
        .iter()
        .fold(neo4rs::query(&q.query), |acc, (key, value)| {
            acc.param(key, json_to_bolt(value))
        })
}

/// Convert a JSON parameter into its Bolt representation
pub(crate) fn json_to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => Option::<String>::None.into(),
        Value::Bool(b) => (*b).into(),
        Value::Number(n) => match n.as_i64() {
            Some(i) => i.into(),
            None => n.as_f64().unwrap_or_default().into(),
        },
        Value::String(s) => s.clone().into(),
        Value::Array(items) => items.iter().map(json_to_bolt).collect::<Vec<_>>().into(),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| (k.clone(), json_to_bolt(v)))
            .collect::<HashMap<String, BoltType>>()
            .into(),
    }
}

fn decode_row(row: &neo4rs::Row, columns: &[String]) -> Record {
    let mut record = Record::new();
    for column in columns {
        let value = if let Ok(node) = row.get::<neo4rs::Node>(column) {
            RecordValue::Node(decode_node(&node))
        } else if let Ok(nodes) = row.get::<Vec<neo4rs::Node>>(column) {
            RecordValue::Nodes(nodes.iter().map(decode_node).collect())
        } else {
            match row.get::<Value>(column) {
                Ok(value) => RecordValue::Scalar(value),
                Err(e) => {
                    tracing::debug!("Column '{}' decoded as null: {}", column, e);
                    RecordValue::Scalar(Value::Null)
                }
            }
        };
        record.insert(column, value);
    }
    record
}

fn decode_node(node: &neo4rs::Node) -> GraphNode {
    let mut properties = Map::new();
    for key in node.keys() {
        match node.get::<Value>(key) {
            Ok(value) => {
                properties.insert(key.to_string(), value);
            }
            Err(e) => tracing::debug!("Skipping undecodable property '{}': {}", key, e),
        }
    }
    GraphNode {
        labels: node.labels().iter().map(|l| l.to_string()).collect(),
        properties,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_to_bolt_scalars() {
        assert!(matches!(json_to_bolt(&json!(null)), BoltType::Null(_)));
        assert!(matches!(json_to_bolt(&json!(true)), BoltType::Boolean(_)));
        assert!(matches!(json_to_bolt(&json!(7)), BoltType::Integer(_)));
        assert!(matches!(json_to_bolt(&json!(1.5)), BoltType::Float(_)));
        assert!(matches!(json_to_bolt(&json!("x")), BoltType::String(_)));
    }

    #[test]
    fn test_json_to_bolt_nested() {
        assert!(matches!(json_to_bolt(&json!(["a", "b"])), BoltType::List(_)));
        assert!(matches!(
            json_to_bolt(&json!({"name": "Ada", "tags": ["x"]})),
            BoltType::Map(_)
        ));
    }
}
