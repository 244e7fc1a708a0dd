//! QueryExecutor trait definition
//!
//! The minimal surface the repository and migration layers need from a graph
//! database. `Neo4jService` implements it against a live server; tests use
//! the in-memory `MockExecutor`.

use super::query::QueryObject;
use super::record::Record;
use crate::error::CoreResult;
use async_trait::async_trait;

#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Run a read query and return its first row, if any
    async fn read_one(&self, query: QueryObject) -> CoreResult<Option<Record>>;

    /// Run a read query and return every row in result order
    async fn read_many(&self, query: QueryObject) -> CoreResult<Vec<Record>>;

    /// Run a single auto-committed write and return its first row, if any
    async fn write_one(&self, query: QueryObject) -> CoreResult<Option<Record>>;

    /// Run every statement inside one transaction; all or nothing
    async fn execute_in_transaction(&self, statements: Vec<QueryObject>) -> CoreResult<()>;
}
