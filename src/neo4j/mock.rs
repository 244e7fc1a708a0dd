//! In-memory mock implementation of QueryExecutor for testing.
//!
//! Responses come from a scripted handler; every executed statement is
//! recorded so tests can assert on the generated Cypher.

use super::query::QueryObject;
use super::record::Record;
use super::traits::QueryExecutor;
use crate::error::{CoreError, CoreResult};
use async_trait::async_trait;
use std::sync::Mutex;

type Handler = Box<dyn Fn(&QueryObject) -> CoreResult<Vec<Record>> + Send + Sync>;

pub struct MockExecutor {
    handler: Handler,
    pub executed: Mutex<Vec<QueryObject>>,
    pub transactions: Mutex<Vec<Vec<QueryObject>>>,
}

impl MockExecutor {
    /// Executor that answers every query with no rows
    pub fn new() -> Self {
        Self::with_handler(|_| Ok(Vec::new()))
    }

    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&QueryObject) -> CoreResult<Vec<Record>> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            executed: Mutex::new(Vec::new()),
            transactions: Mutex::new(Vec::new()),
        }
    }

    /// Executor that fails any statement containing `pattern`; a failing
    /// statement aborts its transaction and nothing is committed
    pub fn failing_on(pattern: &'static str) -> Self {
        Self::with_handler(move |q| {
            if q.query.contains(pattern) {
                Err(CoreError::Graph(anyhow::anyhow!("constraint violation")))
            } else {
                Ok(Vec::new())
            }
        })
    }

    pub fn queries(&self) -> Vec<QueryObject> {
        self.executed.lock().map(|q| q.clone()).unwrap_or_default()
    }

    pub fn committed(&self) -> Vec<Vec<QueryObject>> {
        self.transactions.lock().map(|t| t.clone()).unwrap_or_default()
    }

    fn run(&self, query: QueryObject) -> CoreResult<Vec<Record>> {
        let result = (self.handler)(&query);
        if let Ok(mut executed) = self.executed.lock() {
            executed.push(query);
        }
        result
    }
}

impl Default for MockExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueryExecutor for MockExecutor {
    async fn read_one(&self, query: QueryObject) -> CoreResult<Option<Record>> {
        Ok(self.run(query)?.into_iter().next())
    }

    async fn read_many(&self, query: QueryObject) -> CoreResult<Vec<Record>> {
        self.run(query)
    }

    async fn write_one(&self, query: QueryObject) -> CoreResult<Option<Record>> {
        Ok(self.run(query)?.into_iter().next())
    }

    async fn execute_in_transaction(&self, statements: Vec<QueryObject>) -> CoreResult<()> {
        for statement in &statements {
            self.run(statement.clone())?;
        }
        if let Ok(mut transactions) = self.transactions.lock() {
            transactions.push(statements);
        }
        Ok(())
    }
}
