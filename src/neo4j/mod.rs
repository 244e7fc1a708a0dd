//! Graph query executor: Neo4j client, row model and query objects

pub mod client;
pub mod query;
pub mod record;
pub mod traits;

pub use client::Neo4jService;
pub use query::QueryObject;
pub use record::{GraphNode, Params, Record, RecordValue};
pub use traits::QueryExecutor;

#[cfg(test)]
pub(crate) mod mock;
