//! Cypher fragment builders and the pipeline that assembles them

pub mod builder;
pub mod pipeline;

pub use builder::{
    ownership_predicate, CypherBuilder, DefaultOptions, SearchField, SortDirection, TENANT_LABEL,
    TENANT_VAR, USER_LABEL, USER_VAR,
};
pub use pipeline::QueryPipeline;
