//! Executable query objects

use super::record::Params;
use crate::auth::TenantContext;
use serde_json::Value;

/// A fully assembled, parameterised Cypher statement.
///
/// `columns` lists the `RETURN` aliases the executor should decode into each
/// [`Record`](super::Record); write statements leave it empty.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryObject {
    pub query: String,
    pub params: Params,
    pub columns: Vec<String>,
}

impl QueryObject {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    /// Start a query pre-seeded with `$companyId` and `$userId`.
    ///
    /// Both parameters are always bound (as null when absent) so tenant
    /// predicates like `$companyId IS NULL OR ...` compile in every context.
    pub fn scoped(ctx: &TenantContext) -> Self {
        let mut q = Self::default();
        q.params.insert(
            "companyId".to_string(),
            ctx.company_id.clone().map(Value::String).unwrap_or(Value::Null),
        );
        q.params.insert(
            "userId".to_string(),
            ctx.user_id.clone().map(Value::String).unwrap_or(Value::Null),
        );
        q
    }

    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn returning<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn push(&mut self, fragment: &str) {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            return;
        }
        if !self.query.is_empty() {
            self.query.push('\n');
        }
        self.query.push_str(fragment);
    }
}
