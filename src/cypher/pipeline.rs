//! Ordered assembly of query fragments
//!
//! Fragments reference variables bound by earlier ones, so the slots are
//! always emitted as scope → access → order → pagination → return.

use crate::auth::TenantContext;
use crate::jsonapi::Cursor;
use crate::neo4j::QueryObject;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct QueryPipeline {
    query: QueryObject,
    scope: String,
    access: Option<String>,
    order: Option<String>,
    pagination: Option<Cursor>,
    returning: Option<String>,
}

impl QueryPipeline {
    /// Start with the `MATCH ... WITH` fragment that binds the entity.
    /// `$companyId` and `$userId` are pre-seeded from `ctx`.
    pub fn new(ctx: &TenantContext, scope: String) -> Self {
        Self {
            query: QueryObject::scoped(ctx),
            scope,
            access: None,
            order: None,
            pagination: None,
            returning: None,
        }
    }

    pub fn access(mut self, fragment: String) -> Self {
        self.access = Some(fragment);
        self
    }

    pub fn order(mut self, fragment: String) -> Self {
        self.order = Some(fragment);
        self
    }

    /// Page through the result; `None` (fetch-all) leaves the slot empty
    pub fn paginate(mut self, cursor: Option<Cursor>) -> Self {
        self.pagination = cursor;
        self
    }

    pub fn returning(mut self, fragment: String, columns: Vec<String>) -> Self {
        self.returning = Some(fragment);
        self.query.columns = columns;
        self
    }

    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.query.params.insert(key.to_string(), value.into());
        self
    }

    pub fn assemble(self) -> QueryObject {
        let mut query = self.query;
        query.push(&self.scope);
        if let Some(access) = &self.access {
            query.push(access);
        }
        if let Some(order) = &self.order {
            query.push(order);
        }
        if let Some(cursor) = &self.pagination {
            query.push("SKIP $cursorOffset LIMIT $cursorTake");
            query
                .params
                .insert("cursorOffset".to_string(), Value::from(cursor.offset as u64));
            query
                .params
                .insert("cursorTake".to_string(), Value::from(cursor.take as u64));
        }
        if let Some(returning) = &self.returning {
            query.push(returning);
        }
        query
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor() -> Cursor {
        Cursor {
            offset: 50,
            take: 26,
            forced_next: None,
        }
    }

    #[test]
    fn test_slots_are_emitted_in_fixed_order() {
        let q = QueryPipeline::new(&TenantContext::system(), "MATCH (n:Employee)\nWITH n".into())
            .returning("RETURN n".into(), vec!["n".into()])
            .paginate(Some(cursor()))
            .order("ORDER BY n.updatedAt DESC".into())
            .access("WITH n".into())
            .assemble();

        assert_eq!(
            q.query,
            "MATCH (n:Employee)\nWITH n\nWITH n\nORDER BY n.updatedAt DESC\nSKIP $cursorOffset LIMIT $cursorTake\nRETURN n"
        );
        assert_eq!(q.params["cursorOffset"], Value::from(50u64));
        assert_eq!(q.params["cursorTake"], Value::from(26u64));
        assert_eq!(q.columns, vec!["n"]);
    }

    #[test]
    fn test_fetch_all_has_no_pagination_clause() {
        let q = QueryPipeline::new(&TenantContext::system(), "MATCH (n)\nWITH n".into())
            .paginate(None)
            .returning("RETURN n".into(), vec!["n".into()])
            .assemble();
        assert!(!q.query.contains("SKIP"));
        assert!(!q.params.contains_key("cursorTake"));
    }

    #[test]
    fn test_pagination_clause_appears_once() {
        let q = QueryPipeline::new(&TenantContext::system(), "MATCH (n)\nWITH n".into())
            .paginate(Some(cursor()))
            .paginate(Some(cursor()))
            .assemble();
        assert_eq!(q.query.matches("SKIP").count(), 1);
    }
}
