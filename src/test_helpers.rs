//! Test helper factories and mock state builders
//!
//! Provides a registry built from the real entity catalogue, row factories
//! with sensible defaults, a two-tenant in-memory graph and helpers for
//! building mock `ServerState` instances.
#![allow(dead_code)]

use crate::api::handlers::{ApiState, ServerState};
use crate::auth::jwt::encode_jwt;
use crate::cypher::CypherBuilder;
use crate::entities::register_all;
use crate::error::CoreResult;
use crate::model::{ModelRegistry, ModelRegistryBuilder};
use crate::neo4j::mock::MockExecutor;
use crate::neo4j::{GraphNode, QueryExecutor, Record, RecordValue};
use crate::service::ResourceService;
use crate::storage::UrlSigner;
use crate::AuthConfig;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const TEST_SECRET: &str = "test-secret-key-minimum-32-chars!!";
pub const TIMESTAMP: &str = "2025-01-01T00:00:00+00:00";

// ============================================================================
// Registry
// ============================================================================

/// Deterministic signer: `https://files.test/{key}`, suffixed `?signed`
/// for private keys
pub struct StaticSigner;

#[async_trait]
impl UrlSigner for StaticSigner {
    async fn sign(&self, key: &str, is_public: bool) -> CoreResult<String> {
        if is_public {
            Ok(format!("https://files.test/{}", key))
        } else {
            Ok(format!("https://files.test/{}?signed", key))
        }
    }
}

/// Frozen registry holding the full entity catalogue
pub fn test_registry() -> Arc<ModelRegistry> {
    let mut builder = ModelRegistryBuilder::new();
    register_all(&mut builder, Arc::new(StaticSigner)).expect("catalogue registers");
    Arc::new(builder.freeze())
}

// ============================================================================
// Row factories
// ============================================================================

pub fn company_node(id: &str) -> GraphNode {
    GraphNode::new(["Company"])
        .with("id", id)
        .with("name", format!("Company {}", id))
        .with("createdAt", TIMESTAMP)
        .with("updatedAt", TIMESTAMP)
}

pub fn role_node(id: &str) -> GraphNode {
    GraphNode::new(["Role"])
        .with("id", id)
        .with("name", format!("Role {}", id))
        .with("description", "")
}

/// An employee row as returned by the repository: the entity plus its
/// eagerly loaded company, roles and (empty) loans
pub fn employee_record(id: &str, company: &str, roles: &[&str]) -> Record {
    let employee = GraphNode::new(["Employee"])
        .with("id", id)
        .with("name", format!("Employee {}", id))
        .with("email", format!("{}@example.com", id))
        .with("avatarKey", format!("avatars/{}.png", id))
        .with("createdAt", TIMESTAMP)
        .with("updatedAt", TIMESTAMP);

    Record::new()
        .with_node("employee", employee)
        .with_node("employee_company", company_node(company))
        .with(
            "employee_roles",
            RecordValue::Nodes(roles.iter().map(|r| role_node(r)).collect()),
        )
        .with("employee_loans", RecordValue::Nodes(Vec::new()))
}

/// In-memory graph with two tenants, `company-A` and `company-B`.
///
/// Every model has one node per tenant, `{name}-A` and `{name}-B`; the
/// company model's nodes are the tenants themselves. Queries starting with
/// `MATCH ({name}:{Label}`, and full-text queries binding `node AS {name}`,
/// are answered with the nodes matching `$searchValue` when bound. Rows are
/// narrowed to `$companyId` only when the query text carries the model's
/// tenant predicate, the way the graph itself would behave.
pub fn tenant_graph() -> MockExecutor {
    let registry = test_registry();
    MockExecutor::with_handler(move |q| {
        let Some(model) = registry.models().find(|m| {
            q.query
                .starts_with(&format!("MATCH ({}:{}", m.name(), m.label()))
                || (q.query.starts_with("CALL db.index.fulltext.queryNodes")
                    && q.query.contains(&format!("WITH node AS {},", m.name())))
        }) else {
            return Ok(Vec::new());
        };

        let scoped = q
            .query
            .contains(&CypherBuilder::new(model).tenant_predicate());
        let company = q
            .params
            .get("companyId")
            .and_then(Value::as_str)
            .filter(|_| scoped);
        let search = q.params.get("searchValue").and_then(Value::as_str);
        let visible: Vec<String> = ["A", "B"]
            .iter()
            .filter(|tenant| company.map_or(true, |c| c == format!("company-{}", tenant)))
            .map(|tenant| format!("{}-{}", model.name(), tenant))
            .filter(|id| search.map_or(true, |s| s == id.as_str()))
            .collect();

        if q.columns.iter().any(|c| c == "deleted") {
            return Ok(vec![Record::new().with_scalar("deleted", visible.len() as i64)]);
        }
        if q.columns == ["id"] {
            return Ok(visible
                .into_iter()
                .map(|id| Record::new().with_scalar("id", id))
                .collect());
        }
        Ok(visible
            .into_iter()
            .map(|id| {
                Record::new().with_node(model.name(), GraphNode::new([model.label()]).with("id", id))
            })
            .collect())
    })
}

// ============================================================================
// Auth
// ============================================================================

pub fn test_auth_config() -> AuthConfig {
    AuthConfig {
        jwt_secret: TEST_SECRET.to_string(),
    }
}

/// `Authorization` header value for a fresh token
pub fn bearer(company_id: Option<&str>, admin: bool) -> String {
    let token = encode_jwt(Uuid::new_v4(), company_id, admin, TEST_SECRET, 3600)
        .expect("token encodes");
    format!("Bearer {}", token)
}

// ============================================================================
// Mock state builders
// ============================================================================

/// Server state over the given executor with the full catalogue
pub fn server_state(auth_config: Option<AuthConfig>, executor: MockExecutor) -> ServerState {
    let executor: Arc<dyn QueryExecutor> = Arc::new(executor);
    ServerState {
        service: ResourceService::new(test_registry(), executor.clone(), "https://api.test"),
        executor,
        auth_config,
        request_timeout: Duration::from_secs(5),
        cors_origins: Vec::new(),
    }
}

pub fn mock_server_state(auth_config: Option<AuthConfig>, executor: MockExecutor) -> ApiState {
    Arc::new(server_state(auth_config, executor))
}
