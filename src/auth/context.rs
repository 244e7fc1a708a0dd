//! Per-request tenant/identity context consumed by the query builders

/// Who is asking, as far as the query layer cares.
///
/// `company_id == None` means global mode: tenant predicates pass every node.
/// Used by admin requests and background jobs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TenantContext {
    pub company_id: Option<String>,
    pub user_id: Option<String>,
}

impl TenantContext {
    /// Global context with no tenant and no acting user
    pub fn system() -> Self {
        Self::default()
    }

    pub fn tenant(company_id: &str, user_id: Option<&str>) -> Self {
        Self {
            company_id: Some(company_id.to_string()),
            user_id: user_id.map(str::to_string),
        }
    }

    pub fn is_global(&self) -> bool {
        self.company_id.is_none()
    }
}
