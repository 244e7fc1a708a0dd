//! Generic per-entity Cypher fragments
//!
//! One [`CypherBuilder`] serves every entity type. Variable names are part
//! of the contract between fragments: the entity is bound as its model name
//! (`employee`), the tenant as `company`, the acting user as `currentUser`,
//! and each relationship as `<entity>_<key>`.

use crate::auth::TenantContext;
use crate::model::{Cardinality, Direction, EntityModel, Ownership};

pub const TENANT_VAR: &str = "company";
pub const TENANT_LABEL: &str = "Company";
pub const USER_VAR: &str = "currentUser";
pub const USER_LABEL: &str = "User";

const DEFAULT_ORDER: (&str, SortDirection) = ("updatedAt", SortDirection::Desc);

/// A property name that is safe to interpolate into query text.
///
/// Property names cannot be parameterised in Cypher, so only `id` and the
/// model's literal attributes are accepted. Values always go through
/// `$searchValue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchField(&'static str);

impl SearchField {
    pub fn id() -> Self {
        Self("id")
    }

    pub fn for_model(model: &EntityModel, name: &str) -> Option<Self> {
        if name == "id" {
            return Some(Self::id());
        }
        model.writable_property(name).map(Self)
    }

    pub fn property(&self) -> &'static str {
        self.0
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultOptions {
    pub search_field: Option<SearchField>,
    /// Keep tenant and user variables out of scope (existence checks)
    pub block_company_and_user: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    fn as_cypher(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

pub struct CypherBuilder<'a> {
    model: &'a EntityModel,
}

impl<'a> CypherBuilder<'a> {
    pub fn new(model: &'a EntityModel) -> Self {
        Self { model }
    }

    fn var(&self) -> &'static str {
        self.model.descriptor.name
    }

    /// A node is visible when no tenant is active or it is owned by the tenant
    pub fn tenant_predicate(&self) -> String {
        ownership_predicate(self.var(), self.model.ownership)
    }

    /// Variables carried between fragments for this context
    fn bindings(&self, ctx: &TenantContext, blocked: bool) -> Vec<&'static str> {
        let mut vars = vec![self.var()];
        if !blocked {
            if ctx.company_id.is_some() && self.model.ownership != Ownership::Tenant {
                vars.push(TENANT_VAR);
            }
            if ctx.user_id.is_some() {
                vars.push(USER_VAR);
            }
        }
        vars
    }

    fn bind_company_and_user(&self, ctx: &TenantContext, blocked: bool) -> String {
        if blocked {
            return String::new();
        }
        let mut fragment = String::new();
        if ctx.company_id.is_some() && self.model.ownership != Ownership::Tenant {
            fragment.push_str(&format!(
                "MATCH ({}:{} {{id: $companyId}})\n",
                TENANT_VAR, TENANT_LABEL
            ));
        }
        if ctx.user_id.is_some() {
            fragment.push_str(&format!(
                "OPTIONAL MATCH ({}:{} {{id: $userId}})\n",
                USER_VAR, USER_LABEL
            ));
        }
        fragment
    }

    /// `MATCH` the entity under the tenant predicate and re-bind it with the
    /// tenant and user variables
    pub fn default(&self, ctx: &TenantContext, options: DefaultOptions) -> String {
        let filter = options
            .search_field
            .map(|field| format!(" {{{}: $searchValue}}", field.property()))
            .unwrap_or_default();

        format!(
            "MATCH ({var}:{label}{filter})\nWHERE {predicate}\n{bind}WITH {with}",
            var = self.var(),
            label = self.model.label(),
            filter = filter,
            predicate = self.tenant_predicate(),
            bind = self.bind_company_and_user(ctx, options.block_company_and_user),
            with = self
                .bindings(ctx, options.block_company_and_user)
                .join(", "),
        )
    }

    /// Re-bind the entity plus whichever of tenant and user are in context
    pub fn user_has_access(&self, ctx: &TenantContext) -> String {
        format!("WITH {}", self.bindings(ctx, false).join(", "))
    }

    /// Full-text search scoped by the same tenant predicate as `default`.
    /// Returns `None` for models without a search index.
    pub fn full_text(&self, ctx: &TenantContext) -> Option<String> {
        let search = self.model.search.as_ref()?;
        let mut with = self.bindings(ctx, false);
        with.insert(1, "score");

        Some(format!(
            "CALL db.index.fulltext.queryNodes('{index}', $term) YIELD node, score\n\
             WITH node AS {var}, score\n\
             WHERE {var}:{label} AND ({predicate})\n\
             {bind}WITH {with}",
            index = search.index,
            var = self.var(),
            label = self.model.label(),
            predicate = self.tenant_predicate(),
            bind = self.bind_company_and_user(ctx, false),
            with = with.join(", "),
        ))
    }

    /// `ORDER BY` for a caller-supplied sort, restricted to sortable
    /// properties; anything else falls back to `updatedAt DESC`
    pub fn order_by(&self, requested: Option<&str>) -> String {
        let (property, direction) = requested
            .and_then(|raw| parse_sort(raw))
            .filter(|(property, _)| self.model.sortable.iter().any(|s| s == property))
            .map(|(property, direction)| (property.to_string(), direction))
            .unwrap_or_else(|| (DEFAULT_ORDER.0.to_string(), DEFAULT_ORDER.1));

        format!(
            "ORDER BY {}.{} {}",
            self.var(),
            property,
            direction.as_cypher()
        )
    }

    /// Fetch every declared relationship alongside the entity, one row per
    /// entity, then `RETURN` all columns
    pub fn return_statement(&self) -> String {
        let var = self.var();
        let mut fragment = String::new();

        for spec in &self.model.relationships {
            let column = self.model.relationship_column(spec);
            let label = spec
                .target_label()
                .map(|l| format!(":{}", l))
                .unwrap_or_default();
            let pattern = match spec.direction {
                Direction::Outgoing => format!("({})-[:{}]->(related{})", var, spec.edge, label),
                Direction::Incoming => format!("({})<-[:{}]-(related{})", var, spec.edge, label),
            };
            let projection = match spec.cardinality {
                Cardinality::One => format!("RETURN related AS {}\n  LIMIT 1", column),
                Cardinality::Many => format!("RETURN collect(DISTINCT related) AS {}", column),
            };
            fragment.push_str(&format!(
                "CALL {{\n  WITH {}\n  OPTIONAL MATCH {}\n  {}\n}}\n",
                var, pattern, projection
            ));
        }

        fragment.push_str(&format!("RETURN {}", self.model.columns().join(", ")));
        fragment
    }
}

/// Tenant visibility predicate for a bound variable
pub fn ownership_predicate(var: &str, ownership: Ownership) -> String {
    match ownership {
        Ownership::Edge(edge) => format!(
            "$companyId IS NULL OR EXISTS {{ MATCH ({})-[:{}]->(:{} {{id: $companyId}}) }}",
            var, edge, TENANT_LABEL
        ),
        Ownership::Tenant => format!("$companyId IS NULL OR {}.id = $companyId", var),
    }
}

/// Accepts `name`, `-name`, `name ASC` and `name DESC`
fn parse_sort(raw: &str) -> Option<(&str, SortDirection)> {
    let raw = raw.trim();
    if let Some(property) = raw.strip_prefix('-') {
        return Some((property.trim(), SortDirection::Desc));
    }
    let mut parts = raw.split_whitespace();
    let property = parts.next()?;
    let direction = match parts.next().map(str::to_ascii_uppercase).as_deref() {
        None | Some("ASC") => SortDirection::Asc,
        Some("DESC") => SortDirection::Desc,
        Some(_) => return None,
    };
    if parts.next().is_some() {
        return None;
    }
    Some((property, direction))
}
