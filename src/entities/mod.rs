//! The asset-tracking entity catalogue
//!
//! Every business type is a declarative [`EntityModel`]; the repository,
//! serialiser and HTTP surface are generic over them.

use crate::error::CoreResult;
use crate::model::{
    Attribute, Discriminator, EntityDescriptor, EntityModel, ModelRegistryBuilder,
    RelationshipSpec, OWNERSHIP_EDGE,
};
use crate::neo4j::GraphNode;
use crate::storage::UrlSigner;
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;

pub static COMPANY: EntityDescriptor = EntityDescriptor {
    name: "company",
    label: "Company",
    api_type: "companies",
    endpoint: "companies",
};

pub static USER: EntityDescriptor = EntityDescriptor {
    name: "user",
    label: "User",
    api_type: "users",
    endpoint: "users",
};

pub static ROLE: EntityDescriptor = EntityDescriptor {
    name: "role",
    label: "Role",
    api_type: "roles",
    endpoint: "roles",
};

pub static EMPLOYEE: EntityDescriptor = EntityDescriptor {
    name: "employee",
    label: "Employee",
    api_type: "employees",
    endpoint: "employees",
};

pub static EQUIPMENT: EntityDescriptor = EntityDescriptor {
    name: "equipment",
    label: "Equipment",
    api_type: "equipment",
    endpoint: "equipment",
};

pub static SUPPLIER: EntityDescriptor = EntityDescriptor {
    name: "supplier",
    label: "Supplier",
    api_type: "suppliers",
    endpoint: "suppliers",
};

pub static LOAN: EntityDescriptor = EntityDescriptor {
    name: "loan",
    label: "Loan",
    api_type: "loans",
    endpoint: "loans",
};

pub static NOTIFICATION: EntityDescriptor = EntityDescriptor {
    name: "notification",
    label: "Notification",
    api_type: "notifications",
    endpoint: "notifications",
};

/// Attribute holding a URL for the object key stored in `property`
fn signed_url(property: &'static str, is_public: bool, signer: Arc<dyn UrlSigner>) -> Attribute {
    Attribute::AsyncComputed(Arc::new(
        move |node: GraphNode| -> BoxFuture<'static, CoreResult<Value>> {
            let signer = signer.clone();
            Box::pin(async move {
                match node.get_str(property).filter(|key| !key.is_empty()) {
                    Some(key) => signer.sign(key, is_public).await.map(Value::String),
                    None => Ok(Value::Null),
                }
            })
        },
    ))
}

fn company_link() -> RelationshipSpec {
    RelationshipSpec::one("company", OWNERSHIP_EDGE, &COMPANY)
}

fn company(signer: Arc<dyn UrlSigner>) -> EntityModel {
    EntityModel::new(COMPANY)
        .tenant_root()
        .literals(&["name", "address", "vatNumber"])
        .attribute("logo", signed_url("logoKey", true, signer))
        .searchable(&["name"])
        .sortable(&["name"])
}

fn user(signer: Arc<dyn UrlSigner>) -> EntityModel {
    EntityModel::new(USER)
        .literals(&["name", "email", "title"])
        .attribute("avatar", signed_url("avatarKey", false, signer))
        .relationship(company_link())
        .relationship(RelationshipSpec::many("roles", "HAS_ROLE", &ROLE))
        .searchable(&["name", "email"])
        .sortable(&["name", "email"])
}

fn role() -> EntityModel {
    EntityModel::new(ROLE)
        .literals(&["name", "description"])
        .relationship(company_link())
        .sortable(&["name"])
}

fn employee(signer: Arc<dyn UrlSigner>) -> EntityModel {
    EntityModel::new(EMPLOYEE)
        .literals(&["name", "email", "phone", "position"])
        .attribute("avatar", signed_url("avatarKey", false, signer))
        .relationship(company_link())
        .relationship(RelationshipSpec::many("roles", "HAS_ROLE", &ROLE))
        .relationship(RelationshipSpec::many("loans", "LOANED_TO", &LOAN).incoming())
        .searchable(&["name", "email"])
        .sortable(&["name", "email"])
}

fn supplier() -> EntityModel {
    EntityModel::new(SUPPLIER)
        .literals(&["name", "email", "phone", "address"])
        .relationship(company_link())
        .searchable(&["name"])
        .sortable(&["name"])
}

fn equipment(signer: Arc<dyn UrlSigner>) -> EntityModel {
    EntityModel::new(EQUIPMENT)
        .literals(&["name", "serialNumber", "status", "purchaseDate"])
        .attribute(
            "available",
            Attribute::Computed(|node| Value::Bool(node.get_str("status") == Some("available"))),
        )
        .attribute("invoice", signed_url("invoiceKey", false, signer))
        .relationship(company_link())
        .relationship(RelationshipSpec::one("supplier", "SUPPLIED_BY", &SUPPLIER))
        .relationship(RelationshipSpec::many("loans", "LOANS", &LOAN).incoming())
        .searchable(&["name", "serialNumber"])
        .sortable(&["name", "status", "purchaseDate"])
}

fn loan() -> EntityModel {
    EntityModel::new(LOAN)
        .literals(&["startDate", "dueDate", "returnedAt", "notes"])
        .attribute(
            "active",
            Attribute::Computed(|node| {
                Value::Bool(node.get("returnedAt").map_or(true, Value::is_null))
            }),
        )
        .relationship(company_link())
        .relationship(RelationshipSpec::one("equipment", "LOANS", &EQUIPMENT))
        .relationship(RelationshipSpec::one("employee", "LOANED_TO", &EMPLOYEE))
        .sortable(&["startDate", "dueDate"])
}

fn notification() -> EntityModel {
    EntityModel::new(NOTIFICATION)
        .literals(&["title", "message", "readAt"])
        .relationship(company_link())
        .relationship(RelationshipSpec::one("recipient", "ADDRESSED_TO", &USER))
        .relationship(RelationshipSpec::dynamic("subject", "ABOUT", Discriminator::Label))
}

/// Register the whole catalogue
pub fn register_all(builder: &mut ModelRegistryBuilder, signer: Arc<dyn UrlSigner>) -> CoreResult<()> {
    builder.register(company(signer.clone()))?;
    builder.register(user(signer.clone()))?;
    builder.register(role())?;
    builder.register(employee(signer.clone()))?;
    builder.register(supplier())?;
    builder.register(equipment(signer))?;
    builder.register(loan())?;
    builder.register(notification())?;
    Ok(())
}
