//! Authentication and tenant scoping
//!
//! - `jwt`: HS256 token verification (claims carry user, company and admin flag)
//! - `middleware`: `require_auth`, turning a bearer token into a [`TenantContext`]
//! - `extractor`: hands the [`TenantContext`] to handlers

pub mod context;
pub mod extractor;
pub mod jwt;
pub mod middleware;

pub use context::TenantContext;
