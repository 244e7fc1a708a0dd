//! JSON:API request parsing and response shaping

pub mod document;
pub mod paginator;
pub mod serialiser;

pub use document::{
    Document, Links, PrimaryData, Relationship, RelationshipData, ResourceIdentifier,
    ResourceLinks, ResourceObject, WriteDocument, WriteResource,
};
pub use paginator::{Cursor, JsonApiPaginator, PaginationState, DEFAULT_PAGE_SIZE};
pub use serialiser::JsonApiSerialiser;
