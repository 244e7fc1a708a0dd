//! Entity models and the registry that indexes them

pub mod descriptor;
pub mod registry;

pub use descriptor::{
    AsyncResolver, Attribute, Cardinality, Direction, Discriminator, EntityDescriptor,
    EntityModel, Ownership, RelationshipSpec, RelationshipTarget, SearchSpec, SyncResolver,
    OWNERSHIP_EDGE,
};
pub use registry::{ModelRegistry, ModelRegistryBuilder};
