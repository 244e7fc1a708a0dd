//! Model registry
//!
//! Boot happens in two phases: every feature registers its models on a
//! [`ModelRegistryBuilder`], then `freeze()` produces the read-only
//! [`ModelRegistry`] shared with the request path.

use super::descriptor::EntityModel;
use crate::error::{CoreError, CoreResult};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct ModelRegistryBuilder {
    by_name: HashMap<String, Arc<EntityModel>>,
    by_label: HashMap<String, Arc<EntityModel>>,
    by_type: HashMap<String, Arc<EntityModel>>,
    by_endpoint: HashMap<String, Arc<EntityModel>>,
}

impl ModelRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model under its name, label, type and endpoint.
    ///
    /// Registering the same internal name again replaces the earlier model.
    /// A label, type or endpoint already owned by a different model is a
    /// conflict.
    pub fn register(&mut self, model: EntityModel) -> CoreResult<()> {
        let name = model.descriptor.name.to_string();
        let keys = [
            ("label", model.descriptor.label.to_lowercase(), &self.by_label),
            ("type", model.descriptor.api_type.to_lowercase(), &self.by_type),
            ("endpoint", model.descriptor.endpoint.to_string(), &self.by_endpoint),
        ];
        for (kind, key, index) in keys {
            if let Some(existing) = index.get(&key) {
                if existing.descriptor.name != name {
                    return Err(CoreError::RegistryConflict(format!(
                        "{} '{}' of '{}' is already registered by '{}'",
                        kind, key, name, existing.descriptor.name
                    )));
                }
            }
        }

        if let Some(previous) = self.by_name.remove(&name) {
            self.by_label.remove(&previous.descriptor.label.to_lowercase());
            self.by_type.remove(&previous.descriptor.api_type.to_lowercase());
            self.by_endpoint.remove(previous.descriptor.endpoint);
        }

        let model = Arc::new(model);
        self.by_label
            .insert(model.descriptor.label.to_lowercase(), model.clone());
        self.by_type
            .insert(model.descriptor.api_type.to_lowercase(), model.clone());
        self.by_endpoint
            .insert(model.descriptor.endpoint.to_string(), model.clone());
        self.by_name.insert(name, model);
        Ok(())
    }

    pub fn freeze(self) -> ModelRegistry {
        tracing::info!("Model registry frozen with {} models", self.by_name.len());
        ModelRegistry {
            by_name: self.by_name,
            by_label: self.by_label,
            by_type: self.by_type,
            by_endpoint: self.by_endpoint,
        }
    }
}

/// Read-only lookup of entity models
#[derive(Debug)]
pub struct ModelRegistry {
    by_name: HashMap<String, Arc<EntityModel>>,
    by_label: HashMap<String, Arc<EntityModel>>,
    by_type: HashMap<String, Arc<EntityModel>>,
    by_endpoint: HashMap<String, Arc<EntityModel>>,
}

impl ModelRegistry {
    /// Resolve by internal name, then label, then API type.
    ///
    /// Older call sites pass internal names and newer ones pass API types,
    /// so the precedence must stay in this order.
    pub fn resolve_model(&self, identifier: &str) -> Option<Arc<EntityModel>> {
        if let Some(model) = self.by_name.get(identifier) {
            return Some(model.clone());
        }
        let lowered = identifier.to_lowercase();
        self.by_label
            .get(&lowered)
            .or_else(|| self.by_type.get(&lowered))
            .cloned()
    }

    pub fn by_endpoint(&self, endpoint: &str) -> Option<Arc<EntityModel>> {
        self.by_endpoint.get(endpoint).cloned()
    }

    pub fn models(&self) -> impl Iterator<Item = &Arc<EntityModel>> {
        self.by_name.values()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
