//! Process-wide plugin registry, mapping a storage-family tag to a
//! factory that produces a fresh, uninitialized plugin. The family set is
//! open-ended, so lookup is data-driven through explicit registration
//! rather than a fixed `match` arm per family.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::{Plugin, PluginError};

/// Produces a fresh, uninitialized plugin instance for one family.
pub type PluginFactory = Arc<dyn Fn() -> Arc<dyn Plugin> + Send + Sync>;

/// A process-wide mapping `storage-family-tag -> plugin factory`.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    factories: Arc<RwLock<HashMap<String, PluginFactory>>>,
}

impl PluginRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for `family`. Replaces any existing factory for
    /// the same tag.
    pub fn register(&self, family: impl Into<String>, factory: PluginFactory) {
        let mut factories = self
            .factories
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        factories.insert(family.into(), factory);
    }

    /// Instantiate an empty plugin for `family`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Unsupported`] if no factory is registered
    /// for `family`.
    pub fn create(&self, family: &str) -> Result<Arc<dyn Plugin>, PluginError> {
        let factories = self
            .factories
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let factory = factories
            .get(family)
            .ok_or_else(|| PluginError::Unsupported {
                family: family.to_owned(),
                operation: "registry lookup".to_owned(),
            })?;
        Ok(factory())
    }

    /// Whether `family` has a registered factory.
    #[must_use]
    pub fn contains(&self, family: &str) -> bool {
        let factories = self
            .factories
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        factories.contains_key(family)
    }

    /// All registered family tags.
    #[must_use]
    pub fn families(&self) -> Vec<String> {
        let factories = self
            .factories
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        factories.keys().cloned().collect()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mock::MockPlugin;

    #[test]
    fn unregistered_family_is_unsupported() {
        let registry = PluginRegistry::new();
        let err = match registry.create("no-such-family") {
            Err(e) => e,
            Ok(_) => panic!("expected create to fail for an unregistered family"),
        };
        assert!(matches!(err, PluginError::Unsupported { .. }));
    }

    #[test]
    fn register_then_create_round_trips() {
        let registry = PluginRegistry::new();
        registry.register("mock", Arc::new(|| Arc::new(MockPlugin::new("mock")) as Arc<dyn Plugin>));
        assert!(registry.contains("mock"));
        let plugin = registry.create("mock");
        assert!(plugin.is_ok());
    }
}
