// Explicit registry of executor plugins

use crate::executor::config::PluginOptions;
use crate::executor::error::{ExecutorError, Result};
use crate::executor::plugin::Executor;
use crate::executor::types::ExecutionConstraints;
use crate::transport::FunctionRegistry;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

/// What a plugin receives from the host when it is loaded
#[derive(Debug, Clone, Default)]
pub struct LoadContext {
    /// Functions available to tasks run by the plugin
    pub environment: Arc<FunctionRegistry>,
    pub constraints: ExecutionConstraints,
}

/// Builds a plugin instance from its options
pub type PluginFactory = fn(PluginOptions, LoadContext) -> Result<Arc<dyn Executor>>;

/// Plugins known to the host, by name
#[derive(Default)]
pub struct PluginRegistry {
    factories: RwLock<HashMap<String, PluginFactory>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the plugins shipped in this crate
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        crate::executor::custom::register(&registry);
        info!(plugins = ?registry.names(), "plugin registry initialized");
        registry
    }

    pub fn register(&self, name: impl Into<String>, factory: PluginFactory) {
        let name = name.into();
        debug!(plugin = %name, "registering executor plugin");
        self.factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, factory);
    }

    /// Registered plugin names, sorted
    pub fn names(&self) -> Vec<String> {
        let factories = self.factories.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Construct a plugin by name
    pub fn load(
        &self,
        name: &str,
        options: PluginOptions,
        context: LoadContext,
    ) -> Result<Arc<dyn Executor>> {
        let factory = {
            let factories = self.factories.read().unwrap_or_else(PoisonError::into_inner);
            factories.get(name).copied()
        };

        let factory = factory.ok_or_else(|| ExecutorError::UnknownPlugin(name.to_string()))?;

        info!(plugin = %name, option_count = options.len(), "loading executor plugin");
        factory(options, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::custom::{EXECUTOR_PLUGIN_NAME, plugin_defaults};

    #[test]
    fn test_builtin_registers_only_the_plugin() {
        let registry = PluginRegistry::with_builtin();
        assert_eq!(registry.names(), vec![EXECUTOR_PLUGIN_NAME.to_string()]);
    }

    #[test]
    fn test_load_builtin() {
        let registry = PluginRegistry::with_builtin();
        let executor = registry
            .load(EXECUTOR_PLUGIN_NAME, plugin_defaults(), LoadContext::default())
            .unwrap();
        assert_eq!(executor.name(), EXECUTOR_PLUGIN_NAME);
    }

    #[test]
    fn test_load_unknown_plugin() {
        let registry = PluginRegistry::with_builtin();
        let result = registry.load("ExternalObject", PluginOptions::new(), LoadContext::default());
        assert!(matches!(
            result,
            Err(ExecutorError::UnknownPlugin(ref n)) if n == "ExternalObject"
        ));
    }
}
