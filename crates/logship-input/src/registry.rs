//! Plugin registry tree.
//!
//! A registry holds direct plugins plus child registries, letting a host
//! compose feature sets (builtin inputs, platform-specific inputs, modules)
//! without flattening them. Lookup and iteration follow one deterministic
//! order: direct plugins in insertion order, then each child registry
//! recursively in insertion order.

use std::collections::BTreeSet;

use crate::error::LoaderError;
use crate::plugin::Plugin;

/// A collection of input plugins, possibly nested.
#[derive(Default)]
pub struct Registry {
    plugins: Vec<Plugin>,
    subs: Vec<Registry>,
}

/// Anything that can be added to a registry: a plugin or a whole child
/// registry.
pub enum Addon {
    Plugin(Plugin),
    Registry(Registry),
}

impl From<Plugin> for Addon {
    fn from(plugin: Plugin) -> Self {
        Addon::Plugin(plugin)
    }
}

impl From<Registry> for Addon {
    fn from(registry: Registry) -> Self {
        Addon::Registry(registry)
    }
}

impl Registry {
    /// Create a registry from the given plugins and child registries.
    pub fn new(addons: impl IntoIterator<Item = Addon>) -> Self {
        let mut registry = Registry::default();
        for addon in addons {
            registry.add(addon);
        }
        registry
    }

    /// Add a plugin or child registry.
    ///
    /// Adding a plugin whose name already exists in this node replaces it in
    /// place. Duplicates elsewhere in the tree are not rejected; lookup
    /// returns the first match in traversal order.
    pub fn add(&mut self, addon: impl Into<Addon>) {
        match addon.into() {
            Addon::Plugin(plugin) => {
                match self.plugins.iter_mut().find(|p| p.name == plugin.name) {
                    Some(existing) => *existing = plugin,
                    None => self.plugins.push(plugin),
                }
            }
            Addon::Registry(registry) => self.subs.push(registry),
        }
    }

    /// Find the first plugin matching `name` in traversal order.
    pub fn find(&self, name: &str) -> Result<&Plugin, LoaderError> {
        self.find_opt(name).ok_or_else(|| LoaderError::unknown(name))
    }

    fn find_opt(&self, name: &str) -> Option<&Plugin> {
        // Find and each must traverse in the same order: direct plugins
        // first, followed by sub-registries.
        if let Some(plugin) = self.plugins.iter().find(|p| p.name == name) {
            return Some(plugin);
        }
        self.subs.iter().find_map(|sub| sub.find_opt(name))
    }

    /// Iterate all reachable plugins in the same order as `find`. Iteration
    /// stops when `f` returns false.
    pub fn each(&self, mut f: impl FnMut(&Plugin) -> bool) {
        self.each_inner(&mut f);
    }

    fn each_inner(&self, f: &mut impl FnMut(&Plugin) -> bool) -> bool {
        for plugin in &self.plugins {
            if !f(plugin) {
                return false;
            }
        }
        for sub in &self.subs {
            if !sub.each_inner(f) {
                return false;
            }
        }
        true
    }

    /// Sorted, de-duplicated names of all reachable plugins.
    pub fn names(&self) -> Vec<String> {
        let mut names = BTreeSet::new();
        self.each(|plugin| {
            names.insert(plugin.name.clone());
            true
        });
        names.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::is_unknown_input;
    use crate::plugin::{InputManager, Mode, Stability};
    use crate::input::Input;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    struct FailManager;

    #[async_trait]
    impl InputManager for FailManager {
        async fn init(&self, _cancel: &CancellationToken, _mode: Mode) -> crate::Result<()> {
            Ok(())
        }
        fn create(&self, _config: &Value) -> crate::Result<Box<dyn Input>> {
            Err(crate::InputError::Runtime("not constructible".to_string()))
        }
    }

    fn plugin(name: &str, info: &str) -> Plugin {
        Plugin {
            name: name.to_string(),
            stability: Stability::Stable,
            deprecated: false,
            info: info.to_string(),
            doc: String::new(),
            manager: Arc::new(FailManager),
        }
    }

    // ---------------------------------------------------------------
    // Find
    // ---------------------------------------------------------------

    #[test]
    fn test_find_direct_plugin() {
        let registry = Registry::new([plugin("log", "a").into()]);
        assert_eq!(registry.find("log").unwrap().info, "a");
    }

    #[test]
    fn test_find_in_sub_registry() {
        let sub = Registry::new([plugin("journal", "j").into()]);
        let registry = Registry::new([plugin("log", "l").into(), sub.into()]);
        assert_eq!(registry.find("journal").unwrap().info, "j");
    }

    #[test]
    fn test_find_miss_is_unknown_input() {
        let registry = Registry::default();
        let err = registry.find("nope").unwrap_err();
        assert_eq!(err.name, "nope");
        assert!(is_unknown_input(&err));
    }

    #[test]
    fn test_direct_plugin_shadows_sub_registry() {
        let sub = Registry::new([plugin("log", "from-sub").into()]);
        let registry = Registry::new([sub.into(), plugin("log", "direct").into()]);
        // Direct plugins win even when the sub was added first.
        assert_eq!(registry.find("log").unwrap().info, "direct");
    }

    #[test]
    fn test_first_sub_wins_on_duplicate() {
        let first = Registry::new([plugin("log", "first").into()]);
        let second = Registry::new([plugin("log", "second").into()]);
        let registry = Registry::new([first.into(), second.into()]);
        assert_eq!(registry.find("log").unwrap().info, "first");
    }

    #[test]
    fn test_add_same_name_replaces_in_node() {
        let mut registry = Registry::default();
        registry.add(plugin("log", "old"));
        registry.add(plugin("log", "new"));
        assert_eq!(registry.find("log").unwrap().info, "new");

        let mut count = 0;
        registry.each(|_| {
            count += 1;
            true
        });
        assert_eq!(count, 1);
    }

    // ---------------------------------------------------------------
    // Each and Names
    // ---------------------------------------------------------------

    #[test]
    fn test_each_order_matches_find() {
        let sub = Registry::new([plugin("c", "").into()]);
        let registry = Registry::new([plugin("a", "").into(), sub.into(), plugin("b", "").into()]);

        let mut order = Vec::new();
        registry.each(|p| {
            order.push(p.name.clone());
            true
        });
        // Direct plugins in insertion order, then sub-registries.
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_each_early_stop() {
        let registry = Registry::new([plugin("a", "").into(), plugin("b", "").into()]);
        let mut seen = Vec::new();
        registry.each(|p| {
            seen.push(p.name.clone());
            false
        });
        assert_eq!(seen, vec!["a"]);
    }

    #[test]
    fn test_names_sorted_and_deduplicated() {
        let sub = Registry::new([plugin("log", "").into(), plugin("apache", "").into()]);
        let registry = Registry::new([plugin("log", "").into(), sub.into()]);
        assert_eq!(registry.names(), vec!["apache", "log"]);
    }

    #[test]
    fn test_names_empty() {
        assert!(Registry::default().names().is_empty());
    }
}
