//! Plugin discovery, ordering and invocation.
//!
//! Plugins come from two sources, concatenated in this order: explicit
//! ones (added programmatically or loaded from JSON rule files) and the
//! bundled entry points in [`super::contrib::ENTRY_POINTS`]. Once
//! [`PluginRegistryBuilder::build`] returns, the set is frozen.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use tracing::{debug, info};

use crate::classify::claims::ClaimTable;
use crate::config::ConvertConfig;
use crate::errors::{OutgrowError, OutgrowResult};
use crate::graph::ReferenceGraph;
use crate::plugin::rules::{load_rule_file, parse_rules};
use crate::plugin::{contrib, Checkpoint, ConvertPlugin, HookContext};
use crate::program::ProgramModel;

pub struct PluginRegistryBuilder {
    explicit: Vec<Box<dyn ConvertPlugin>>,
    entry_points: bool,
    disabled: Vec<String>,
}

impl Default for PluginRegistryBuilder {
    fn default() -> Self {
        PluginRegistryBuilder {
            explicit: Vec::new(),
            entry_points: true,
            disabled: Vec::new(),
        }
    }
}

impl PluginRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder seeded from the plugin sources named in `config`.
    pub fn from_config(config: &ConvertConfig) -> OutgrowResult<Self> {
        let mut builder = Self::new();
        for path in &config.plugin_rules {
            builder = builder.rule_file(path)?;
        }
        for name in &config.disabled_plugins {
            builder = builder.disable(name.clone());
        }
        Ok(builder)
    }

    pub fn plugin(self, plugin: impl ConvertPlugin + 'static) -> Self {
        self.boxed(Box::new(plugin))
    }

    pub fn boxed(mut self, plugin: Box<dyn ConvertPlugin>) -> Self {
        self.explicit.push(plugin);
        self
    }

    /// Add every rule declared in a JSON rule file.
    pub fn rule_file(mut self, path: &Path) -> OutgrowResult<Self> {
        for rule in load_rule_file(path)? {
            self.explicit.push(Box::new(rule));
        }
        Ok(self)
    }

    pub fn rules_json(mut self, text: &str) -> OutgrowResult<Self> {
        for rule in parse_rules(text)? {
            self.explicit.push(Box::new(rule));
        }
        Ok(self)
    }

    /// Whether bundled entry points are discovered at all.
    pub fn entry_points(mut self, enabled: bool) -> Self {
        self.entry_points = enabled;
        self
    }

    pub fn disable(mut self, name: impl Into<String>) -> Self {
        self.disabled.push(name.into());
        self
    }

    pub fn build(self) -> PluginRegistry {
        let mut plugins = self.explicit;
        if self.entry_points {
            plugins.extend(contrib::ENTRY_POINTS.iter().map(|entry| (entry.load)()));
        }
        plugins.retain(|p| !self.disabled.iter().any(|d| d == p.name()));
        info!(
            plugins = plugins.len(),
            disabled = self.disabled.len(),
            "plugin registry built"
        );
        PluginRegistry { plugins }
    }
}

/// Frozen, ordered set of plugins.
pub struct PluginRegistry {
    plugins: Vec<Box<dyn ConvertPlugin>>,
}

impl PluginRegistry {
    /// Registry with no plugins at all, bundled ones included.
    pub fn empty() -> Self {
        PluginRegistry {
            plugins: Vec::new(),
        }
    }

    pub fn builder() -> PluginRegistryBuilder {
        PluginRegistryBuilder::new()
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// All plugins in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn ConvertPlugin> + '_ {
        self.plugins.iter().map(|p| p.as_ref())
    }

    /// Plugins bound to `checkpoint`, in discovery order.
    pub fn at(&self, checkpoint: Checkpoint) -> impl Iterator<Item = &dyn ConvertPlugin> + '_ {
        self.iter().filter(move |p| p.checkpoint() == checkpoint)
    }

    /// Run every hook bound to `checkpoint`. The first hook that fails or
    /// panics aborts the run.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn run_checkpoint(
        &self,
        checkpoint: Checkpoint,
        program: &ProgramModel,
        graph: &ReferenceGraph,
        config: &ConvertConfig,
        app: Option<&str>,
        claims: &mut ClaimTable,
    ) -> OutgrowResult<()> {
        for plugin in self.at(checkpoint) {
            debug!(plugin = plugin.name(), %checkpoint, "running plugin hook");
            let mut ctx = HookContext::new(
                program,
                graph,
                config,
                app,
                &mut *claims,
                plugin.name(),
                checkpoint,
            );
            let message = match catch_unwind(AssertUnwindSafe(|| plugin.run(&mut ctx))) {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err.to_string(),
                Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
            };
            return Err(OutgrowError::Plugin {
                plugin: plugin.name().to_string(),
                checkpoint: checkpoint.to_string(),
                message,
            });
        }
        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::target::{Role, TargetFile};
    use crate::plugin::HookResult;

    struct Named(&'static str, Checkpoint);

    impl ConvertPlugin for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn checkpoint(&self) -> Checkpoint {
            self.1
        }

        fn run(&self, ctx: &mut HookContext<'_>) -> HookResult {
            if let Some(decl) = ctx.program().find("x") {
                let id = decl.id;
                ctx.claim(id, Role::View, TargetFile::Views);
            }
            Ok(())
        }
    }

    struct Panics;

    impl ConvertPlugin for Panics {
        fn name(&self) -> &str {
            "panics"
        }

        fn checkpoint(&self) -> Checkpoint {
            Checkpoint::Models
        }

        fn run(&self, _ctx: &mut HookContext<'_>) -> HookResult {
            panic!("boom");
        }
    }

    struct Fails;

    impl ConvertPlugin for Fails {
        fn name(&self) -> &str {
            "fails"
        }

        fn checkpoint(&self) -> Checkpoint {
            Checkpoint::Views
        }

        fn run(&self, _ctx: &mut HookContext<'_>) -> HookResult {
            Err("refused".into())
        }
    }

    fn run(registry: &PluginRegistry, checkpoint: Checkpoint, src: &str) -> (OutgrowResult<()>, ClaimTable) {
        let program = ProgramModel::parse(src).unwrap();
        let graph = ReferenceGraph::build(&program);
        let config = ConvertConfig::default();
        let mut claims = ClaimTable::new(program.len());
        let result = registry.run_checkpoint(checkpoint, &program, &graph, &config, None, &mut claims);
        (result, claims)
    }

    #[test]
    fn test_explicit_plugins_precede_entry_points() {
        let registry = PluginRegistry::builder()
            .plugin(Named("mine", Checkpoint::Views))
            .build();
        let names = registry.names();
        assert_eq!(names[0], "mine");
        assert!(names.contains(&"django_ninja"));
    }

    #[test]
    fn test_disable_and_skip_entry_points() {
        let registry = PluginRegistry::builder().disable("django_ninja").build();
        assert!(registry.is_empty());
        let registry = PluginRegistry::builder()
            .entry_points(false)
            .plugin(Named("only", Checkpoint::Start))
            .build();
        assert_eq!(registry.names(), vec!["only"]);
    }

    #[test]
    fn test_first_hook_wins_at_same_checkpoint() {
        let registry = PluginRegistry::builder()
            .entry_points(false)
            .plugin(Named("first", Checkpoint::Views))
            .plugin(Named("second", Checkpoint::Views))
            .build();
        let (result, claims) = run(&registry, Checkpoint::Views, "x = 1\n");
        result.unwrap();
        assert_eq!(claims.get(0).unwrap().claimant.to_string(), "plugin:first");
        assert_eq!(claims.conflicts().len(), 1);
    }

    #[test]
    fn test_hooks_only_run_at_their_checkpoint() {
        let registry = PluginRegistry::builder()
            .entry_points(false)
            .plugin(Named("late", Checkpoint::Sweep))
            .build();
        let (result, claims) = run(&registry, Checkpoint::Views, "x = 1\n");
        result.unwrap();
        assert!(!claims.is_claimed(0));
    }

    #[test]
    fn test_panic_becomes_plugin_error() {
        let registry = PluginRegistry::builder()
            .entry_points(false)
            .plugin(Panics)
            .build();
        let (result, _) = run(&registry, Checkpoint::Models, "x = 1\n");
        match result {
            Err(OutgrowError::Plugin {
                plugin,
                checkpoint,
                message,
            }) => {
                assert_eq!(plugin, "panics");
                assert_eq!(checkpoint, "models");
                assert!(message.contains("boom"));
            }
            other => panic!("expected plugin error, got {other:?}"),
        }
    }

    #[test]
    fn test_error_becomes_plugin_error() {
        let registry = PluginRegistry::builder()
            .entry_points(false)
            .plugin(Fails)
            .build();
        let (result, _) = run(&registry, Checkpoint::Views, "x = 1\n");
        assert!(matches!(result, Err(OutgrowError::Plugin { message, .. }) if message == "refused"));
    }
}
