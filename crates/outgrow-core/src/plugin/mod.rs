//! Plugin hooks: extension callbacks invoked at fixed checkpoints of the
//! classification pipeline.
//!
//! A hook sees the program, the reference graph and the claims made so
//! far, and can add claims, requirements and synthesized source through
//! its [`HookContext`]. Whatever it changes is visible to every hook and
//! stage that runs after it. Claims are first-claim-wins, so a hook can
//! never take a declaration away from an earlier stage or hook.

pub mod contrib;
pub mod registry;
pub mod rules;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::classify::claims::{ClaimOutcome, ClaimTable, Claimant, Rendering, SyntheticUnit};
use crate::classify::rules::RuleContext;
use crate::classify::target::{Role, TargetFile};
use crate::classify::Stage;
use crate::config::ConvertConfig;
use crate::graph::ReferenceGraph;
use crate::program::imports::ImportTable;
use crate::program::{DeclId, ProgramModel};

pub use registry::{PluginRegistry, PluginRegistryBuilder};

pub type HookResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Named point in the pipeline where hooks run. Every checkpoint except
/// `Start` runs right after the stage of the same name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Checkpoint {
    Start,
    Settings,
    Models,
    Admin,
    Views,
    Urls,
    TemplateTags,
    Sweep,
}

impl Checkpoint {
    pub fn after(stage: Stage) -> Self {
        match stage {
            Stage::Settings => Checkpoint::Settings,
            Stage::Models => Checkpoint::Models,
            Stage::Admin => Checkpoint::Admin,
            Stage::Views => Checkpoint::Views,
            Stage::Urls => Checkpoint::Urls,
            Stage::TemplateTags => Checkpoint::TemplateTags,
            Stage::Sweep => Checkpoint::Sweep,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Checkpoint::Start => "start",
            Checkpoint::Settings => "settings",
            Checkpoint::Models => "models",
            Checkpoint::Admin => "admin",
            Checkpoint::Views => "views",
            Checkpoint::Urls => "urls",
            Checkpoint::TemplateTags => "template_tags",
            Checkpoint::Sweep => "sweep",
        }
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An extension bound to exactly one checkpoint.
pub trait ConvertPlugin: Send + Sync {
    fn name(&self) -> &str;

    fn checkpoint(&self) -> Checkpoint;

    /// Returning an error (or panicking) aborts the whole conversion.
    fn run(&self, ctx: &mut HookContext<'_>) -> HookResult;
}

/// Live view of the pipeline handed to a hook.
pub struct HookContext<'a> {
    program: &'a ProgramModel,
    graph: &'a ReferenceGraph,
    config: &'a ConvertConfig,
    app: Option<&'a str>,
    claims: &'a mut ClaimTable,
    claimant: Claimant,
    checkpoint: Checkpoint,
}

impl<'a> HookContext<'a> {
    pub(crate) fn new(
        program: &'a ProgramModel,
        graph: &'a ReferenceGraph,
        config: &'a ConvertConfig,
        app: Option<&'a str>,
        claims: &'a mut ClaimTable,
        plugin: &str,
        checkpoint: Checkpoint,
    ) -> Self {
        HookContext {
            program,
            graph,
            config,
            app,
            claims,
            claimant: Claimant::Plugin(plugin.to_string()),
            checkpoint,
        }
    }

    pub fn program(&self) -> &ProgramModel {
        self.program
    }

    pub fn graph(&self) -> &ReferenceGraph {
        self.graph
    }

    pub fn imports(&self) -> &ImportTable {
        &self.program.imports
    }

    pub fn config(&self) -> &ConvertConfig {
        self.config
    }

    pub fn claims(&self) -> &ClaimTable {
        &*self.claims
    }

    /// Name bound to the framework application instance, if detected.
    pub fn app_instance(&self) -> Option<&str> {
        self.app
    }

    pub fn checkpoint(&self) -> Checkpoint {
        self.checkpoint
    }

    /// The same read-only view the built-in rules get.
    pub fn rule_context(&self) -> RuleContext<'_> {
        RuleContext {
            program: self.program,
            graph: self.graph,
            claims: &*self.claims,
            config: self.config,
            app: self.app,
        }
    }

    pub fn claim(&mut self, id: DeclId, role: Role, target: TargetFile) -> ClaimOutcome {
        self.claim_rendered(id, role, target, None)
    }

    pub fn claim_rendered(
        &mut self,
        id: DeclId,
        role: Role,
        target: TargetFile,
        rendering: Option<Rendering>,
    ) -> ClaimOutcome {
        let decl = self.program.declaration(id);
        self.claims
            .claim(decl, role, target, self.claimant.clone(), rendering)
    }

    /// Make `id` available in `target`: inlined when `target` ends up
    /// owning it, imported from its owner otherwise.
    pub fn require(&mut self, target: TargetFile, id: DeclId) {
        self.claims.require(target, id, self.claimant.clone());
    }

    /// Add synthesized source to `target`, placed after the declaration
    /// with ordinal `anchor` (or first, for `None`).
    pub fn append_source(&mut self, target: TargetFile, rendering: Rendering, anchor: Option<usize>) {
        self.claims.add_synthetic(SyntheticUnit {
            target,
            rendering,
            anchor,
            origin: self.claimant.clone(),
        });
    }
}
