//! Claim bookkeeping: who owns which declaration, what extra source was
//! synthesized for which module, and which declarations a module needs.
//!
//! First claim wins. A later claim on the same declaration is a no-op that
//! is kept as a [`ClaimConflict`] for the report.

use std::fmt;

use serde::Serialize;
use tracing::{debug, info};

use crate::classify::target::{Role, TargetFile};
use crate::classify::Stage;
use crate::diagnostics::ClaimConflict;
use crate::program::imports::ImportBinding;
use crate::program::{DeclId, Declaration};

/// Who made a claim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Claimant {
    Stage(Stage),
    Plugin(String),
    /// Pulled in as a dependency of another module's roots.
    Adoption(TargetFile),
    /// Generated by the scaffold rather than any stage.
    Scaffold,
    Sweep,
}

impl fmt::Display for Claimant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Claimant::Stage(stage) => write!(f, "stage:{stage}"),
            Claimant::Plugin(name) => write!(f, "plugin:{name}"),
            Claimant::Adoption(target) => write!(f, "adoption:{target}"),
            Claimant::Scaffold => f.write_str("scaffold"),
            Claimant::Sweep => f.write_str("sweep"),
        }
    }
}

/// Where a piece of generated source goes within its module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Fragment {
    /// Module-level code.
    Source,
    /// One entry of `urlpatterns`.
    UrlPattern,
}

/// Source text to emit in place of (or in addition to) a declaration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rendering {
    pub text: String,
    pub fragment: Fragment,
    /// Imports the rewritten text needs that the original did not have.
    pub imports: Vec<ImportBinding>,
    /// Names the text binds at module level.
    pub binds: Vec<String>,
}

impl Rendering {
    pub fn source(text: impl Into<String>, binds: Vec<String>) -> Self {
        Rendering {
            text: text.into(),
            fragment: Fragment::Source,
            imports: Vec::new(),
            binds,
        }
    }

    pub fn url_pattern(text: impl Into<String>, imports: Vec<ImportBinding>) -> Self {
        Rendering {
            text: text.into(),
            fragment: Fragment::UrlPattern,
            imports,
            binds: Vec::new(),
        }
    }

    pub fn with_import(mut self, binding: ImportBinding) -> Self {
        if !self.imports.contains(&binding) {
            self.imports.push(binding);
        }
        self
    }
}

/// Generated source that does not correspond to any one declaration.
#[derive(Clone, Debug)]
pub struct SyntheticUnit {
    pub target: TargetFile,
    pub rendering: Rendering,
    /// Ordinal of the declaration this unit is placed after; `None` places
    /// it before every declaration.
    pub anchor: Option<usize>,
    pub origin: Claimant,
}

/// A declaration a module needs, inlined when the module owns it and
/// imported otherwise.
#[derive(Clone, Debug)]
pub struct Requirement {
    pub target: TargetFile,
    pub decl: DeclId,
    pub origin: Claimant,
}

#[derive(Clone, Debug)]
pub struct ClaimRecord {
    pub decl: DeclId,
    pub role: Role,
    pub target: TargetFile,
    pub claimant: Claimant,
    /// `None` emits the declaration's original text.
    pub rendering: Option<Rendering>,
}

impl ClaimRecord {
    /// Names this claim makes available at module level.
    pub fn binds<'a>(&'a self, decl: &'a Declaration) -> &'a [String] {
        match &self.rendering {
            Some(rendering) => &rendering.binds,
            None => &decl.names,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    AlreadyClaimed {
        claimant: Claimant,
        target: TargetFile,
    },
    NotRelocatable(String),
}

impl ClaimOutcome {
    pub fn is_claimed(&self) -> bool {
        matches!(self, ClaimOutcome::Claimed)
    }
}

#[derive(Clone, Debug, Default)]
pub struct ClaimTable {
    records: Vec<Option<ClaimRecord>>,
    synthetic: Vec<SyntheticUnit>,
    requirements: Vec<Requirement>,
    conflicts: Vec<ClaimConflict>,
}

impl ClaimTable {
    pub fn new(declarations: usize) -> Self {
        ClaimTable {
            records: vec![None; declarations],
            ..Default::default()
        }
    }

    /// Claim `decl` for `role` in `target`.
    ///
    /// Non-relocatable declarations can only be taken by the sweep.
    pub fn claim(
        &mut self,
        decl: &Declaration,
        role: Role,
        target: TargetFile,
        claimant: Claimant,
        rendering: Option<Rendering>,
    ) -> ClaimOutcome {
        if let Some(existing) = &self.records[decl.id] {
            if existing.claimant != claimant {
                info!(
                    declaration = %decl.label(),
                    winner = %existing.claimant,
                    loser = %claimant,
                    "claim conflict"
                );
                self.conflicts.push(ClaimConflict {
                    declaration: decl.label(),
                    winner: existing.claimant.to_string(),
                    loser: claimant.to_string(),
                });
            }
            return ClaimOutcome::AlreadyClaimed {
                claimant: existing.claimant.clone(),
                target: existing.target,
            };
        }
        if let Some(reason) = &decl.non_relocatable {
            if claimant != Claimant::Sweep {
                return ClaimOutcome::NotRelocatable(reason.clone());
            }
        }
        debug!(declaration = %decl.label(), %role, %target, %claimant, "claimed");
        self.records[decl.id] = Some(ClaimRecord {
            decl: decl.id,
            role,
            target,
            claimant,
            rendering,
        });
        ClaimOutcome::Claimed
    }

    /// Take a statement whose whole content leaves the Python modules, such
    /// as an inline template table. It is recorded as an empty setting so it
    /// still has exactly one owner.
    pub fn consume(&mut self, decl: &Declaration, claimant: Claimant) -> ClaimOutcome {
        if let Some(existing) = &self.records[decl.id] {
            return ClaimOutcome::AlreadyClaimed {
                claimant: existing.claimant.clone(),
                target: existing.target,
            };
        }
        debug!(declaration = %decl.label(), %claimant, "consumed");
        self.records[decl.id] = Some(ClaimRecord {
            decl: decl.id,
            role: Role::Setting,
            target: TargetFile::Settings,
            claimant,
            rendering: Some(Rendering::source("", Vec::new())),
        });
        ClaimOutcome::Claimed
    }

    pub fn get(&self, id: DeclId) -> Option<&ClaimRecord> {
        self.records.get(id).and_then(Option::as_ref)
    }

    pub fn is_claimed(&self, id: DeclId) -> bool {
        self.get(id).is_some()
    }

    pub fn owner(&self, id: DeclId) -> Option<TargetFile> {
        self.get(id).map(|r| r.target)
    }

    pub fn role(&self, id: DeclId) -> Role {
        self.get(id).map_or(Role::Unclassified, |r| r.role)
    }

    pub fn records(&self) -> impl Iterator<Item = &ClaimRecord> {
        self.records.iter().flatten()
    }

    /// Declarations claimed into `target`, in program order.
    pub fn owned_by(&self, target: TargetFile) -> impl Iterator<Item = &ClaimRecord> {
        self.records().filter(move |r| r.target == target)
    }

    pub fn add_synthetic(&mut self, unit: SyntheticUnit) {
        debug!(target = %unit.target, origin = %unit.origin, "synthesized source");
        self.synthetic.push(unit);
    }

    pub fn synthetic(&self) -> &[SyntheticUnit] {
        &self.synthetic
    }

    /// The synthetic unit in `target` binding `name`, if any.
    pub fn synthetic_binding(&self, target: TargetFile, name: &str) -> Option<&SyntheticUnit> {
        self.synthetic
            .iter()
            .find(|u| u.target == target && u.rendering.binds.iter().any(|b| b == name))
    }

    /// Any synthetic unit binding `name`, in creation order.
    pub fn any_synthetic_binding(&self, name: &str) -> Option<&SyntheticUnit> {
        self.synthetic
            .iter()
            .find(|u| u.rendering.binds.iter().any(|b| b == name))
    }

    pub fn require(&mut self, target: TargetFile, decl: DeclId, origin: Claimant) {
        let exists = self
            .requirements
            .iter()
            .any(|r| r.target == target && r.decl == decl);
        if !exists {
            self.requirements.push(Requirement {
                target,
                decl,
                origin,
            });
        }
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn conflicts(&self) -> &[ClaimConflict] {
        &self.conflicts
    }

    /// Number of claims and synthetic units attributed to `claimant`.
    pub fn activity(&self, claimant: &Claimant) -> (usize, usize) {
        let claims = self.records().filter(|r| &r.claimant == claimant).count();
        let appended = self.synthetic.iter().filter(|u| &u.origin == claimant).count();
        (claims, appended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::ProgramModel;

    #[test]
    fn test_first_claim_wins() {
        let program = ProgramModel::parse("class M:\n    pass\n").unwrap();
        let decl = &program.declarations[0];
        let mut table = ClaimTable::new(program.len());

        let first = table.claim(decl, Role::Model, TargetFile::Models, Claimant::Stage(Stage::Models), None);
        assert!(first.is_claimed());
        let second = table.claim(
            decl,
            Role::View,
            TargetFile::Views,
            Claimant::Plugin("late".into()),
            None,
        );
        assert_eq!(
            second,
            ClaimOutcome::AlreadyClaimed {
                claimant: Claimant::Stage(Stage::Models),
                target: TargetFile::Models,
            }
        );
        assert_eq!(table.role(decl.id), Role::Model);
        assert_eq!(table.conflicts().len(), 1);
        assert_eq!(table.conflicts()[0].winner, "stage:models");
        assert_eq!(table.conflicts()[0].loser, "plugin:late");
    }

    #[test]
    fn test_only_sweep_takes_non_relocatable() {
        let program = ProgramModel::parse("if DEBUG:\n    X = 1\n").unwrap();
        let decl = &program.declarations[0];
        let mut table = ClaimTable::new(program.len());
        let outcome = table.claim(decl, Role::Setting, TargetFile::Settings, Claimant::Stage(Stage::Settings), None);
        assert!(matches!(outcome, ClaimOutcome::NotRelocatable(_)));
        let swept = table.claim(decl, Role::Unclassified, TargetFile::Unused, Claimant::Sweep, None);
        assert!(swept.is_claimed());
        assert_eq!(table.owner(decl.id), Some(TargetFile::Unused));
    }

    #[test]
    fn test_consume_takes_non_relocatable_once() {
        let program = ProgramModel::parse("app.templates = {\"a.html\": \"<p>\"}\n").unwrap();
        let decl = &program.declarations[0];
        let mut table = ClaimTable::new(program.len());
        assert!(table.consume(decl, Claimant::Stage(Stage::Settings)).is_claimed());
        let record = table.get(decl.id).unwrap();
        assert_eq!(record.target, TargetFile::Settings);
        assert!(record.binds(decl).is_empty());
        assert_eq!(record.rendering.as_ref().unwrap().text, "");

        let again = table.claim(decl, Role::Unclassified, TargetFile::Unused, Claimant::Sweep, None);
        assert!(!again.is_claimed());
        assert_eq!(table.owner(decl.id), Some(TargetFile::Settings));
    }

    #[test]
    fn test_rendering_binds_replace_declaration_names() {
        let program = ProgramModel::parse("app = Django(DEBUG=True)\n").unwrap();
        let decl = &program.declarations[0];
        let mut table = ClaimTable::new(program.len());
        table.claim(
            decl,
            Role::Setting,
            TargetFile::Settings,
            Claimant::Stage(Stage::Settings),
            Some(Rendering::source("DEBUG = True", vec!["DEBUG".into()])),
        );
        let record = table.get(decl.id).unwrap();
        assert_eq!(record.binds(decl), ["DEBUG".to_string()]);
    }

    #[test]
    fn test_requirements_are_deduplicated() {
        let mut table = ClaimTable::new(1);
        table.require(TargetFile::Api, 0, Claimant::Plugin("p".into()));
        table.require(TargetFile::Api, 0, Claimant::Plugin("q".into()));
        assert_eq!(table.requirements().len(), 1);
    }
}
