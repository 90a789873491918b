//! Declarative plugins loaded from JSON rule files.
//!
//! A rule file holds one rule object or a list of them:
//!
//! ```json
//! [{
//!   "name": "celery_tasks",
//!   "checkpoint": "views",
//!   "role": "view",
//!   "target": "unused",
//!   "kinds": ["function"],
//!   "decorator": "celery\\.shared_task|app\\.task"
//! }]
//! ```
//!
//! Matchers are regexes over dotted paths and must match the whole path,
//! either as written or as qualified through the import table. Every
//! matcher present must match for a declaration to be claimed.

use std::path::Path;

use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::classify::rules::RuleContext;
use crate::classify::target::{Role, TargetFile};
use crate::errors::{OutgrowError, OutgrowResult};
use crate::plugin::{Checkpoint, ConvertPlugin, HookContext, HookResult};
use crate::program::{DeclId, DeclKind, Declaration};

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSpec {
    pub name: String,
    pub checkpoint: Checkpoint,
    pub role: Role,
    #[serde(default)]
    pub target: Option<TargetFile>,
    #[serde(default)]
    pub kinds: Vec<DeclKind>,
    #[serde(default)]
    pub decorator: Option<String>,
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default)]
    pub call: Option<String>,
    #[serde(default)]
    pub bound_name: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RuleFile {
    Many(Vec<RuleSpec>),
    One(RuleSpec),
}

pub struct RulePlugin {
    name: String,
    checkpoint: Checkpoint,
    role: Role,
    target: TargetFile,
    kinds: Vec<DeclKind>,
    decorator: Option<Regex>,
    base: Option<Regex>,
    call: Option<Regex>,
    bound_name: Option<Regex>,
}

fn anchored(pattern: &Option<String>) -> OutgrowResult<Option<Regex>> {
    pattern
        .as_deref()
        .map(|p| Regex::new(&format!("^(?:{p})$")))
        .transpose()
        .map_err(OutgrowError::from)
}

impl RulePlugin {
    pub fn from_spec(spec: &RuleSpec) -> OutgrowResult<Self> {
        if spec.decorator.is_none()
            && spec.base.is_none()
            && spec.call.is_none()
            && spec.bound_name.is_none()
        {
            return Err(OutgrowError::Config(format!(
                "rule `{}` has no matcher",
                spec.name
            )));
        }
        Ok(RulePlugin {
            name: spec.name.clone(),
            checkpoint: spec.checkpoint,
            role: spec.role,
            target: spec.target.unwrap_or_else(|| spec.role.default_target()),
            kinds: spec.kinds.clone(),
            decorator: anchored(&spec.decorator)?,
            base: anchored(&spec.base)?,
            call: anchored(&spec.call)?,
            bound_name: anchored(&spec.bound_name)?,
        })
    }

    fn path_matches(ctx: &RuleContext<'_>, re: &Regex, path: &str) -> bool {
        re.is_match(path) || re.is_match(&ctx.qualify(path))
    }

    fn matches(&self, ctx: &RuleContext<'_>, decl: &Declaration) -> bool {
        if !self.kinds.is_empty() && !self.kinds.contains(&decl.kind) {
            return false;
        }
        if let Some(re) = &self.decorator {
            let hit = decl
                .decorators
                .iter()
                .filter_map(|d| d.path.as_deref())
                .any(|p| Self::path_matches(ctx, re, p));
            if !hit {
                return false;
            }
        }
        if let Some(re) = &self.base {
            if !decl.bases.iter().any(|b| Self::path_matches(ctx, re, b)) {
                return false;
            }
        }
        if let Some(re) = &self.call {
            let callee = decl.call.as_ref().and_then(|c| c.callee.as_deref());
            if !callee.is_some_and(|c| Self::path_matches(ctx, re, c)) {
                return false;
            }
        }
        if let Some(re) = &self.bound_name {
            if !decl.names.iter().any(|n| re.is_match(n)) {
                return false;
            }
        }
        true
    }
}

impl ConvertPlugin for RulePlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn checkpoint(&self) -> Checkpoint {
        self.checkpoint
    }

    fn run(&self, ctx: &mut HookContext<'_>) -> HookResult {
        let matched: Vec<DeclId> = {
            let view = ctx.rule_context();
            view.program
                .declarations
                .iter()
                .filter(|d| d.is_relocatable() && !view.claims.is_claimed(d.id))
                .filter(|d| self.matches(&view, d))
                .map(|d| d.id)
                .collect()
        };
        debug!(rule = %self.name, matched = matched.len(), "rule plugin matched");
        for id in matched {
            ctx.claim(id, self.role, self.target);
        }
        Ok(())
    }
}

pub fn parse_rules(text: &str) -> OutgrowResult<Vec<RulePlugin>> {
    let specs = match serde_json::from_str::<RuleFile>(text)? {
        RuleFile::Many(specs) => specs,
        RuleFile::One(spec) => vec![spec],
    };
    specs.iter().map(RulePlugin::from_spec).collect()
}

pub fn load_rule_file(path: &Path) -> OutgrowResult<Vec<RulePlugin>> {
    let text = std::fs::read_to_string(path)?;
    parse_rules(&text)
}
