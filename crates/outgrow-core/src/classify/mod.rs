//! Role classification: ordered stages of structural rules that claim
//! declarations for a generated module, with plugin checkpoints between
//! stages and a final sweep into the catch-all module.

pub mod claims;
pub mod pipeline;
pub mod rewrite;
pub mod rules;
pub mod target;
pub mod templates;

use std::fmt;

use serde::Serialize;

pub use claims::{ClaimOutcome, ClaimRecord, ClaimTable, Claimant, Fragment, Rendering, SyntheticUnit};
pub use pipeline::{Classification, ClassifierPipeline};
pub use target::{ProjectLayout, Role, TargetFile};
pub use templates::InlineTemplate;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Settings,
    Models,
    Admin,
    Views,
    Urls,
    TemplateTags,
    Sweep,
}

impl Stage {
    /// Stages in execution order.
    pub const ORDER: [Stage; 7] = [
        Stage::Settings,
        Stage::Models,
        Stage::Admin,
        Stage::Views,
        Stage::Urls,
        Stage::TemplateTags,
        Stage::Sweep,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Settings => "settings",
            Stage::Models => "models",
            Stage::Admin => "admin",
            Stage::Views => "views",
            Stage::Urls => "urls",
            Stage::TemplateTags => "template_tags",
            Stage::Sweep => "sweep",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
