//! outgrow core library: splits a single-file nanodjango program into a
//! Django project.
//!
//! The engine parses the program once, builds a reference graph over its
//! top-level declarations, classifies them through an ordered pipeline of
//! stages and plugin hooks, resolves each generated module's inlined source
//! and imports, and writes the result beneath a project scaffold. The
//! [`Converter`] ties those phases together.

pub mod classify;
pub mod config;
pub mod converter;
pub mod diagnostics;
pub mod emit;
pub mod errors;
pub mod graph;
pub mod logging;
pub mod plugin;
pub mod program;
pub mod resolve;

#[cfg(feature = "python")]
mod python;

pub use classify::{ProjectLayout, Role, TargetFile};
pub use config::ConvertConfig;
pub use converter::{ConversionOutput, Converter, GeneratedFile};
pub use diagnostics::DiagnosticsReport;
pub use errors::{OutgrowError, OutgrowResult};
pub use plugin::{Checkpoint, ConvertPlugin, HookContext, HookResult, PluginRegistry};
