//! Bundled plugins, discovered after every explicitly supplied one.

pub mod ninja;

use crate::plugin::ConvertPlugin;

/// A bundled plugin and its constructor.
pub struct EntryPoint {
    pub name: &'static str,
    pub load: fn() -> Box<dyn ConvertPlugin>,
}

/// Entry points in discovery order.
pub static ENTRY_POINTS: &[EntryPoint] = &[EntryPoint {
    name: ninja::NAME,
    load: ninja::load,
}];
