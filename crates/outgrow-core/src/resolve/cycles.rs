//! Cross-module import cycle detection. Cycles are reported, never broken.

use tracing::warn;

use crate::classify::target::ProjectLayout;
use crate::diagnostics::ImportCycle;
use crate::resolve::ResolvedFile;

/// Every pair of modules importing from each other, with the first symbol
/// imported in each direction.
pub fn detect_cycles(files: &[ResolvedFile], layout: &ProjectLayout) -> Vec<ImportCycle> {
    let mut cycles = Vec::new();
    for (i, a) in files.iter().enumerate() {
        for b in &files[i + 1..] {
            let Some(forward) = a.imports_from(b.target).next() else {
                continue;
            };
            let Some(backward) = b.imports_from(a.target).next() else {
                continue;
            };
            let cycle = ImportCycle {
                files: [
                    layout.rel_path(a.target).display().to_string(),
                    layout.rel_path(b.target).display().to_string(),
                ],
                symbols: [forward.to_string(), backward.to_string()],
            };
            warn!(
                first = %cycle.files[0],
                second = %cycle.files[1],
                forward,
                backward,
                "import cycle between generated modules"
            );
            cycles.push(cycle);
        }
    }
    cycles
}
