//! Non-fatal findings accumulated over one conversion run.
//!
//! Nothing in here aborts a run. Every condition is recorded and reported
//! together at the end so one pass surfaces every issue.

use serde::Serialize;

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// A declaration that ended up in the catch-all module.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SweptEntry {
    pub declaration: String,
    pub line: usize,
    pub reason: String,
}

/// Two generated modules importing from each other.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ImportCycle {
    /// Relative paths of both files.
    pub files: [String; 2],
    /// One symbol per direction: `symbols[0]` is imported by `files[0]`
    /// from `files[1]`, `symbols[1]` the other way round.
    pub symbols: [String; 2],
}

/// A later claim on an already claimed declaration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClaimConflict {
    pub declaration: String,
    pub winner: String,
    pub loser: String,
}

/// A free name with no definition and no import.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UnresolvedReference {
    pub declaration: String,
    pub name: String,
    pub line: usize,
    pub file: String,
}

/// One plugin hook invocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PluginActivity {
    pub plugin: String,
    pub checkpoint: String,
    pub claims: usize,
    pub appended: usize,
}

/// Digest of one generated file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileDigest {
    pub path: String,
    pub sha256: String,
    pub bytes: usize,
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, Serialize)]
pub struct DiagnosticsReport {
    pub swept: Vec<SweptEntry>,
    pub cycles: Vec<ImportCycle>,
    pub conflicts: Vec<ClaimConflict>,
    pub unresolved: Vec<UnresolvedReference>,
    pub plugins: Vec<PluginActivity>,
    pub warnings: Vec<String>,
    pub files: Vec<FileDigest>,
}

impl DiagnosticsReport {
    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Whether anything needs the author's attention.
    pub fn has_findings(&self) -> bool {
        !(self.swept.is_empty()
            && self.cycles.is_empty()
            && self.unresolved.is_empty()
            && self.warnings.is_empty())
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Plain-text summary for terminal output.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for entry in &self.swept {
            lines.push(format!(
                "unused: {} (line {}): {}",
                entry.declaration, entry.line, entry.reason
            ));
        }
        for cycle in &self.cycles {
            lines.push(format!(
                "import cycle: {} imports {} from {}, which imports {} back",
                cycle.files[0], cycle.symbols[0], cycle.files[1], cycle.symbols[1]
            ));
        }
        for unresolved in &self.unresolved {
            lines.push(format!(
                "unresolved: {} in {} ({}, line {})",
                unresolved.name, unresolved.declaration, unresolved.file, unresolved.line
            ));
        }
        for conflict in &self.conflicts {
            lines.push(format!(
                "claim conflict: {} kept by {}, {} ignored",
                conflict.declaration, conflict.winner, conflict.loser
            ));
        }
        for warning in &self.warnings {
            lines.push(format!("warning: {warning}"));
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_report_has_no_findings() {
        let report = DiagnosticsReport::default();
        assert!(!report.has_findings());
        assert!(report.summary_lines().is_empty());
    }

    #[test]
    fn test_conflicts_alone_are_not_findings() {
        let mut report = DiagnosticsReport::default();
        report.conflicts.push(ClaimConflict {
            declaration: "api".into(),
            winner: "stage:settings".into(),
            loser: "plugin:django_ninja".into(),
        });
        assert!(!report.has_findings());
        assert_eq!(report.summary_lines().len(), 1);
    }

    #[test]
    fn test_report_serializes() {
        let mut report = DiagnosticsReport::default();
        report.swept.push(SweptEntry {
            declaration: "h".into(),
            line: 12,
            reason: "not referenced by any generated module".into(),
        });
        let json = report.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["swept"][0]["declaration"], "h");
        assert_eq!(value["swept"][0]["line"], 12);
    }
}
