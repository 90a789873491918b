//! Reference graph over top-level declarations.
//!
//! Built once from a [`ProgramModel`]: every free name a declaration reads
//! is resolved through the top-level name table into an edge, through the
//! import table into an external reference, or recorded as unresolved.
//! The graph is immutable after construction.

pub mod scope;

use std::collections::HashSet;

use serde::Serialize;
use tracing::debug;

use crate::graph::scope::{collect_uses, NameUse};
use crate::program::{Binding, DeclId, ProgramModel};

/// How the source declaration uses the target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Used in a decorator expression above the declaration.
    Decorates,
    /// Used as a base class.
    Inherits,
    /// Called.
    Calls,
    /// Read on the right-hand side of a top-level assignment.
    Assigns,
    /// Any other read.
    Reads,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub from: DeclId,
    pub to: DeclId,
    pub name: String,
    pub kind: EdgeKind,
}

/// A free name satisfied by a top-level import.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExternalRef {
    pub name: String,
    /// Index into `ImportTable::entries`.
    pub import: usize,
}

#[derive(Clone, Debug, Default)]
struct DeclRefs {
    uses: Vec<NameUse>,
    edges: Vec<usize>,
    externals: Vec<ExternalRef>,
    unresolved: Vec<NameUse>,
}

pub struct ReferenceGraph {
    edges: Vec<Edge>,
    refs: Vec<DeclRefs>,
    incoming: Vec<Vec<usize>>,
}

impl ReferenceGraph {
    pub fn build(program: &ProgramModel) -> Self {
        let mut edges = Vec::new();
        let mut refs = vec![DeclRefs::default(); program.len()];
        let mut incoming = vec![Vec::new(); program.len()];

        for decl in &program.declarations {
            let Some(node) = program.node(decl.id) else {
                continue;
            };
            let base = decl.span.start_byte + decl.node_offset;
            let uses = collect_uses(node, program.source(), base)
                .into_iter()
                .map(|mut u| {
                    // Ranges relative to the declaration text, comments included
                    u.range = u.range.start + decl.node_offset..u.range.end + decl.node_offset;
                    u.line += decl.text[..decl.node_offset].matches('\n').count();
                    u
                })
                .collect::<Vec<_>>();

            let entry = &mut refs[decl.id];
            {
                let mut seen_edges: HashSet<(DeclId, &str, EdgeKind)> = HashSet::new();
                let mut seen_external: HashSet<&str> = HashSet::new();
                let mut seen_unresolved: HashSet<&str> = HashSet::new();

                for name_use in &uses {
                    match program.lookup(&name_use.name, decl.ordinal, Some(decl.id)) {
                        Some(Binding::Decl(to)) => {
                            if seen_edges.insert((to, name_use.name.as_str(), name_use.kind)) {
                                entry.edges.push(edges.len());
                                incoming[to].push(edges.len());
                                edges.push(Edge {
                                    from: decl.id,
                                    to,
                                    name: name_use.name.clone(),
                                    kind: name_use.kind,
                                });
                            }
                        }
                        Some(Binding::Import(import)) => {
                            if seen_external.insert(name_use.name.as_str()) {
                                entry.externals.push(ExternalRef {
                                    name: name_use.name.clone(),
                                    import,
                                });
                            }
                        }
                        None if decl.binds(&name_use.name) => {}
                        None => {
                            if seen_unresolved.insert(name_use.name.as_str()) {
                                entry.unresolved.push(name_use.clone());
                            }
                        }
                    }
                }
            }
            entry.uses = uses;
        }

        debug!(
            declarations = program.len(),
            edges = edges.len(),
            "built reference graph"
        );
        ReferenceGraph {
            edges,
            refs,
            incoming,
        }
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Every free-name use of a declaration, in source order.
    pub fn uses(&self, id: DeclId) -> &[NameUse] {
        &self.refs[id].uses
    }

    pub fn edges_from(&self, id: DeclId) -> impl Iterator<Item = &Edge> + '_ {
        self.refs[id].edges.iter().map(move |&e| &self.edges[e])
    }

    pub fn edges_to(&self, id: DeclId) -> impl Iterator<Item = &Edge> + '_ {
        self.incoming[id].iter().map(move |&e| &self.edges[e])
    }

    /// Outgoing edges of one kind, e.g. what decorates `id`.
    pub fn edges_of_kind(&self, id: DeclId, kind: EdgeKind) -> impl Iterator<Item = &Edge> + '_ {
        self.edges_from(id).filter(move |e| e.kind == kind)
    }

    /// The edge a declaration's use of `name` resolved to, if any.
    pub fn edge_for_name(&self, id: DeclId, name: &str) -> Option<&Edge> {
        self.edges_from(id).find(|e| e.name == name)
    }

    /// Distinct declarations `id` depends on, in first-use order.
    pub fn dependencies(&self, id: DeclId) -> Vec<DeclId> {
        let mut seen = HashSet::new();
        self.edges_from(id)
            .map(|e| e.to)
            .filter(|to| seen.insert(*to))
            .collect()
    }

    /// Distinct declarations depending on `id`.
    pub fn referrers(&self, id: DeclId) -> Vec<DeclId> {
        let mut seen = HashSet::new();
        self.edges_to(id)
            .map(|e| e.from)
            .filter(|from| seen.insert(*from))
            .collect()
    }

    pub fn externals(&self, id: DeclId) -> &[ExternalRef] {
        &self.refs[id].externals
    }

    pub fn unresolved(&self, id: DeclId) -> &[NameUse] {
        &self.refs[id].unresolved
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}
