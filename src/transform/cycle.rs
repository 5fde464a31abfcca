// src/transform/cycle.rs

//! Removing transforms that would re-render each other forever.
//!
//! Every transform contributes an edge `source -> target` between canonical
//! paths. A depth-first search from every node marks a node as
//! cycle-involved when it is reached again while still on the DFS stack
//! (self-loops included); every node on the stack below it that led into
//! the revisit is marked as well. Transforms touching a marked node are
//! removed.

use std::collections::HashSet;

use petgraph::graphmap::DiGraphMap;

use crate::errors::RetemplateError;
use crate::paths::CanonicalPath;
use crate::transform::FileTransform;

/// Transforms split into survivors and cycle casualties, order preserved.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub kept: Vec<FileTransform>,
    pub removed: Vec<FileTransform>,
}

impl CycleReport {
    /// One `CycleDetected` error per removed transform, for reporting.
    pub fn errors(&self) -> Vec<RetemplateError> {
        self.removed
            .iter()
            .map(|t| RetemplateError::CycleDetected {
                source_path: t.source.clone(),
                target: t.target.clone(),
            })
            .collect()
    }
}

/// Split `transforms` into those outside every cycle and those touching one.
pub fn remove_cycles(transforms: Vec<FileTransform>) -> CycleReport {
    let keys: Vec<(CanonicalPath, CanonicalPath)> = transforms
        .iter()
        .map(|t| (t.source_key(), t.target_key()))
        .collect();
    let involved = cycle_involved_nodes(keys.iter().map(|(s, t)| (s.as_str(), t.as_str())));

    let mut report = CycleReport::default();
    for (t, (source, target)) in transforms.into_iter().zip(keys.iter()) {
        if involved.contains(source.as_str()) || involved.contains(target.as_str()) {
            report.removed.push(t);
        } else {
            report.kept.push(t);
        }
    }
    report
}

struct Frame<'g> {
    node: &'g str,
    neighbors: Vec<&'g str>,
    next: usize,
    /// A revisit was found somewhere below this node.
    cyclic: bool,
}

impl<'g> Frame<'g> {
    fn new(graph: &DiGraphMap<&'g str, ()>, node: &'g str) -> Self {
        Self {
            node,
            neighbors: graph.neighbors(node).collect(),
            next: 0,
            cyclic: false,
        }
    }

    fn advance(&mut self) -> Option<&'g str> {
        let n = self.neighbors.get(self.next).copied();
        self.next += 1;
        n
    }
}

/// Nodes participating in, or on a DFS path leading into, a directed cycle.
pub fn cycle_involved_nodes<'g>(
    edges: impl IntoIterator<Item = (&'g str, &'g str)>,
) -> HashSet<&'g str> {
    let mut graph: DiGraphMap<&'g str, ()> = DiGraphMap::new();
    for (from, to) in edges {
        graph.add_edge(from, to, ());
    }

    let mut visited: HashSet<&'g str> = HashSet::new();
    let mut on_stack: HashSet<&'g str> = HashSet::new();
    let mut involved: HashSet<&'g str> = HashSet::new();

    let roots: Vec<&'g str> = graph.nodes().collect();
    for root in roots {
        if !visited.insert(root) {
            continue;
        }
        on_stack.insert(root);
        let mut stack = vec![Frame::new(&graph, root)];

        loop {
            let Some(top) = stack.last_mut() else {
                break;
            };
            match top.advance() {
                Some(next) if on_stack.contains(next) => {
                    involved.insert(next);
                    top.cyclic = true;
                }
                Some(next) => {
                    if visited.insert(next) {
                        on_stack.insert(next);
                        stack.push(Frame::new(&graph, next));
                    }
                }
                None => {
                    let Some(done) = stack.pop() else {
                        break;
                    };
                    on_stack.remove(done.node);
                    if done.cyclic {
                        involved.insert(done.node);
                        if let Some(parent) = stack.last_mut() {
                            parent.cyclic = true;
                        }
                    }
                }
            }
        }
    }

    involved
}
