//! Dependency graph over currently-known project ids.
//!
//! Built from a snapshot without forcing any deferred load: declared
//! references come from resident state or from the deferred
//! declaration captured at create time. Provides:
//! - Reverse dependency index: "who references this project"
//! - BFS transitive propagation over the reverse index
//! - Depth-first post-order for dependency-ordered host pushes

use codemodel_core::{ProjectId, Solution};
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    ids: Vec<ProjectId>,
    forward: HashMap<ProjectId, Vec<ProjectId>>,
    reverse: HashMap<ProjectId, Vec<ProjectId>>,
}

impl DependencyGraph {
    /// Snapshot of the reference graph; ids in snapshot insertion order.
    pub fn from_snapshot(solution: &Solution) -> Self {
        let mut graph = Self::default();
        for id in solution.project_ids() {
            graph.ids.push(id.clone());
            let references = solution.referenced_ids(id).unwrap_or_default();
            for target in &references {
                graph
                    .reverse
                    .entry(target.clone())
                    .or_default()
                    .push(id.clone());
            }
            graph.forward.insert(id.clone(), references);
        }
        graph
    }

    pub fn all_ids(&self) -> &[ProjectId] {
        &self.ids
    }

    pub fn contains(&self, id: &ProjectId) -> bool {
        self.forward.contains_key(id)
    }

    /// Declared outgoing references (may include external ids).
    pub fn referenced_ids(&self, id: &ProjectId) -> &[ProjectId] {
        self.forward.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Projects that directly reference `id`.
    pub fn referencing_ids(&self, id: &ProjectId) -> &[ProjectId] {
        self.reverse.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All projects that transitively depend on `id` (BFS over the
    /// reverse index). Does not include `id` itself unless it sits on
    /// a cycle through itself.
    pub fn transitively_referencing(&self, id: &ProjectId) -> HashSet<ProjectId> {
        let mut affected = HashSet::new();
        let mut queue = VecDeque::from([id.clone()]);

        while let Some(current) = queue.pop_front() {
            for dependent in self.referencing_ids(&current) {
                if affected.insert(dependent.clone()) {
                    queue.push_back(dependent.clone());
                }
            }
        }

        affected
    }

    /// Depth-first post-order restricted to `subset`: referenced
    /// projects come before their dependents. Cycle-tolerant — back
    /// edges are skipped and every requested id appears exactly once.
    pub fn topological_order(&self, subset: &[ProjectId]) -> Vec<ProjectId> {
        let wanted: HashSet<&ProjectId> = subset.iter().collect();
        let mut visited = HashSet::new();
        let mut order = Vec::new();

        for id in subset {
            self.visit(id, &wanted, &mut visited, &mut order);
        }
        order
    }

    fn visit(
        &self,
        id: &ProjectId,
        wanted: &HashSet<&ProjectId>,
        visited: &mut HashSet<ProjectId>,
        order: &mut Vec<ProjectId>,
    ) {
        if !wanted.contains(id) || visited.contains(id) {
            return;
        }
        visited.insert(id.clone());
        for target in self.referenced_ids(id) {
            self.visit(target, wanted, visited, order);
        }
        order.push(id.clone());
    }
}
