//! Generalization hierarchy: superclass chains, cycle detection, ordering
//!
//! This module provides functions to:
//! - Build the subclass -> superclass graph from generalization edges
//! - Resolve a class's ancestors, nearest first
//! - Detect cycles before anything depends on an acyclic hierarchy
//! - Order classes so superclasses come before their subclasses

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{Result, SyncError};
use crate::model::{Generalization, ModelEntity};

#[derive(Debug, Clone, Default)]
pub struct Hierarchy {
    /// Adjacency list: class -> its direct superclasses
    superclasses: HashMap<String, Vec<String>>,
    /// Reverse adjacency: class -> its direct subclasses
    subclasses: HashMap<String, Vec<String>>,
}

impl Hierarchy {
    pub fn build<'a>(edges: impl IntoIterator<Item = &'a Generalization>) -> Self {
        let mut hierarchy = Hierarchy::default();

        for edge in edges {
            let supers = hierarchy
                .superclasses
                .entry(edge.subclass_id.clone())
                .or_default();
            if supers.contains(&edge.superclass_id) {
                log::debug!("Duplicate generalization '{}' ignored", edge.id());
                continue;
            }
            supers.push(edge.superclass_id.clone());

            hierarchy
                .subclasses
                .entry(edge.superclass_id.clone())
                .or_default()
                .push(edge.subclass_id.clone());
        }

        hierarchy
    }

    pub fn superclasses(&self, class_id: &str) -> &[String] {
        self.superclasses
            .get(class_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn subclasses(&self, class_id: &str) -> &[String] {
        self.subclasses
            .get(class_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// The given classes plus every class reachable through superclass edges
    pub fn closure<'a>(&self, classes: impl IntoIterator<Item = &'a str>) -> HashSet<String> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = classes.into_iter().map(str::to_string).collect();

        while let Some(class) = queue.pop_front() {
            if !seen.insert(class.clone()) {
                continue;
            }
            for parent in self.superclasses(&class) {
                if !seen.contains(parent) {
                    queue.push_back(parent.clone());
                }
            }
        }

        seen
    }

    /// Ancestors of a class, nearest first, each listed once
    ///
    /// Cycle-guarded: a class already visited is never expanded again.
    pub fn ancestors(&self, class_id: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        seen.insert(class_id.to_string());

        let mut queue: VecDeque<String> = self.superclasses(class_id).iter().cloned().collect();
        while let Some(class) = queue.pop_front() {
            if !seen.insert(class.clone()) {
                continue;
            }
            queue.extend(self.superclasses(&class).iter().cloned());
            out.push(class);
        }

        out
    }

    /// Topological order of the classes reachable from `classes`, superclasses first
    ///
    /// Uses Kahn's algorithm restricted to the reachable subgraph, so cycles in
    /// unrelated parts of the model do not matter.
    pub fn topological_order<'a>(&self, classes: impl IntoIterator<Item = &'a str>) -> Result<Vec<String>> {
        let nodes = self.closure(classes);

        // In-degree = number of superclasses still to be placed
        let mut in_degree: HashMap<&str, usize> = nodes
            .iter()
            .map(|n| {
                let count = self
                    .superclasses(n)
                    .iter()
                    .filter(|s| nodes.contains(*s))
                    .count();
                (n.as_str(), count)
            })
            .collect();

        let mut queue: VecDeque<&str> = {
            let mut ready: Vec<&str> = in_degree
                .iter()
                .filter(|(_, d)| **d == 0)
                .map(|(n, _)| *n)
                .collect();
            ready.sort_unstable();
            ready.into_iter().collect()
        };

        let mut order = Vec::with_capacity(nodes.len());
        while let Some(class) = queue.pop_front() {
            order.push(class.to_string());
            for sub in self.subclasses(class) {
                if let Some(count) = in_degree.get_mut(sub.as_str()) {
                    *count -= 1;
                    if *count == 0 {
                        queue.push_back(sub.as_str());
                    }
                }
            }
        }

        if order.len() != nodes.len() {
            let placed: HashSet<&str> = order.iter().map(String::as_str).collect();
            let mut remaining: Vec<String> = nodes
                .iter()
                .filter(|n| !placed.contains(n.as_str()))
                .cloned()
                .collect();
            remaining.sort();
            return Err(SyncError::CycleDetected { classes: remaining });
        }

        Ok(order)
    }

    /// Fail with `CycleDetected` if any class reachable from `classes` is on a cycle
    pub fn check_acyclic<'a>(&self, classes: impl IntoIterator<Item = &'a str>) -> Result<()> {
        self.topological_order(classes).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(id: &str, sub: &str, sup: &str) -> Generalization {
        Generalization::new(id, sub, sup)
    }

    #[test]
    fn test_ancestors_nearest_first() {
        let edges = vec![edge("g1", "C", "B"), edge("g2", "B", "A")];
        let h = Hierarchy::build(&edges);

        assert_eq!(h.ancestors("C"), vec!["B", "A"]);
        assert_eq!(h.ancestors("A"), Vec::<String>::new());
    }

    #[test]
    fn test_diamond_lists_shared_ancestor_once() {
        let edges = vec![
            edge("g1", "D", "B"),
            edge("g2", "D", "C"),
            edge("g3", "B", "A"),
            edge("g4", "C", "A"),
        ];
        let h = Hierarchy::build(&edges);

        assert_eq!(h.ancestors("D"), vec!["B", "C", "A"]);
    }

    #[test]
    fn test_topological_order_supers_first() {
        let edges = vec![edge("g1", "C", "B"), edge("g2", "B", "A")];
        let h = Hierarchy::build(&edges);

        let order = h.topological_order(["C"]).unwrap();

        assert_eq!(order, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_cycle_detected() {
        let edges = vec![edge("g1", "A", "B"), edge("g2", "B", "A"), edge("g3", "C", "A")];
        let h = Hierarchy::build(&edges);

        let err = h.check_acyclic(["C"]).unwrap_err();

        match err {
            SyncError::CycleDetected { classes } => {
                assert!(classes.contains(&"A".to_string()));
                assert!(classes.contains(&"B".to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
        // Ancestors stay finite even on a cycle
        assert_eq!(h.ancestors("C"), vec!["A", "B"]);
    }

    #[test]
    fn test_self_generalization_is_a_cycle() {
        let edges = vec![edge("g1", "A", "A")];
        let h = Hierarchy::build(&edges);

        assert!(h.check_acyclic(["A"]).is_err());
    }

    #[test]
    fn test_unrelated_cycle_is_ignored() {
        let edges = vec![edge("g1", "X", "Y"), edge("g2", "Y", "X"), edge("g3", "C", "A")];
        let h = Hierarchy::build(&edges);

        assert!(h.check_acyclic(["C"]).is_ok());
    }
}
