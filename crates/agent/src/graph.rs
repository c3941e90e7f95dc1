// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Graph construction and cycle detection for a `DagSpec` (§4.7).

use indexmap::IndexMap;
use railtrack_core::{CoreError, StepSpec};

/// A validated, acyclic view of a DAG's steps, preserving declaration order.
pub struct Graph {
    steps: IndexMap<String, StepSpec>,
}

impl Graph {
    /// Builds the dependency graph and fails fast with `InvalidGraph` before
    /// any execution if a cycle or dangling dependency is found (§4.7).
    pub fn build(steps: &[StepSpec]) -> Result<Self, CoreError> {
        let mut map = IndexMap::new();
        for step in steps {
            map.insert(step.name.clone(), step.clone());
        }
        for step in map.values() {
            for dep in &step.depends {
                if !map.contains_key(dep) {
                    return Err(CoreError::UnknownStep(dep.clone()));
                }
            }
        }
        let graph = Self { steps: map };
        graph.detect_cycle()?;
        Ok(graph)
    }

    pub fn step(&self, name: &str) -> Option<&StepSpec> {
        self.steps.get(name)
    }

    pub fn step_names(&self) -> impl Iterator<Item = &str> {
        self.steps.keys().map(|s| s.as_str())
    }

    /// Steps with no incoming edges: the initial ready-set (§4.7 step 1).
    pub fn roots(&self) -> Vec<String> {
        self.steps.values().filter(|s| s.depends.is_empty()).map(|s| s.name.clone()).collect()
    }

    /// Direct dependents of `step_name`, used to recompute the ready-set
    /// after a node terminates.
    pub fn dependents_of<'a>(&'a self, step_name: &'a str) -> impl Iterator<Item = &'a str> {
        self.steps.values().filter(move |s| s.depends.iter().any(|d| d == step_name)).map(|s| s.name.as_str())
    }

    /// DFS three-coloring cycle detection (§4.7): `InvalidGraph` if any back
    /// edge is found.
    fn detect_cycle(&self) -> Result<(), CoreError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }
        use std::collections::HashMap;

        let mut color: HashMap<&str, Color> =
            self.steps.keys().map(|k| (k.as_str(), Color::White)).collect();

        fn visit<'a>(
            name: &'a str,
            graph: &'a Graph,
            color: &mut std::collections::HashMap<&'a str, Color>,
        ) -> Result<(), CoreError> {
            color.insert(name, Color::Gray);
            if let Some(step) = graph.step(name) {
                for dep in &step.depends {
                    match color.get(dep.as_str()).copied().unwrap_or(Color::White) {
                        Color::Gray => return Err(CoreError::CyclicGraph(name.to_string())),
                        Color::White => visit(dep, graph, color)?,
                        Color::Black => {}
                    }
                }
            }
            color.insert(name, Color::Black);
            Ok(())
        }

        for name in self.steps.keys() {
            if color.get(name.as_str()).copied().unwrap_or(Color::White) == Color::White {
                visit(name, self, &mut color)?;
            }
        }
        Ok(())
    }
}
