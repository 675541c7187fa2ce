//! Fluent builder for task graphs.

use super::{Edge, Task, TaskGraph};
use crate::errors::GraphError;

/// Builder for creating validated task graphs.
///
/// Tasks may be added in any order; validation happens once in
/// [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    /// The graph name.
    name: String,
    /// Tasks in declaration order.
    tasks: Vec<Task>,
    /// Extra edges declared outside the tasks.
    edges: Vec<Edge>,
}

impl GraphBuilder {
    /// Creates a new graph builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Adds a task.
    #[must_use]
    pub fn task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    /// Declares that `downstream` depends on `upstream`.
    #[must_use]
    pub fn edge(mut self, upstream: impl Into<String>, downstream: impl Into<String>) -> Self {
        self.edges.push(Edge::new(upstream, downstream));
        self
    }

    /// Declares a linear chain: each id depends on the one before it.
    #[must_use]
    pub fn chain(mut self, ids: &[&str]) -> Self {
        for pair in ids.windows(2) {
            self.edges.push(Edge::new(pair[0], pair[1]));
        }
        self
    }

    /// Returns the graph name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of tasks added so far.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Builds the graph.
    ///
    /// # Errors
    ///
    /// Returns any validation error from [`TaskGraph::build`].
    pub fn build(self) -> Result<TaskGraph, GraphError> {
        TaskGraph::build(self.name, self.tasks, self.edges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NoOpAction;
    use std::sync::Arc;

    fn noop(id: &str) -> Task {
        Task::new(id, Arc::new(NoOpAction))
    }

    #[test]
    fn test_builder_creation() {
        let builder = GraphBuilder::new("retrain");
        assert_eq!(builder.name(), "retrain");
        assert_eq!(builder.task_count(), 0);
    }

    #[test]
    fn test_builder_chain() {
        let graph = GraphBuilder::new("retrain")
            .task(noop("notify"))
            .task(noop("deploy"))
            .task(noop("evaluate"))
            .task(noop("train"))
            .task(noop("extract"))
            .chain(&["extract", "train", "evaluate", "deploy", "notify"])
            .build()
            .unwrap();

        assert_eq!(
            graph.topological_order(),
            vec!["extract", "train", "evaluate", "deploy", "notify"]
        );
    }

    #[test]
    fn test_builder_edge_to_unknown_task() {
        let result = GraphBuilder::new("retrain")
            .task(noop("extract"))
            .edge("extract", "train")
            .build();

        let err = result.unwrap_err();
        assert_eq!(err.error_info().code, "GRAPH-UNKNOWN_DEP");
    }

    #[test]
    fn test_builder_cycle_via_edges() {
        let result = GraphBuilder::new("loop")
            .task(noop("a"))
            .task(noop("b"))
            .edge("a", "b")
            .edge("b", "a")
            .build();

        assert!(matches!(result, Err(GraphError::Cycle { .. })));
    }

    #[test]
    fn test_builder_empty_build() {
        let err = GraphBuilder::new("empty").build().unwrap_err();
        assert_eq!(err.error_info().code, "GRAPH-EMPTY");
    }
}
