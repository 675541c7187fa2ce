//! Validated, acyclic task graph.

use super::{Gate, Task};
use crate::errors::GraphError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// An additional dependency edge: `downstream` depends on `upstream`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    /// The task that must finish first.
    pub upstream: String,
    /// The task that depends on it.
    pub downstream: String,
}

impl Edge {
    /// Creates a new edge.
    #[must_use]
    pub fn new(upstream: impl Into<String>, downstream: impl Into<String>) -> Self {
        Self {
            upstream: upstream.into(),
            downstream: downstream.into(),
        }
    }
}

/// A directed acyclic graph of tasks.
///
/// Construction validates the graph once; the topological order and the
/// ancestor sets are computed at build time and never change.
#[derive(Debug)]
pub struct TaskGraph {
    /// The graph name.
    name: String,
    /// Tasks in declaration order.
    tasks: Vec<Task>,
    /// Task id to declaration index.
    index: HashMap<String, usize>,
    /// Declaration indices in topological order.
    order: Vec<usize>,
    /// Transitive upstream ids, per declaration index.
    ancestors: Vec<BTreeSet<String>>,
}

impl TaskGraph {
    /// Builds and validates a graph.
    ///
    /// `edges` are merged into the tasks' declared dependencies.
    ///
    /// # Errors
    ///
    /// Returns `Empty`, `DuplicateTask`, `UnknownDependency`, `UnknownEdgeTask`, `Cycle`,
    /// `InvalidGate` or `InvalidRetryPolicy`.
    pub fn build(
        name: impl Into<String>,
        mut tasks: Vec<Task>,
        edges: impl IntoIterator<Item = Edge>,
    ) -> Result<Self, GraphError> {
        let name = name.into();
        if tasks.is_empty() {
            return Err(GraphError::Empty { name });
        }

        let mut index = HashMap::with_capacity(tasks.len());
        for (i, task) in tasks.iter().enumerate() {
            if index.insert(task.id.clone(), i).is_some() {
                return Err(GraphError::DuplicateTask {
                    task: task.id.clone(),
                });
            }
        }

        for edge in edges {
            let (Some(_), Some(&downstream)) =
                (index.get(&edge.upstream), index.get(&edge.downstream))
            else {
                let missing = if index.contains_key(&edge.upstream) {
                    edge.downstream.clone()
                } else {
                    edge.upstream.clone()
                };
                return Err(GraphError::UnknownEdgeTask {
                    upstream: edge.upstream,
                    downstream: edge.downstream,
                    missing,
                });
            };
            let task = &mut tasks[downstream];
            if !task.dependencies.contains(&edge.upstream) {
                task.dependencies.push(edge.upstream);
            }
        }

        for task in &tasks {
            if let Some(dep) = task.dependencies.iter().find(|dep| !index.contains_key(*dep)) {
                return Err(GraphError::UnknownDependency {
                    task: task.id.clone(),
                    dependency: dep.clone(),
                });
            }
            if task.retry_policy.max_attempts == 0 {
                return Err(GraphError::InvalidRetryPolicy {
                    task: task.id.clone(),
                    reason: "max_attempts must be at least 1".to_string(),
                });
            }
        }

        if let Some(path) = find_cycle(&tasks, &index) {
            return Err(GraphError::Cycle { path });
        }

        let order = topological_order(&tasks, &index);
        let ancestors = ancestor_sets(&tasks, &index, &order);

        for (i, task) in tasks.iter().enumerate() {
            if let Some(Gate::Flag { task_id, .. }) = &task.gate {
                if index.contains_key(task_id) && !ancestors[i].contains(task_id) {
                    return Err(GraphError::InvalidGate {
                        task: task.id.clone(),
                        gate_task: task_id.clone(),
                    });
                }
            }
        }

        Ok(Self {
            name,
            tasks,
            index,
            order,
            ancestors,
        })
    }

    /// Returns the graph name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true if the graph has no tasks. Built graphs never are.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Returns whether a task with this id exists.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Returns a task by id.
    #[must_use]
    pub fn task(&self, id: &str) -> Option<&Task> {
        self.index.get(id).map(|&i| &self.tasks[i])
    }

    /// Returns the tasks in declaration order.
    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Returns the task ids in execution order.
    ///
    /// Every task appears after all its dependencies; among tasks whose
    /// dependencies are all placed, the earliest-declared goes first.
    #[must_use]
    pub fn topological_order(&self) -> Vec<&str> {
        self.order.iter().map(|&i| self.tasks[i].id.as_str()).collect()
    }

    /// Returns the tasks in execution order.
    pub fn tasks_in_order(&self) -> impl Iterator<Item = &Task> {
        self.order.iter().map(|&i| &self.tasks[i])
    }

    /// Returns every task upstream of `id`, directly or transitively.
    #[must_use]
    pub fn ancestors(&self, id: &str) -> Option<&BTreeSet<String>> {
        self.index.get(id).map(|&i| &self.ancestors[i])
    }

    /// Returns whether `ancestor` is upstream of `task`.
    #[must_use]
    pub fn is_ancestor(&self, ancestor: &str, task: &str) -> bool {
        self.ancestors(task)
            .is_some_and(|ancestors| ancestors.contains(ancestor))
    }

    /// Returns the ids of the tasks that directly depend on `id`, in
    /// declaration order.
    #[must_use]
    pub fn dependents(&self, id: &str) -> Vec<&str> {
        self.tasks
            .iter()
            .filter(|task| task.dependencies.iter().any(|dep| dep == id))
            .map(|task| task.id.as_str())
            .collect()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    Unvisited,
    Visiting,
    Visited,
}

/// Depth-first search with visiting/visited marking.
///
/// Returns the first cycle found, with its first task repeated at the end.
fn find_cycle(tasks: &[Task], index: &HashMap<String, usize>) -> Option<Vec<String>> {
    fn visit(
        node: usize,
        tasks: &[Task],
        index: &HashMap<String, usize>,
        colors: &mut [Color],
        path: &mut Vec<usize>,
    ) -> Option<Vec<String>> {
        colors[node] = Color::Visiting;
        path.push(node);

        for dep in &tasks[node].dependencies {
            let dep = index[dep];
            match colors[dep] {
                Color::Visited => {}
                Color::Visiting => {
                    let start = path.iter().position(|&n| n == dep).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        path[start..].iter().map(|&n| tasks[n].id.clone()).collect();
                    cycle.push(tasks[dep].id.clone());
                    return Some(cycle);
                }
                Color::Unvisited => {
                    if let Some(cycle) = visit(dep, tasks, index, colors, path) {
                        return Some(cycle);
                    }
                }
            }
        }

        path.pop();
        colors[node] = Color::Visited;
        None
    }

    let mut colors = vec![Color::Unvisited; tasks.len()];
    let mut path = Vec::new();

    // Visit in declaration order for deterministic reporting
    for node in 0..tasks.len() {
        if colors[node] == Color::Unvisited {
            if let Some(cycle) = visit(node, tasks, index, &mut colors, &mut path) {
                return Some(cycle);
            }
        }
    }
    None
}

/// Kahn's algorithm, always releasing the earliest-declared ready task.
///
/// Assumes the graph is acyclic.
fn topological_order(tasks: &[Task], index: &HashMap<String, usize>) -> Vec<usize> {
    let mut remaining: Vec<usize> = tasks.iter().map(|t| t.dependencies.len()).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); tasks.len()];
    for (i, task) in tasks.iter().enumerate() {
        for dep in &task.dependencies {
            dependents[index[dep]].push(i);
        }
    }

    let mut ready: BTreeSet<usize> = (0..tasks.len()).filter(|&i| remaining[i] == 0).collect();
    let mut order = Vec::with_capacity(tasks.len());

    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &child in &dependents[next] {
            remaining[child] -= 1;
            if remaining[child] == 0 {
                ready.insert(child);
            }
        }
    }

    order
}

fn ancestor_sets(
    tasks: &[Task],
    index: &HashMap<String, usize>,
    order: &[usize],
) -> Vec<BTreeSet<String>> {
    let mut ancestors: Vec<BTreeSet<String>> = vec![BTreeSet::new(); tasks.len()];
    for &node in order {
        let mut set = BTreeSet::new();
        for dep in &tasks[node].dependencies {
            set.insert(dep.clone());
            set.extend(ancestors[index[dep]].iter().cloned());
        }
        ancestors[node] = set;
    }
    ancestors
}
