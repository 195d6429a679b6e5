//! Declared startup dependencies between subsystems.
//!
//! # Responsibilities
//! - Reject duplicate names, references to unknown names, and cycles
//! - Produce the startup order (a topological sort)
//!
//! # Design Decisions
//! - Among subsystems with no ordering constraint the declaration order wins,
//!   so logs read the same on every run
//! - Validation happens once, when the engine is constructed

use std::collections::HashMap;

use thiserror::Error;

/// Malformed dependency declarations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("subsystem {0} declared twice")]
    Duplicate(String),

    #[error("{node} depends on unknown subsystem {dependency}")]
    UnknownDependency { node: String, dependency: String },

    #[error("dependency cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),
}

/// A validated dependency DAG.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    names: Vec<String>,
    order: Vec<usize>,
}

impl DependencyGraph {
    /// Build a graph from `(name, dependencies)` pairs in declaration order.
    pub fn new<'a, I, D>(nodes: I) -> Result<Self, GraphError>
    where
        I: IntoIterator<Item = (&'a str, D)>,
        D: IntoIterator<Item = &'a str>,
    {
        let mut names = Vec::new();
        let mut raw_deps = Vec::new();
        let mut index = HashMap::new();

        for (name, deps) in nodes {
            if index.insert(name.to_string(), names.len()).is_some() {
                return Err(GraphError::Duplicate(name.to_string()));
            }
            names.push(name.to_string());
            raw_deps.push(deps.into_iter().map(str::to_string).collect::<Vec<_>>());
        }

        let mut deps: Vec<Vec<usize>> = Vec::with_capacity(names.len());
        for (node, node_deps) in raw_deps.iter().enumerate() {
            let mut resolved = Vec::with_capacity(node_deps.len());
            for dep in node_deps {
                match index.get(dep) {
                    Some(&i) => resolved.push(i),
                    None => {
                        return Err(GraphError::UnknownDependency {
                            node: names[node].clone(),
                            dependency: dep.clone(),
                        })
                    }
                }
            }
            deps.push(resolved);
        }

        let order = stable_topological_order(&deps).map_err(|remaining| {
            GraphError::Cycle(find_cycle(&deps, &remaining).into_iter().map(|i| names[i].clone()).collect())
        })?;

        Ok(Self { names, order })
    }

    /// Node indexes in startup order.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Node names in startup order.
    pub fn ordered_names(&self) -> Vec<&str> {
        self.order.iter().map(|&i| self.names[i].as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Kahn's algorithm, always taking the lowest declared index that is ready.
/// On a cycle returns the nodes that could not be placed.
fn stable_topological_order(deps: &[Vec<usize>]) -> Result<Vec<usize>, Vec<usize>> {
    let n = deps.len();
    let mut pending: Vec<usize> = deps.iter().map(Vec::len).collect();
    let mut dependents = vec![Vec::new(); n];
    for (node, node_deps) in deps.iter().enumerate() {
        for &d in node_deps {
            dependents[d].push(node);
        }
    }

    let mut placed = vec![false; n];
    let mut order = Vec::with_capacity(n);
    while order.len() < n {
        let Some(next) = (0..n).find(|&i| !placed[i] && pending[i] == 0) else {
            return Err((0..n).filter(|&i| !placed[i]).collect());
        };
        placed[next] = true;
        order.push(next);
        for &dependent in &dependents[next] {
            pending[dependent] -= 1;
        }
    }
    Ok(order)
}

/// Walk unplaced dependencies until a node repeats.
fn find_cycle(deps: &[Vec<usize>], remaining: &[usize]) -> Vec<usize> {
    let Some(&start) = remaining.first() else {
        return Vec::new();
    };
    let mut path = vec![start];
    let mut current = start;
    loop {
        let Some(&next) = deps[current].iter().find(|d| remaining.contains(d)) else {
            return path;
        };
        if let Some(pos) = path.iter().position(|&p| p == next) {
            let mut cycle = path.split_off(pos);
            cycle.push(next);
            return cycle;
        }
        path.push(next);
        current = next;
    }
}
