//! Job dependency graph
//!
//! An insertion-ordered arena of [`Job`]s plus a petgraph adjacency used
//! for structural validation: duplicate names, dangling `needs`
//! references, and cycles are all caught before emission, never at
//! string-matching time.

use crate::job::Job;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::debug;

/// Structural graph failures. All fatal to compilation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GraphError {
    #[error("job '{0}' is defined more than once")]
    DuplicateJob(String),

    #[error("job '{job}' depends on '{dependency}' which does not exist")]
    MissingDependency { job: String, dependency: String },

    #[error("cycle detected in job dependencies: {0}")]
    CycleDetected(String),

    #[error("job graph is empty")]
    EmptyGraph,
}

/// The DAG of execution jobs for one workflow.
#[derive(Debug, Clone, Default)]
pub struct JobGraph {
    jobs: Vec<Job>,
    index: HashMap<String, usize>,
}

impl JobGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a job. Names are unique within a graph.
    pub fn add_job(&mut self, job: Job) -> Result<(), GraphError> {
        if self.index.contains_key(&job.name) {
            return Err(GraphError::DuplicateJob(job.name));
        }
        self.index.insert(job.name.clone(), self.jobs.len());
        self.jobs.push(job);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Job> {
        self.index.get(name).map(|idx| &self.jobs[*idx])
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Jobs in insertion order, which is the emission order.
    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    /// All job names in insertion order.
    pub fn job_names(&self) -> Vec<&str> {
        self.jobs.iter().map(|j| j.name.as_str()).collect()
    }

    fn adjacency(&self) -> Result<(DiGraph<String, ()>, HashMap<String, NodeIndex>), GraphError> {
        let mut graph = DiGraph::new();
        let mut nodes = HashMap::new();
        for job in &self.jobs {
            let node = graph.add_node(job.name.clone());
            nodes.insert(job.name.clone(), node);
        }
        for job in &self.jobs {
            let to = nodes[&job.name];
            for dependency in &job.needs {
                let from = nodes
                    .get(dependency)
                    .ok_or_else(|| GraphError::MissingDependency {
                        job: job.name.clone(),
                        dependency: dependency.clone(),
                    })?;
                graph.add_edge(*from, to, ());
            }
        }
        Ok((graph, nodes))
    }

    /// Validate the structure: non-empty, no dangling needs, acyclic.
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.jobs.is_empty() {
            return Err(GraphError::EmptyGraph);
        }
        let (graph, _) = self.adjacency()?;
        if petgraph::algo::is_cyclic_directed(&graph) {
            return Err(GraphError::CycleDetected(self.find_cycle(&graph)));
        }
        debug!(jobs = self.jobs.len(), "job graph validated");
        Ok(())
    }

    /// Reconstruct one cycle path for the error message.
    fn find_cycle(&self, graph: &DiGraph<String, ()>) -> String {
        let mut visited = HashSet::new();
        let mut stack = Vec::new();
        for node in graph.node_indices() {
            if let Some(cycle) = Self::dfs_cycle(graph, node, &mut visited, &mut stack) {
                return cycle
                    .iter()
                    .map(|n| graph[*n].clone())
                    .collect::<Vec<_>>()
                    .join(" -> ");
            }
        }
        "unknown".to_string()
    }

    fn dfs_cycle(
        graph: &DiGraph<String, ()>,
        node: NodeIndex,
        visited: &mut HashSet<NodeIndex>,
        stack: &mut Vec<NodeIndex>,
    ) -> Option<Vec<NodeIndex>> {
        if let Some(pos) = stack.iter().position(|n| *n == node) {
            let mut cycle = stack[pos..].to_vec();
            cycle.push(node);
            return Some(cycle);
        }
        if !visited.insert(node) {
            return None;
        }
        stack.push(node);
        for neighbor in graph.neighbors_directed(node, Direction::Outgoing) {
            if let Some(cycle) = Self::dfs_cycle(graph, neighbor, visited, stack) {
                return Some(cycle);
            }
        }
        stack.pop();
        None
    }

    /// A valid topological order over job names. Requires a validated
    /// graph; emission itself uses insertion order.
    pub fn topological_order(&self) -> Result<Vec<String>, GraphError> {
        let (graph, _) = self.adjacency()?;
        petgraph::algo::toposort(&graph, None)
            .map(|order| order.into_iter().map(|n| graph[n].clone()).collect())
            .map_err(|cycle| GraphError::CycleDetected(graph[cycle.node_id()].clone()))
    }

    /// True when `job` transitively depends on `ancestor` via `needs`.
    pub fn depends_transitively(&self, job: &str, ancestor: &str) -> bool {
        let mut pending = vec![job.to_string()];
        let mut seen = HashSet::new();
        while let Some(current) = pending.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            let Some(current_job) = self.get(&current) else {
                continue;
            };
            for dependency in &current_job.needs {
                if dependency == ancestor {
                    return true;
                }
                pending.push(dependency.clone());
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(name: &str, needs: &[&str]) -> Job {
        Job::new(name, "ubuntu-latest").with_needs(needs)
    }

    #[test]
    fn test_add_and_validate() {
        let mut graph = JobGraph::new();
        graph.add_job(job("activation", &[])).unwrap();
        graph.add_job(job("agent", &["activation"])).unwrap();
        graph
            .add_job(job("conclusion", &["activation", "agent"]))
            .unwrap();
        graph.validate().unwrap();
        assert_eq!(graph.job_names(), vec!["activation", "agent", "conclusion"]);
    }

    #[test]
    fn test_duplicate_job_rejected() {
        let mut graph = JobGraph::new();
        graph.add_job(job("agent", &[])).unwrap();
        assert_eq!(
            graph.add_job(job("agent", &[])),
            Err(GraphError::DuplicateJob("agent".to_string()))
        );
    }

    #[test]
    fn test_dangling_dependency_rejected() {
        let mut graph = JobGraph::new();
        graph.add_job(job("agent", &["ghost"])).unwrap();
        assert!(matches!(
            graph.validate(),
            Err(GraphError::MissingDependency { ref dependency, .. }) if dependency == "ghost"
        ));
    }

    #[test]
    fn test_cycle_detected_with_path() {
        let mut graph = JobGraph::new();
        graph.add_job(job("a", &["b"])).unwrap();
        graph.add_job(job("b", &["a"])).unwrap();
        match graph.validate() {
            Err(GraphError::CycleDetected(path)) => assert!(path.contains("->")),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_topological_order_respects_needs() {
        let mut graph = JobGraph::new();
        graph.add_job(job("activation", &[])).unwrap();
        graph.add_job(job("agent", &["activation"])).unwrap();
        graph.add_job(job("create_issue", &["agent"])).unwrap();
        let order = graph.topological_order().unwrap();
        let pos = |name: &str| order.iter().position(|n| n == name).unwrap();
        assert!(pos("activation") < pos("agent"));
        assert!(pos("agent") < pos("create_issue"));
    }

    #[test]
    fn test_transitive_dependency() {
        let mut graph = JobGraph::new();
        graph.add_job(job("activation", &[])).unwrap();
        graph.add_job(job("agent", &["activation"])).unwrap();
        graph.add_job(job("create_issue", &["agent"])).unwrap();
        assert!(graph.depends_transitively("create_issue", "activation"));
        assert!(!graph.depends_transitively("activation", "create_issue"));
    }
}
