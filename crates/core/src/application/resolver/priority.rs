// Priority Resolver
//
// Assigns scheduler priority weights from intra-project graph depth:
// roots run first, each level below loses a fixed gap. Only Intra
// edges count; cross-project and external upstreams do not slow a job
// down locally.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use tracing::warn;

use crate::domain::{JobId, ResolvedDependency, ResolvedJobSpec};

/// Weight of a job with no local upstreams.
pub const MAX_PRIORITY_WEIGHT: i32 = 10_000;

/// Weight lost per depth level.
pub const PRIORITY_WEIGHT_GAP: i32 = 10;

/// Weight floor; cycle participants land here too.
pub const MIN_PRIORITY_WEIGHT: i32 = 0;

pub struct PriorityResolver;

impl PriorityResolver {
    pub fn new() -> Self {
        Self
    }

    /// Weight per job id. Depth is the longest Intra path from any
    /// root; ties drain in lexical job-name order so runs are
    /// reproducible. Cycle participants are logged and floored.
    pub fn resolve(&self, resolved: &[ResolvedJobSpec]) -> HashMap<JobId, i32> {
        let mut graph: DiGraph<JobId, ()> = DiGraph::new();
        let mut index_map: HashMap<JobId, NodeIndex> = HashMap::new();
        let mut names: HashMap<JobId, String> = HashMap::new();

        for spec in resolved {
            let index = graph.add_node(spec.job.id);
            index_map.insert(spec.job.id, index);
            names.insert(spec.job.id, spec.job.name.clone());
        }
        for spec in resolved {
            for dependency in &spec.dependencies {
                if let ResolvedDependency::Intra { job_id, .. } = dependency {
                    if let (Some(&upstream), Some(&downstream)) =
                        (index_map.get(job_id), index_map.get(&spec.job.id))
                    {
                        if upstream != downstream {
                            graph.update_edge(upstream, downstream, ());
                        }
                    }
                }
            }
        }

        let mut indegree: HashMap<NodeIndex, usize> = graph
            .node_indices()
            .map(|index| (index, graph.neighbors_directed(index, Direction::Incoming).count()))
            .collect();

        // Kahn's algorithm; the heap keys on job name for determinism.
        let mut ready: BinaryHeap<Reverse<(String, usize)>> = graph
            .node_indices()
            .filter(|index| indegree[index] == 0)
            .map(|index| Reverse((names[&graph[index]].clone(), index.index())))
            .collect();

        let mut depth: HashMap<NodeIndex, i32> = HashMap::new();
        let mut priorities: HashMap<JobId, i32> = HashMap::new();

        while let Some(Reverse((_, raw_index))) = ready.pop() {
            let index = NodeIndex::new(raw_index);
            let node_depth = depth.get(&index).copied().unwrap_or(0);
            priorities.insert(
                graph[index],
                (MAX_PRIORITY_WEIGHT - node_depth * PRIORITY_WEIGHT_GAP).max(MIN_PRIORITY_WEIGHT),
            );
            for neighbor in graph.neighbors_directed(index, Direction::Outgoing) {
                let entry = depth.entry(neighbor).or_insert(0);
                *entry = (*entry).max(node_depth + 1);
                if let Some(remaining) = indegree.get_mut(&neighbor) {
                    *remaining -= 1;
                    if *remaining == 0 {
                        ready.push(Reverse((names[&graph[neighbor]].clone(), neighbor.index())));
                    }
                }
            }
        }

        if priorities.len() < graph.node_count() {
            let mut cycle_members: Vec<String> = graph
                .node_indices()
                .filter(|index| !priorities.contains_key(&graph[*index]))
                .map(|index| names[&graph[index]].clone())
                .collect();
            cycle_members.sort();
            warn!(jobs = ?cycle_members, "dependency cycle detected, flooring priority");
            for index in graph.node_indices() {
                priorities.entry(graph[index]).or_insert(MIN_PRIORITY_WEIGHT);
            }
        }

        priorities
    }
}

impl Default for PriorityResolver {
    fn default() -> Self {
        Self::new()
    }
}
