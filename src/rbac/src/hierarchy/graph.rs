//! In-memory role/OU graph and its traversal queries
//!
//! A `RoleGraph` is an adjacency list built from a persisted `Hierarchy`.
//! Each node keeps its out-edges (parents) and in-edges (children). An edge
//! `child -> parent` means the child inherits from the parent.
//!
//! Graphs are immutable once built. `GraphStore` publishes them behind an
//! `Arc`, so every query here runs against a private snapshot.
//!
//! All names are normalized on entry. Unknown nodes yield empty results;
//! only `validate_relationship` returns errors.

use crate::error::{RbacError, Result};
use crate::types::{normalize, Hierarchy, Relationship};
use std::collections::{BTreeSet, HashMap};

/// Graph node with its direct neighbours
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct GraphNode {
    /// Out-neighbours: nodes this node inherits from
    parents: BTreeSet<String>,

    /// In-neighbours: nodes inheriting from this node
    children: BTreeSet<String>,
}

/// Directed acyclic graph of one hierarchy
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleGraph {
    nodes: HashMap<String, GraphNode>,
}

impl RoleGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }

    /// Build a graph from a persisted hierarchy.
    ///
    /// Both endpoints of every edge become nodes, in canonical case.
    pub fn from_hierarchy(hierarchy: &Hierarchy) -> Self {
        let mut graph = Self::new();
        for relationship in &hierarchy.relationships {
            graph.insert_edge(&relationship.child, &relationship.parent);
        }
        graph
    }

    fn insert_edge(&mut self, child: &str, parent: &str) {
        let child = normalize(child);
        let parent = normalize(parent);

        self.nodes
            .entry(child.clone())
            .or_default()
            .parents
            .insert(parent.clone());
        self.nodes.entry(parent).or_default().children.insert(child);
    }

    /// Whether the node exists
    pub fn contains(&self, node: &str) -> bool {
        self.nodes.contains_key(&normalize(node))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|n| n.parents.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All edges, sorted
    pub fn edges(&self) -> Vec<Relationship> {
        let mut edges: Vec<Relationship> = self
            .nodes
            .iter()
            .flat_map(|(child, node)| {
                node.parents
                    .iter()
                    .map(move |parent| Relationship::new(child.clone(), parent.clone()))
            })
            .collect();
        edges.sort();
        edges
    }

    /// Whether the exact direct edge `child -> parent` is present
    pub fn has_edge(&self, child: &str, parent: &str) -> bool {
        self.nodes
            .get(&normalize(child))
            .map(|n| n.parents.contains(&normalize(parent)))
            .unwrap_or(false)
    }

    /// Direct parents of a node
    pub fn parents(&self, node: &str) -> BTreeSet<String> {
        self.nodes
            .get(&normalize(node))
            .map(|n| n.parents.clone())
            .unwrap_or_default()
    }

    /// Direct children of a node
    pub fn children(&self, node: &str) -> BTreeSet<String> {
        self.nodes
            .get(&normalize(node))
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    /// In-degree of a node; zero for unknown nodes
    pub fn num_children(&self, node: &str) -> usize {
        self.nodes
            .get(&normalize(node))
            .map(|n| n.children.len())
            .unwrap_or(0)
    }

    /// Transitive closure of `parents`
    pub fn ascendants(&self, node: &str) -> BTreeSet<String> {
        let mut acc = BTreeSet::new();
        self.walk(&normalize(node), Direction::Up, None, &mut acc);
        acc
    }

    /// Transitive closure of `children`
    pub fn descendants(&self, node: &str) -> BTreeSet<String> {
        let mut acc = BTreeSet::new();
        self.walk(&normalize(node), Direction::Down, None, &mut acc);
        acc
    }

    /// Ascendant walk that does not expand past `stop`.
    ///
    /// `stop` is only added to the result when `inclusive` is set. Other
    /// branches keep being walked.
    pub fn ascendants_until(&self, node: &str, stop: &str, inclusive: bool) -> BTreeSet<String> {
        let mut acc = BTreeSet::new();
        let stop = Stop {
            node: normalize(stop),
            inclusive,
        };
        self.walk(&normalize(node), Direction::Up, Some(&stop), &mut acc);
        acc
    }

    /// Descendant walk that does not expand past `stop`
    pub fn descendants_until(&self, node: &str, stop: &str, inclusive: bool) -> BTreeSet<String> {
        let mut acc = BTreeSet::new();
        let stop = Stop {
            node: normalize(stop),
            inclusive,
        };
        self.walk(&normalize(node), Direction::Down, Some(&stop), &mut acc);
        acc
    }

    /// Whether `parent` is an ascendant of `child`
    pub fn is_parent(&self, child: &str, parent: &str) -> bool {
        let parent = normalize(parent);
        // Bounded walk: reaching the target is enough.
        self.ascendants_until(child, &parent, true).contains(&parent)
    }

    /// Activated roles plus all of their ascendants
    pub fn inherited_roles<I, S>(&self, roles: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut acc = BTreeSet::new();
        for role in roles {
            let role = normalize(role.as_ref());
            if role.is_empty() {
                continue;
            }
            self.walk(&role, Direction::Up, None, &mut acc);
            acc.insert(role);
        }
        acc
    }

    /// Nodes plus all of their descendants
    pub fn inherited_descendants<I, S>(&self, nodes: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut acc = BTreeSet::new();
        for node in nodes {
            let node = normalize(node.as_ref());
            if node.is_empty() {
                continue;
            }
            self.walk(&node, Direction::Down, None, &mut acc);
            acc.insert(node);
        }
        acc
    }

    /// Gate for every hierarchy edit.
    ///
    /// Checks, in order:
    /// 1. `child` and `parent` differ
    /// 2. with `must_exist`, the direct edge is present
    /// 3. without `must_exist`, the direct edge is absent
    pub fn validate_relationship(&self, child: &str, parent: &str, must_exist: bool) -> Result<()> {
        let child = normalize(child);
        let parent = normalize(parent);

        if child.is_empty() || parent.is_empty() {
            return Err(RbacError::InvalidInput(
                "relationship endpoints cannot be empty".to_string(),
            ));
        }

        if child == parent {
            return Err(RbacError::SelfRelationship(child));
        }

        let exists = self.has_edge(&child, &parent);
        if must_exist && !exists {
            return Err(RbacError::RelationshipMissing { child, parent });
        }
        if !must_exist && exists {
            return Err(RbacError::RelationshipExists { child, parent });
        }

        Ok(())
    }

    /// Depth-first walk accumulating into `acc`.
    ///
    /// Nodes already in `acc` are not expanded again, which collapses
    /// diamonds. Acyclicity bounds the recursion depth.
    fn walk(
        &self,
        node: &str,
        direction: Direction,
        stop: Option<&Stop>,
        acc: &mut BTreeSet<String>,
    ) {
        let Some(graph_node) = self.nodes.get(node) else {
            return;
        };

        let next = match direction {
            Direction::Up => &graph_node.parents,
            Direction::Down => &graph_node.children,
        };

        for neighbour in next {
            if let Some(stop) = stop {
                if *neighbour == stop.node {
                    if stop.inclusive {
                        acc.insert(neighbour.clone());
                    }
                    continue;
                }
            }

            if acc.insert(neighbour.clone()) {
                self.walk(neighbour, direction, stop, acc);
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Up,
    Down,
}

struct Stop {
    node: String,
    inclusive: bool,
}
