//! Entry point for administrative hierarchy edits and queries
//!
//! Every edit validates the relationship against the current graph under
//! the key's writer lock, writes the delta, republishes the graph and then
//! invalidates cached constraint sets for the touched roles.

use super::graph::RoleGraph;
use super::store::GraphStore;
use crate::error::{RbacError, Result};
use crate::sod::ConstraintSetStore;
use crate::types::{normalize, HierarchyOp, HierarchyType, Relationship};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

/// Hierarchy façade over `GraphStore`
#[derive(Clone)]
pub struct HierarchyCoordinator {
    graphs: Arc<GraphStore>,
    constraints: Arc<ConstraintSetStore>,
}

impl HierarchyCoordinator {
    pub fn new(graphs: Arc<GraphStore>, constraints: Arc<ConstraintSetStore>) -> Self {
        Self { graphs, constraints }
    }

    /// Current graph snapshot
    pub async fn graph(&self, hierarchy: HierarchyType, tenant: &str) -> Result<Arc<RoleGraph>> {
        self.graphs.get_graph(hierarchy, tenant).await
    }

    /// Add `child -> parent`.
    ///
    /// Fails if the edge is a self-relationship, already exists, or would
    /// make `child` its own ascendant.
    pub async fn add_edge(
        &self,
        hierarchy: HierarchyType,
        tenant: &str,
        child: &str,
        parent: &str,
    ) -> Result<()> {
        let relationship = Relationship::new(child, parent).normalized();

        let check = |graph: &RoleGraph| -> Result<()> {
            graph.validate_relationship(&relationship.child, &relationship.parent, false)?;
            if graph.is_parent(&relationship.parent, &relationship.child) {
                return Err(RbacError::CycleDetected {
                    child: relationship.child.clone(),
                    parent: relationship.parent.clone(),
                });
            }
            Ok(())
        };
        self.graphs
            .update_hierarchy_checked(hierarchy, tenant, &relationship, HierarchyOp::Add, check)
            .await?;

        self.invalidate(tenant, &relationship);
        info!("Added {} edge {} in tenant '{}'", hierarchy, relationship, tenant);
        Ok(())
    }

    /// Remove the direct edge `child -> parent`
    pub async fn remove_edge(
        &self,
        hierarchy: HierarchyType,
        tenant: &str,
        child: &str,
        parent: &str,
    ) -> Result<()> {
        let relationship = Relationship::new(child, parent).normalized();

        let check = |graph: &RoleGraph| -> Result<()> {
            graph.validate_relationship(&relationship.child, &relationship.parent, true)
        };
        self.graphs
            .update_hierarchy_checked(hierarchy, tenant, &relationship, HierarchyOp::Remove, check)
            .await?;

        self.invalidate(tenant, &relationship);
        info!("Removed {} edge {} in tenant '{}'", hierarchy, relationship, tenant);
        Ok(())
    }

    /// Detach a node before it is deleted.
    ///
    /// Fails while the node still has children; otherwise removes every edge
    /// to its parents. Unknown nodes are a no-op. The child count is checked
    /// again under the writer lock before each edge goes, so a child added
    /// mid-detach stops the removal.
    pub async fn remove_node(
        &self,
        hierarchy: HierarchyType,
        tenant: &str,
        node: &str,
    ) -> Result<()> {
        let node = normalize(node);
        let graph = self.graphs.get_graph(hierarchy, tenant).await?;
        ensure_leaf(&graph, &node)?;

        for parent in graph.parents(&node) {
            let relationship = Relationship::new(node.clone(), parent);
            let check = |graph: &RoleGraph| -> Result<()> {
                ensure_leaf(graph, &relationship.child)?;
                graph.validate_relationship(&relationship.child, &relationship.parent, true)
            };
            let detached = self
                .graphs
                .update_hierarchy_checked(
                    hierarchy,
                    tenant,
                    &relationship,
                    HierarchyOp::Remove,
                    check,
                )
                .await;

            match detached {
                Ok(_) => self.invalidate(tenant, &relationship),
                // Another writer already removed this edge
                Err(RbacError::RelationshipMissing { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        self.constraints.invalidate_role(tenant, &node);
        info!("Detached {} node {} in tenant '{}'", hierarchy, node, tenant);
        Ok(())
    }

    /// Validate a relationship without mutating
    pub async fn validate_relationship(
        &self,
        hierarchy: HierarchyType,
        tenant: &str,
        child: &str,
        parent: &str,
        must_exist: bool,
    ) -> Result<()> {
        self.graph(hierarchy, tenant)
            .await?
            .validate_relationship(child, parent, must_exist)
    }

    pub async fn is_parent(
        &self,
        hierarchy: HierarchyType,
        tenant: &str,
        child: &str,
        parent: &str,
    ) -> Result<bool> {
        Ok(self.graph(hierarchy, tenant).await?.is_parent(child, parent))
    }

    pub async fn parents(
        &self,
        hierarchy: HierarchyType,
        tenant: &str,
        node: &str,
    ) -> Result<BTreeSet<String>> {
        Ok(self.graph(hierarchy, tenant).await?.parents(node))
    }

    pub async fn children(
        &self,
        hierarchy: HierarchyType,
        tenant: &str,
        node: &str,
    ) -> Result<BTreeSet<String>> {
        Ok(self.graph(hierarchy, tenant).await?.children(node))
    }

    pub async fn num_children(
        &self,
        hierarchy: HierarchyType,
        tenant: &str,
        node: &str,
    ) -> Result<usize> {
        Ok(self.graph(hierarchy, tenant).await?.num_children(node))
    }

    pub async fn ascendants(
        &self,
        hierarchy: HierarchyType,
        tenant: &str,
        node: &str,
    ) -> Result<BTreeSet<String>> {
        Ok(self.graph(hierarchy, tenant).await?.ascendants(node))
    }

    pub async fn ascendants_until(
        &self,
        hierarchy: HierarchyType,
        tenant: &str,
        node: &str,
        stop: &str,
        inclusive: bool,
    ) -> Result<BTreeSet<String>> {
        Ok(self
            .graph(hierarchy, tenant)
            .await?
            .ascendants_until(node, stop, inclusive))
    }

    pub async fn descendants(
        &self,
        hierarchy: HierarchyType,
        tenant: &str,
        node: &str,
    ) -> Result<BTreeSet<String>> {
        Ok(self.graph(hierarchy, tenant).await?.descendants(node))
    }

    pub async fn descendants_until(
        &self,
        hierarchy: HierarchyType,
        tenant: &str,
        node: &str,
        stop: &str,
        inclusive: bool,
    ) -> Result<BTreeSet<String>> {
        Ok(self
            .graph(hierarchy, tenant)
            .await?
            .descendants_until(node, stop, inclusive))
    }

    /// Activated roles plus their ascendants in the given hierarchy
    pub async fn inherited_roles<I, S>(
        &self,
        hierarchy: HierarchyType,
        tenant: &str,
        roles: I,
    ) -> Result<BTreeSet<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(self.graph(hierarchy, tenant).await?.inherited_roles(roles))
    }

    fn invalidate(&self, tenant: &str, relationship: &Relationship) {
        self.constraints.invalidate_role(tenant, &relationship.child);
        self.constraints.invalidate_role(tenant, &relationship.parent);
    }
}

fn ensure_leaf(graph: &RoleGraph, node: &str) -> Result<()> {
    let children = graph.num_children(node);
    if children > 0 {
        return Err(RbacError::HasChildren {
            node: node.to_string(),
            children,
        });
    }
    Ok(())
}
