//! # Agent Hierarchy Rollup
//!
//! Pure tree construction and count aggregation for the agent hierarchy.
//! The database layer fetches one [`AgentCounts`] per node (the root and all
//! transitive descendants); this module assembles them into a tree and rolls
//! counts up, children before parents.
//!
//! ## Rollup Rule
//! ```text
//! node.assigned_with_children = node.assigned + Σ child.assigned_with_children
//! node.sold_with_children     = node.sold     + Σ child.sold_with_children
//! node.total_with_children    = assigned_with_children + sold_with_children
//! ```
//!
//! Summation over descendants is associative, so the totals a node reports
//! are identical no matter which ancestor the tree was queried from.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::types::AgentNode;

/// Per-node inventory counts before rollup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCounts {
    pub node: AgentNode,
    /// Units with `status = assigned` owned by this node.
    pub assigned_fastags: i64,
    /// Sale events attributed to this node.
    pub sold_fastags: i64,
}

impl AgentCounts {
    pub fn total_fastags(&self) -> i64 {
        self.assigned_fastags + self.sold_fastags
    }
}

/// One node of the assembled hierarchy tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyNode {
    pub node: AgentNode,
    pub assigned_fastags: i64,
    pub sold_fastags: i64,
    pub total_fastags: i64,
    pub assigned_fastags_with_children: i64,
    pub sold_fastags_with_children: i64,
    pub total_fastags_with_children: i64,
    pub children: Vec<HierarchyNode>,
}

/// Builds the rolled-up hierarchy tree rooted at `root_id`.
///
/// Input is the root plus any set of descendants (extra unrelated nodes are
/// ignored; they are simply never reached from the root). Children are
/// ordered by id for stable output. Returns `None` when the root is not in
/// the input.
///
/// A single adjacency map is built up front and the tree is assembled in one
/// post-order traversal, so construction is linear in the node count.
pub fn build_tree(root_id: i64, counts: Vec<AgentCounts>) -> Option<HierarchyNode> {
    let mut by_id: HashMap<i64, AgentCounts> = HashMap::with_capacity(counts.len());
    let mut children_of: HashMap<i64, Vec<i64>> = HashMap::new();

    for entry in counts {
        if let Some(parent) = entry.node.parent_user_id {
            children_of.entry(parent).or_default().push(entry.node.id);
        }
        by_id.insert(entry.node.id, entry);
    }

    for ids in children_of.values_mut() {
        ids.sort_unstable();
    }

    let mut placed = HashSet::new();
    assemble(root_id, &mut by_id, &children_of, &mut placed)
}

/// Post-order assembly. Each node is consumed from `by_id` exactly once, so
/// malformed (cyclic or duplicated) parent links cannot loop the traversal.
fn assemble(
    id: i64,
    by_id: &mut HashMap<i64, AgentCounts>,
    children_of: &HashMap<i64, Vec<i64>>,
    placed: &mut HashSet<i64>,
) -> Option<HierarchyNode> {
    let entry = by_id.remove(&id)?;
    placed.insert(id);

    let child_ids: Vec<i64> = children_of
        .get(&id)
        .map(|ids| {
            ids.iter()
                .copied()
                .filter(|c| !placed.contains(c))
                .collect()
        })
        .unwrap_or_default();

    let children: Vec<HierarchyNode> = child_ids
        .into_iter()
        .filter_map(|child| assemble(child, by_id, children_of, placed))
        .collect();

    let assigned_with_children = entry.assigned_fastags
        + children
            .iter()
            .map(|c| c.assigned_fastags_with_children)
            .sum::<i64>();
    let sold_with_children = entry.sold_fastags
        + children
            .iter()
            .map(|c| c.sold_fastags_with_children)
            .sum::<i64>();

    Some(HierarchyNode {
        total_fastags: entry.total_fastags(),
        assigned_fastags: entry.assigned_fastags,
        sold_fastags: entry.sold_fastags,
        assigned_fastags_with_children: assigned_with_children,
        sold_fastags_with_children: sold_with_children,
        total_fastags_with_children: assigned_with_children + sold_with_children,
        node: entry.node,
        children,
    })
}
