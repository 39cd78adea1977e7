//! # Agent Hierarchy Aggregator
//!
//! Per-agent and rolled-up inventory counts across the parent/child agent
//! tree.
//!
//! ## Data Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. WITH RECURSIVE closure over users.parent_user_id                   │
//! │     → the root and every transitive descendant (any depth)             │
//! │  2. assigned counts   GROUP BY assigned_to_agent_id (status=assigned)  │
//! │  3. ledger counts     fastag_sales rows credited per node              │
//! │  4. legacy fallback   sold units carrying sold_by_user_id directly     │
//! │                       that have NO ledger row (pre-ledger data)        │
//! │  5. fastag_core::hierarchy::build_tree → post-order rollup             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Attribution Policy
//! A ledger row credits `sold_by_user_id` when non-null, else
//! `sold_by_agent_id`. The unit-table fallback counts only serials absent
//! from the ledger, so backfilled or corrected serials are never counted
//! twice.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::schema::SchemaCapabilities;
use fastag_core::hierarchy::build_tree;
use fastag_core::{AgentCounts, AgentNode, HierarchyNode};

#[derive(Debug, sqlx::FromRow)]
struct CountRow {
    agent_id: i64,
    n: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct LedgerAttribution {
    sold_by_user_id: Option<i64>,
    sold_by_agent_id: Option<i64>,
}

/// Repository computing agent hierarchy rollups.
#[derive(Debug, Clone)]
pub struct HierarchyRepository {
    pool: SqlitePool,
    caps: Arc<SchemaCapabilities>,
}

impl HierarchyRepository {
    /// Creates a new HierarchyRepository.
    pub fn new(pool: SqlitePool, caps: Arc<SchemaCapabilities>) -> Self {
        HierarchyRepository { pool, caps }
    }

    /// Builds the rolled-up hierarchy tree rooted at `root_agent_id`.
    ///
    /// Totals are stable under the query point: querying any ancestor yields
    /// identical subtree totals, because rollup is a plain post-order sum.
    pub async fn get_agent_hierarchy(&self, root_agent_id: i64) -> DbResult<HierarchyNode> {
        let nodes = self.fetch_subtree(root_agent_id).await?;
        if nodes.is_empty() {
            return Err(DbError::not_found("Agent", root_agent_id.to_string()));
        }

        let ids: Vec<i64> = nodes.iter().map(|n| n.id).collect();
        let assigned = self.assigned_counts(&ids).await?;
        let sold = self.sold_counts(&ids).await?;

        let counts: Vec<AgentCounts> = nodes
            .into_iter()
            .map(|node| AgentCounts {
                assigned_fastags: assigned.get(&node.id).copied().unwrap_or(0),
                sold_fastags: sold.get(&node.id).copied().unwrap_or(0),
                node,
            })
            .collect();

        debug!(root = root_agent_id, nodes = counts.len(), "Hierarchy counts fetched");

        build_tree(root_agent_id, counts)
            .ok_or_else(|| DbError::Internal("hierarchy root missing from its own subtree".into()))
    }

    /// The root and all transitive descendants. UNION (not UNION ALL)
    /// deduplicates, so even malformed cyclic data terminates.
    async fn fetch_subtree(&self, root: i64) -> DbResult<Vec<AgentNode>> {
        let nodes = sqlx::query_as::<_, AgentNode>(
            "WITH RECURSIVE tree AS ( \
                 SELECT id, name, role, parent_user_id FROM users WHERE id = ?1 \
                 UNION \
                 SELECT u.id, u.name, u.role, u.parent_user_id \
                 FROM users u JOIN tree ON u.parent_user_id = tree.id \
             ) \
             SELECT id, name, role, parent_user_id FROM tree",
        )
        .bind(root)
        .fetch_all(&self.pool)
        .await?;
        Ok(nodes)
    }

    async fn assigned_counts(&self, ids: &[i64]) -> DbResult<HashMap<i64, i64>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT assigned_to_agent_id AS agent_id, COUNT(*) AS n FROM fastags \
             WHERE status = 'assigned' AND assigned_to_agent_id IN (",
        );
        push_id_list(&mut qb, ids);
        qb.push(") GROUP BY assigned_to_agent_id");

        let rows: Vec<CountRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|r| (r.agent_id, r.n)).collect())
    }

    /// Sale counts per node: ledger attribution plus the legacy unit-table
    /// fallback for serials the ledger has never seen.
    async fn sold_counts(&self, ids: &[i64]) -> DbResult<HashMap<i64, i64>> {
        let id_set: HashSet<i64> = ids.iter().copied().collect();
        let mut counts: HashMap<i64, i64> = HashMap::new();

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT sold_by_user_id, sold_by_agent_id FROM fastag_sales \
             WHERE sold_by_user_id IN (",
        );
        push_id_list(&mut qb, ids);
        qb.push(") OR sold_by_agent_id IN (");
        push_id_list(&mut qb, ids);
        qb.push(")");

        let rows: Vec<LedgerAttribution> = qb.build_query_as().fetch_all(&self.pool).await?;
        for row in rows {
            let credited = row.sold_by_user_id.or(row.sold_by_agent_id);
            if let Some(node) = credited.filter(|id| id_set.contains(id)) {
                *counts.entry(node).or_insert(0) += 1;
            }
        }

        // Pre-ledger data: sold units still carrying the seller id directly,
        // with no ledger row for their serial.
        if self.caps.has_unit_sold_by_user_id() {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "SELECT sold_by_user_id AS agent_id, COUNT(*) AS n FROM fastags \
                 WHERE status = 'sold' AND sold_by_user_id IN (",
            );
            push_id_list(&mut qb, ids);
            qb.push(
                ") AND NOT EXISTS (SELECT 1 FROM fastag_sales \
                 WHERE fastag_sales.tag_serial = fastags.tag_serial) \
                 GROUP BY sold_by_user_id",
            );

            let rows: Vec<CountRow> = qb.build_query_as().fetch_all(&self.pool).await?;
            for row in rows {
                *counts.entry(row.agent_id).or_insert(0) += row.n;
            }
        }

        Ok(counts)
    }
}

fn push_id_list(qb: &mut QueryBuilder<'_, Sqlite>, ids: &[i64]) {
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use fastag_core::TransferRequest;

    async fn seed_admin_manager_agent(db: &crate::Database) {
        testutil::seed_user(db, 1, "Head Office", "admin", None).await;
        testutil::seed_user(db, 2, "Regional Manager", "manager", Some(1)).await;
        testutil::seed_user(db, 3, "Field Agent", "agent", Some(2)).await;
    }

    /// Agent 3 holds 5 assigned and has sold 3; Manager 2 holds 2 assigned.
    async fn seed_scenario_counts(db: &crate::Database) {
        let agent_serials: Vec<String> = (0..8).map(|i| format!("AG-{i}")).collect();
        let manager_serials = ["MG-0".to_string(), "MG-1".to_string()];
        let all: Vec<&str> = agent_serials
            .iter()
            .chain(manager_serials.iter())
            .map(String::as_str)
            .collect();
        testutil::seed_units(db, &all, "LIVQUIK", "class4", "B1").await;

        db.transfers()
            .bulk_transfer(&[
                TransferRequest {
                    from_owner: "admin".to_string(),
                    to_owner: "3".to_string(),
                    tag_serials: agent_serials.clone(),
                    note: None,
                },
                TransferRequest {
                    from_owner: "admin".to_string(),
                    to_owner: "2".to_string(),
                    tag_serials: manager_serials.to_vec(),
                    note: None,
                },
            ])
            .await
            .unwrap();

        db.sales()
            .bulk_mark_sold(
                &["AG-0".to_string(), "AG-1".to_string(), "AG-2".to_string()],
                None,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_three_level_rollup() {
        let db = testutil::test_db().await;
        seed_admin_manager_agent(&db).await;
        seed_scenario_counts(&db).await;

        let tree = db.hierarchy().get_agent_hierarchy(1).await.unwrap();
        assert_eq!(tree.node.id, 1);
        assert_eq!(tree.assigned_fastags, 0);

        let manager = &tree.children[0];
        assert_eq!(manager.node.id, 2);
        assert_eq!(manager.assigned_fastags, 2);
        assert_eq!(manager.sold_fastags, 0);
        assert_eq!(manager.assigned_fastags_with_children, 2 + 5);
        assert_eq!(manager.sold_fastags_with_children, 0 + 3);
        assert_eq!(manager.total_fastags_with_children, 10);

        let agent = &manager.children[0];
        assert_eq!(agent.node.id, 3);
        assert_eq!(agent.assigned_fastags, 5);
        assert_eq!(agent.sold_fastags, 3);
        assert_eq!(agent.total_fastags, 8);

        // Root sees everything.
        assert_eq!(tree.total_fastags_with_children, 10);
    }

    #[tokio::test]
    async fn test_totals_identical_from_any_ancestor() {
        let db = testutil::test_db().await;
        seed_admin_manager_agent(&db).await;
        seed_scenario_counts(&db).await;

        let from_admin = db.hierarchy().get_agent_hierarchy(1).await.unwrap();
        let from_manager = db.hierarchy().get_agent_hierarchy(2).await.unwrap();
        let from_agent = db.hierarchy().get_agent_hierarchy(3).await.unwrap();

        let agent_via_admin = &from_admin.children[0].children[0];
        let agent_via_manager = &from_manager.children[0];

        for view in [agent_via_admin, agent_via_manager, &from_agent] {
            assert_eq!(view.assigned_fastags_with_children, 5);
            assert_eq!(view.sold_fastags_with_children, 3);
        }
        assert_eq!(
            from_admin.children[0].total_fastags_with_children,
            from_manager.total_fastags_with_children
        );
    }

    #[tokio::test]
    async fn test_attribution_precedence_policy() {
        let db = testutil::test_db().await;
        seed_admin_manager_agent(&db).await;

        // Ledger row carrying BOTH ids credits only the user-facing seller.
        testutil::seed_units(&db, &["PR-1"], "LIVQUIK", "class4", "B1").await;
        testutil::force_unit_sold(&db, "PR-1", None).await;
        testutil::seed_sale_row_full(&db, "PR-1", Some(2), Some(3), None).await;

        // Pre-ledger unit: sold, seller id directly on the unit, NO ledger
        // row. Counts through the fallback.
        testutil::seed_units(&db, &["PR-2"], "LIVQUIK", "class4", "B1").await;
        testutil::force_unit_sold(&db, "PR-2", Some(3)).await;

        // Sold unit WITH a ledger row: the unit mirror must not double count.
        testutil::seed_units(&db, &["PR-3"], "LIVQUIK", "class4", "B1").await;
        testutil::force_unit_sold(&db, "PR-3", Some(3)).await;
        testutil::seed_sale_row_full(&db, "PR-3", Some(3), None, None).await;

        let tree = db.hierarchy().get_agent_hierarchy(1).await.unwrap();
        let manager = &tree.children[0];
        let agent = &manager.children[0];

        // Manager: PR-1's ledger row only.
        assert_eq!(manager.sold_fastags, 1);
        // Agent: PR-2 (fallback) + PR-3 (ledger), PR-1 NOT credited here.
        assert_eq!(agent.sold_fastags, 2);
        assert_eq!(tree.sold_fastags_with_children, 3);
    }

    #[tokio::test]
    async fn test_agent_not_found() {
        let db = testutil::test_db().await;
        let err = db.hierarchy().get_agent_hierarchy(404).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_forest_sibling_isolation() {
        let db = testutil::test_db().await;
        testutil::seed_user(&db, 1, "Root A", "admin", None).await;
        testutil::seed_user(&db, 2, "Root B", "admin", None).await;
        testutil::seed_user(&db, 3, "A's agent", "agent", Some(1)).await;

        testutil::seed_units(&db, &["FS-1"], "LIVQUIK", "class4", "B1").await;
        db.transfers()
            .bulk_transfer(&[TransferRequest {
                from_owner: "admin".to_string(),
                to_owner: "3".to_string(),
                tag_serials: vec!["FS-1".to_string()],
                note: None,
            }])
            .await
            .unwrap();

        let tree_b = db.hierarchy().get_agent_hierarchy(2).await.unwrap();
        assert_eq!(tree_b.total_fastags_with_children, 0);
        assert!(tree_b.children.is_empty());
    }
}
