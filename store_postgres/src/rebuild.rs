//! Recompute tallies from the audit log.
//!
//! The audit log is the durable record of every accepted vote; tallies are
//! derived data. This replaces `vote_results` and `election_results` with
//! counts of distinct `validated` hashes, in one transaction.

use tracing::info;

use crate::{PostgresStore, PostgresStoreError};

const REBUILD_LAWS: &str = r#"
    INSERT INTO vote_results (law_id, oui_count, non_count, total_votes, updated_at)
    SELECT law_id,
           COUNT(DISTINCT vote_hash) FILTER (WHERE vote = 'oui'),
           COUNT(DISTINCT vote_hash) FILTER (WHERE vote = 'non'),
           COUNT(DISTINCT vote_hash),
           NOW()
    FROM vote_audit
    WHERE status = 'validated' AND COALESCE(metadata->>'kind', 'law') = 'law'
    GROUP BY law_id
"#;

const REBUILD_CANDIDATES: &str = r#"
    INSERT INTO election_results (election_id, region_id, candidate_id, vote_count, updated_at)
    SELECT (metadata->>'election_id')::BIGINT,
           (metadata->>'region_id')::BIGINT,
           (metadata->>'candidate_id')::BIGINT,
           COUNT(DISTINCT vote_hash),
           NOW()
    FROM vote_audit
    WHERE status = 'validated' AND metadata->>'kind' = 'election'
    GROUP BY 1, 2, 3
"#;

/// Rows written by a rebuild.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RebuildSummary {
    pub laws: u64,
    pub candidates: u64,
}

impl PostgresStore {
    pub async fn rebuild_tallies(&self) -> Result<RebuildSummary, PostgresStoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM vote_results")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM election_results")
            .execute(&mut *tx)
            .await?;
        let laws = sqlx::query(REBUILD_LAWS)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let candidates = sqlx::query(REBUILD_CANDIDATES)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;

        info!(laws, candidates, "tallies rebuilt from audit log");
        Ok(RebuildSummary { laws, candidates })
    }
}
