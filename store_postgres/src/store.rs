use async_trait::async_trait;
use ballot_store::{
    AuditRecord, AuditStore, StoreError, TallyDelta, TallyRecord, TallyStore,
};
use ballot_types::VoterHash;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::time::Duration;
use tracing::{debug, info};

use crate::{schema, PostgresStoreError};

const UPSERT_LAW: &str = r#"
    INSERT INTO vote_results (law_id, oui_count, non_count, total_votes, updated_at)
    VALUES ($1, $2, $3, $4, NOW())
    ON CONFLICT (law_id) DO UPDATE SET
        oui_count = vote_results.oui_count + EXCLUDED.oui_count,
        non_count = vote_results.non_count + EXCLUDED.non_count,
        total_votes = vote_results.total_votes + EXCLUDED.total_votes,
        updated_at = NOW()
"#;

const UPSERT_CANDIDATE: &str = r#"
    INSERT INTO election_results (election_id, region_id, candidate_id, vote_count, updated_at)
    VALUES ($1, $2, $3, $4, NOW())
    ON CONFLICT (election_id, region_id, candidate_id) DO UPDATE SET
        vote_count = election_results.vote_count + EXCLUDED.vote_count,
        updated_at = NOW()
"#;

const UPSERT_DUPLICATE: &str = r#"
    INSERT INTO duplicate_attempts (vote_hash, attempt_count, first_attempt, last_attempt)
    VALUES ($1, 1, $2, $2)
    ON CONFLICT (vote_hash) DO UPDATE SET
        attempt_count = duplicate_attempts.attempt_count + 1,
        last_attempt = EXCLUDED.last_attempt
    RETURNING attempt_count
"#;

/// Connection pool sizing.
#[derive(Clone, Debug)]
pub struct PgPoolSettings {
    pub min_connections: u32,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PgPoolSettings {
    fn default() -> Self {
        Self {
            min_connections: 2,
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(FromRow)]
struct LawRow {
    law_id: String,
    oui_count: i64,
    non_count: i64,
    total_votes: i64,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct CandidateRow {
    election_id: i64,
    region_id: i64,
    candidate_id: i64,
    vote_count: i64,
    updated_at: DateTime<Utc>,
}

/// Audit log and tallies on one PostgreSQL database.
#[derive(Clone)]
pub struct PostgresStore {
    pub(crate) pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(url: &str, settings: &PgPoolSettings) -> Result<Self, PostgresStoreError> {
        let pool = PgPoolOptions::new()
            .min_connections(settings.min_connections)
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout)
            .connect(url)
            .await?;
        info!(
            min = settings.min_connections,
            max = settings.max_connections,
            "connected to postgres"
        );
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create tables and indexes if they do not exist.
    pub async fn migrate(&self) -> Result<(), PostgresStoreError> {
        for statement in schema::STATEMENTS {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| PostgresStoreError::Migration(e.to_string()))?;
        }
        debug!(statements = schema::STATEMENTS.len(), "schema ready");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn apply_deltas(&self, deltas: &[TallyDelta]) -> Result<(), PostgresStoreError> {
        let mut tx = self.pool.begin().await?;
        for delta in deltas {
            match delta {
                TallyDelta::Law { law_id, oui, non } => {
                    sqlx::query(UPSERT_LAW)
                        .bind(law_id)
                        .bind(oui)
                        .bind(non)
                        .bind(oui + non)
                        .execute(&mut *tx)
                        .await?;
                }
                TallyDelta::Candidate {
                    election_id,
                    region_id,
                    candidate_id,
                    count,
                } => {
                    sqlx::query(UPSERT_CANDIDATE)
                        .bind(election_id)
                        .bind(region_id)
                        .bind(candidate_id)
                        .bind(count)
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn load_totals(&self) -> Result<Vec<TallyRecord>, PostgresStoreError> {
        let laws: Vec<LawRow> = sqlx::query_as(
            "SELECT law_id, oui_count, non_count, total_votes, updated_at FROM vote_results ORDER BY law_id",
        )
        .fetch_all(&self.pool)
        .await?;
        let candidates: Vec<CandidateRow> = sqlx::query_as(
            "SELECT election_id, region_id, candidate_id, vote_count, updated_at FROM election_results \
             ORDER BY election_id, region_id, candidate_id",
        )
        .fetch_all(&self.pool)
        .await?;

        let laws = laws.into_iter().map(|row| TallyRecord::Law {
            law_id: row.law_id,
            oui_count: row.oui_count,
            non_count: row.non_count,
            total_votes: row.total_votes,
            updated_at: row.updated_at,
        });
        let candidates = candidates.into_iter().map(|row| TallyRecord::Candidate {
            election_id: row.election_id,
            region_id: row.region_id,
            candidate_id: row.candidate_id,
            vote_count: row.vote_count,
            updated_at: row.updated_at,
        });
        Ok(laws.chain(candidates).collect())
    }

    async fn ping_db(&self) -> Result<(), PostgresStoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl AuditStore for PostgresStore {
    async fn append(&self, record: &AuditRecord) -> Result<i64, StoreError> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO vote_audit (vote_hash, law_id, vote, status, timestamp, processed_at, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
        )
        .bind(record.vote_hash.as_str())
        .bind(&record.subject_id)
        .bind(&record.choice)
        .bind(record.status.as_str())
        .bind(record.event_timestamp)
        .bind(record.processed_at)
        .bind(&record.metadata)
        .fetch_one(&self.pool)
        .await
        .map_err(PostgresStoreError::from)?;
        Ok(id)
    }

    async fn record_duplicate_attempt(
        &self,
        hash: &VoterHash,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar(UPSERT_DUPLICATE)
            .bind(hash.as_str())
            .bind(at)
            .fetch_one(&self.pool)
            .await
            .map_err(PostgresStoreError::from)?;
        u64::try_from(count).map_err(|_| {
            PostgresStoreError::OutOfRange {
                field: "attempt_count",
                value: count,
            }
            .into()
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(self.ping_db().await?)
    }
}

#[async_trait]
impl TallyStore for PostgresStore {
    async fn apply(&self, deltas: &[TallyDelta]) -> Result<(), StoreError> {
        if deltas.is_empty() {
            return Ok(());
        }
        Ok(self.apply_deltas(deltas).await?)
    }

    async fn totals(&self) -> Result<Vec<TallyRecord>, StoreError> {
        Ok(self.load_totals().await?)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(self.ping_db().await?)
    }
}
