//! Idempotent schema bootstrap.

/// Executed in order on startup. Every statement is safe to re-run.
pub const STATEMENTS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS vote_audit (
        id BIGSERIAL PRIMARY KEY,
        vote_hash TEXT NOT NULL,
        law_id TEXT NOT NULL,
        vote TEXT NOT NULL,
        status VARCHAR(16) NOT NULL,
        timestamp TIMESTAMPTZ NOT NULL,
        processed_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        metadata JSONB NOT NULL DEFAULT '{}'::jsonb
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_vote_audit_hash ON vote_audit (vote_hash)",
    "CREATE INDEX IF NOT EXISTS idx_vote_audit_status ON vote_audit (status)",
    r#"CREATE TABLE IF NOT EXISTS vote_results (
        law_id TEXT PRIMARY KEY,
        oui_count BIGINT NOT NULL DEFAULT 0,
        non_count BIGINT NOT NULL DEFAULT 0,
        total_votes BIGINT NOT NULL DEFAULT 0,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
    r#"CREATE TABLE IF NOT EXISTS election_results (
        election_id BIGINT NOT NULL,
        region_id BIGINT NOT NULL,
        candidate_id BIGINT NOT NULL,
        vote_count BIGINT NOT NULL DEFAULT 0,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (election_id, region_id, candidate_id)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS duplicate_attempts (
        vote_hash TEXT PRIMARY KEY,
        attempt_count BIGINT NOT NULL DEFAULT 1,
        first_attempt TIMESTAMPTZ NOT NULL,
        last_attempt TIMESTAMPTZ NOT NULL
    )"#,
];
