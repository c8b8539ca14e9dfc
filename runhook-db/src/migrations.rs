//! Schema for the run graph tables

use sqlx::PgPool;
use tracing::info;

use crate::error::DbResult;

const TABLES: &[(&str, &str)] = &[
    (
        "organizations",
        r#"
        CREATE TABLE IF NOT EXISTS organizations (
            id TEXT PRIMARY KEY,
            slug TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "runtime_environments",
        r#"
        CREATE TABLE IF NOT EXISTS runtime_environments (
            id TEXT PRIMARY KEY,
            slug TEXT NOT NULL,
            api_key TEXT NOT NULL UNIQUE,
            kind TEXT NOT NULL DEFAULT 'DEVELOPMENT',
            organization_id TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "endpoints",
        r#"
        CREATE TABLE IF NOT EXISTS endpoints (
            id TEXT PRIMARY KEY,
            slug TEXT NOT NULL,
            url TEXT NOT NULL,
            environment_id TEXT NOT NULL REFERENCES runtime_environments(id) ON DELETE CASCADE,
            organization_id TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "external_accounts",
        r#"
        CREATE TABLE IF NOT EXISTS external_accounts (
            id TEXT PRIMARY KEY,
            identifier TEXT NOT NULL,
            metadata JSONB,
            environment_id TEXT NOT NULL REFERENCES runtime_environments(id) ON DELETE CASCADE,
            organization_id TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "jobs",
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id TEXT PRIMARY KEY,
            slug TEXT NOT NULL,
            title TEXT NOT NULL,
            internal BOOLEAN NOT NULL DEFAULT FALSE,
            organization_id TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "job_versions",
        r#"
        CREATE TABLE IF NOT EXISTS job_versions (
            id TEXT PRIMARY KEY,
            version TEXT NOT NULL,
            event_specification JSONB NOT NULL DEFAULT '{}'::jsonb,
            job_id TEXT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
            endpoint_id TEXT NOT NULL REFERENCES endpoints(id) ON DELETE CASCADE,
            environment_id TEXT NOT NULL REFERENCES runtime_environments(id) ON DELETE CASCADE,
            organization_id TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "event_records",
        r#"
        CREATE TABLE IF NOT EXISTS event_records (
            id TEXT PRIMARY KEY,
            event_id TEXT NOT NULL,
            name TEXT NOT NULL,
            source TEXT NOT NULL DEFAULT 'trigger.dev',
            payload JSONB NOT NULL,
            context JSONB,
            timestamp TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            delivered_at TIMESTAMPTZ,
            environment_id TEXT NOT NULL REFERENCES runtime_environments(id) ON DELETE CASCADE,
            organization_id TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "integrations",
        r#"
        CREATE TABLE IF NOT EXISTS integrations (
            id TEXT PRIMARY KEY,
            slug TEXT NOT NULL,
            title TEXT,
            organization_id TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "secret_references",
        r#"
        CREATE TABLE IF NOT EXISTS secret_references (
            id TEXT PRIMARY KEY,
            key TEXT NOT NULL UNIQUE,
            provider TEXT NOT NULL DEFAULT 'DATABASE',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "integration_connections",
        r#"
        CREATE TABLE IF NOT EXISTS integration_connections (
            id TEXT PRIMARY KEY,
            connection_type TEXT NOT NULL DEFAULT 'DEVELOPER',
            metadata JSONB,
            scopes TEXT[] NOT NULL DEFAULT '{}',
            expires_at TIMESTAMPTZ,
            integration_id TEXT NOT NULL REFERENCES integrations(id) ON DELETE CASCADE,
            organization_id TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
            data_reference_id TEXT NOT NULL REFERENCES secret_references(id),
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "job_runs",
        r#"
        CREATE TABLE IF NOT EXISTS job_runs (
            id TEXT PRIMARY KEY,
            number INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'PENDING',
            environment_id TEXT NOT NULL REFERENCES runtime_environments(id) ON DELETE CASCADE,
            endpoint_id TEXT NOT NULL REFERENCES endpoints(id) ON DELETE CASCADE,
            organization_id TEXT NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
            external_account_id TEXT REFERENCES external_accounts(id) ON DELETE SET NULL,
            event_id TEXT NOT NULL REFERENCES event_records(id) ON DELETE CASCADE,
            version_id TEXT NOT NULL REFERENCES job_versions(id) ON DELETE CASCADE,
            output JSONB,
            properties JSONB,
            started_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "run_connections",
        r#"
        CREATE TABLE IF NOT EXISTS run_connections (
            id TEXT PRIMARY KEY,
            key TEXT NOT NULL,
            auth_source TEXT NOT NULL DEFAULT 'HOSTED',
            run_id TEXT NOT NULL REFERENCES job_runs(id) ON DELETE CASCADE,
            integration_id TEXT NOT NULL REFERENCES integrations(id) ON DELETE CASCADE,
            connection_id TEXT REFERENCES integration_connections(id) ON DELETE SET NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "tasks",
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY,
            run_id TEXT NOT NULL REFERENCES job_runs(id) ON DELETE CASCADE,
            parent_id TEXT REFERENCES tasks(id) ON DELETE CASCADE,
            idempotency_key TEXT NOT NULL,
            display_key TEXT,
            name TEXT NOT NULL,
            icon TEXT,
            status TEXT NOT NULL DEFAULT 'PENDING',
            no_op BOOLEAN NOT NULL DEFAULT FALSE,
            params JSONB,
            output JSONB,
            error TEXT,
            delay_until TIMESTAMPTZ,
            started_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (run_id, idempotency_key)
        )
        "#,
    ),
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_job_runs_environment ON job_runs(environment_id, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_job_runs_status ON job_runs(status)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_run ON tasks(run_id)",
    "CREATE INDEX IF NOT EXISTS idx_run_connections_run ON run_connections(run_id)",
];

/// Create every table and index. Safe to run repeatedly.
pub async fn run(pool: &PgPool) -> DbResult<()> {
    info!("running schema migrations");

    for (table, ddl) in TABLES {
        sqlx::query(ddl).execute(pool).await?;
        tracing::debug!(table, "table ready");
    }

    for ddl in INDEXES {
        sqlx::query(ddl).execute(pool).await?;
    }

    info!(tables = TABLES.len(), "schema migrations complete");
    Ok(())
}
