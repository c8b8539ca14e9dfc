//! Run repository
//!
//! The query functions take any `PgExecutor`, so they run the same on the
//! pool or on a connection inside a transaction.
//!
//! - Writes use `RETURNING *`, one round trip each, decoded via `FromRow`
//! - `load_graph` joins every relation in a single query (no N+1) and
//!   decodes the `row_to_json` documents through serde

use async_trait::async_trait;
use runhook_core::models::{
    ConnectionGraph, Endpoint, EventRecord, ExternalAccount, Integration, IntegrationConnection,
    Job, JobVersion, JobVersionGraph, Organization, RunConnection, RunConnectionGraph,
    SecretReference, Task,
};
use runhook_core::{JobRun, NewRun, RunFilter, RunGraph, RunUpdate, RuntimeEnvironment};
use runhook_notify::Notifier;
use serde::Deserialize;
use sqlx::types::Json;
use sqlx::{PgExecutor, PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use super::notifying::NotifyingRunRepository;
use crate::error::DbResult;

/// Operations on the run entity
#[async_trait]
pub trait RunRepository: Send + Sync {
    async fn create(&self, input: NewRun) -> DbResult<JobRun>;

    /// `None` when no run has this id
    async fn update(&self, id: &str, changes: RunUpdate) -> DbResult<Option<JobRun>>;

    /// Insert `create` under `id`, or apply `changes` if the run exists
    async fn upsert(&self, id: &str, create: NewRun, changes: RunUpdate) -> DbResult<JobRun>;

    async fn find_unique(&self, id: &str) -> DbResult<Option<JobRun>>;

    async fn find_many(&self, filter: RunFilter) -> DbResult<Vec<JobRun>>;

    /// Removes the run with its tasks and connections
    async fn delete(&self, id: &str) -> DbResult<Option<JobRun>>;

    /// The run with every relation joined in
    async fn load_graph(&self, id: &str) -> DbResult<Option<RunGraph>>;

    /// Wrap this repository so `create`, `update` and `upsert` notify the
    /// run's endpoint
    fn with_notifier<N: Notifier>(self, notifier: N) -> NotifyingRunRepository<Self, N>
    where
        Self: Sized,
    {
        NotifyingRunRepository::new(self, notifier)
    }
}

/// PostgreSQL-backed run repository
#[derive(Debug, Clone)]
pub struct PgRunRepository {
    pool: PgPool,
}

impl PgRunRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RunRepository for PgRunRepository {
    async fn create(&self, input: NewRun) -> DbResult<JobRun> {
        insert_run(&self.pool, &input).await
    }

    async fn update(&self, id: &str, changes: RunUpdate) -> DbResult<Option<JobRun>> {
        update_run(&self.pool, id, &changes).await
    }

    async fn upsert(&self, id: &str, create: NewRun, changes: RunUpdate) -> DbResult<JobRun> {
        upsert_run(&self.pool, id, &create, &changes).await
    }

    async fn find_unique(&self, id: &str) -> DbResult<Option<JobRun>> {
        find_run(&self.pool, id).await
    }

    async fn find_many(&self, filter: RunFilter) -> DbResult<Vec<JobRun>> {
        list_runs(&self.pool, &filter).await
    }

    async fn delete(&self, id: &str) -> DbResult<Option<JobRun>> {
        delete_run(&self.pool, id).await
    }

    async fn load_graph(&self, id: &str) -> DbResult<Option<RunGraph>> {
        find_run_graph(&self.pool, id).await
    }
}

/// Insert a run; a missing id is generated here
pub async fn insert_run<'e, E: PgExecutor<'e>>(executor: E, input: &NewRun) -> DbResult<JobRun> {
    let id = input
        .id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let run = sqlx::query_as::<_, JobRun>(
        r#"
        INSERT INTO job_runs (
            id, number, status, environment_id, endpoint_id, organization_id,
            external_account_id, event_id, version_id, properties
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(input.number)
    .bind(input.status.as_str())
    .bind(&input.environment_id)
    .bind(&input.endpoint_id)
    .bind(&input.organization_id)
    .bind(input.external_account_id.as_deref())
    .bind(&input.event_id)
    .bind(&input.version_id)
    .bind(input.properties.clone())
    .fetch_one(executor)
    .await?;

    Ok(run)
}

pub async fn update_run<'e, E: PgExecutor<'e>>(
    executor: E,
    id: &str,
    changes: &RunUpdate,
) -> DbResult<Option<JobRun>> {
    let run = sqlx::query_as::<_, JobRun>(
        r#"
        UPDATE job_runs SET
            status = COALESCE($2, status),
            output = COALESCE($3, output),
            properties = COALESCE($4, properties),
            started_at = COALESCE($5, started_at),
            completed_at = COALESCE($6, completed_at),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(changes.status.map(|s| s.as_str()))
    .bind(changes.output.clone())
    .bind(changes.properties.clone())
    .bind(changes.started_at)
    .bind(changes.completed_at)
    .fetch_optional(executor)
    .await?;

    Ok(run)
}

pub async fn upsert_run<'e, E: PgExecutor<'e>>(
    executor: E,
    id: &str,
    create: &NewRun,
    changes: &RunUpdate,
) -> DbResult<JobRun> {
    let run = sqlx::query_as::<_, JobRun>(
        r#"
        INSERT INTO job_runs (
            id, number, status, environment_id, endpoint_id, organization_id,
            external_account_id, event_id, version_id, properties
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (id) DO UPDATE SET
            status = COALESCE($11, job_runs.status),
            output = COALESCE($12, job_runs.output),
            properties = COALESCE($13, job_runs.properties),
            started_at = COALESCE($14, job_runs.started_at),
            completed_at = COALESCE($15, job_runs.completed_at),
            updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(create.number)
    .bind(create.status.as_str())
    .bind(&create.environment_id)
    .bind(&create.endpoint_id)
    .bind(&create.organization_id)
    .bind(create.external_account_id.as_deref())
    .bind(&create.event_id)
    .bind(&create.version_id)
    .bind(create.properties.clone())
    .bind(changes.status.map(|s| s.as_str()))
    .bind(changes.output.clone())
    .bind(changes.properties.clone())
    .bind(changes.started_at)
    .bind(changes.completed_at)
    .fetch_one(executor)
    .await?;

    Ok(run)
}

pub async fn find_run<'e, E: PgExecutor<'e>>(executor: E, id: &str) -> DbResult<Option<JobRun>> {
    let run = sqlx::query_as::<_, JobRun>("SELECT * FROM job_runs WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await?;

    Ok(run)
}

/// Runs matching `filter`, newest first
pub async fn list_runs<'e, E: PgExecutor<'e>>(
    executor: E,
    filter: &RunFilter,
) -> DbResult<Vec<JobRun>> {
    let mut builder = QueryBuilder::<Postgres>::new("SELECT * FROM job_runs WHERE 1=1");

    if let Some(environment_id) = &filter.environment_id {
        builder.push(" AND environment_id = ");
        builder.push_bind(environment_id.clone());
    }
    if let Some(status) = filter.status {
        builder.push(" AND status = ");
        builder.push_bind(status.as_str());
    }
    builder.push(" ORDER BY created_at DESC, id LIMIT ");
    builder.push_bind(filter.limit.max(0));

    let runs = builder
        .build_query_as::<JobRun>()
        .fetch_all(executor)
        .await?;
    Ok(runs)
}

pub async fn delete_run<'e, E: PgExecutor<'e>>(executor: E, id: &str) -> DbResult<Option<JobRun>> {
    let run = sqlx::query_as::<_, JobRun>("DELETE FROM job_runs WHERE id = $1 RETURNING *")
        .bind(id)
        .fetch_optional(executor)
        .await?;

    Ok(run)
}

/// Shape of one element of the `run_connections` aggregate
#[derive(Debug, Deserialize)]
struct RunConnectionRow {
    run_connection: RunConnection,
    integration: Integration,
    connection: Option<IntegrationConnection>,
    data_reference: Option<SecretReference>,
}

impl RunConnectionRow {
    fn into_graph(self) -> RunConnectionGraph {
        let connection = match (self.connection, self.data_reference) {
            (Some(connection), Some(data_reference)) => Some(ConnectionGraph {
                connection,
                data_reference,
            }),
            _ => None,
        };

        RunConnectionGraph {
            run_connection: self.run_connection,
            integration: self.integration,
            connection,
        }
    }
}

/// Load a run with environment, endpoint, organization, external account,
/// run connections (integration, connection, data reference), tasks,
/// event and version (job, organization).
pub async fn find_run_graph<'e, E: PgExecutor<'e>>(
    executor: E,
    id: &str,
) -> DbResult<Option<RunGraph>> {
    let row = sqlx::query(
        r#"
        SELECT
            row_to_json(r) AS run,
            row_to_json(env) AS environment,
            row_to_json(ep) AS endpoint,
            row_to_json(org) AS organization,
            CASE WHEN acct.id IS NULL THEN NULL ELSE row_to_json(acct) END AS external_account,
            row_to_json(ev) AS event,
            row_to_json(ver) AS version,
            row_to_json(job) AS job,
            row_to_json(ver_org) AS version_organization,
            COALESCE((
                SELECT json_agg(t ORDER BY t.created_at, t.id)
                FROM tasks t
                WHERE t.run_id = r.id
            ), '[]'::json) AS tasks,
            COALESCE((
                SELECT json_agg(json_build_object(
                    'run_connection', row_to_json(rc),
                    'integration', row_to_json(i),
                    'connection', CASE WHEN c.id IS NULL THEN NULL ELSE row_to_json(c) END,
                    'data_reference', CASE WHEN sr.id IS NULL THEN NULL ELSE row_to_json(sr) END
                ) ORDER BY rc.created_at, rc.id)
                FROM run_connections rc
                JOIN integrations i ON i.id = rc.integration_id
                LEFT JOIN integration_connections c ON c.id = rc.connection_id
                LEFT JOIN secret_references sr ON sr.id = c.data_reference_id
                WHERE rc.run_id = r.id
            ), '[]'::json) AS run_connections
        FROM job_runs r
        JOIN runtime_environments env ON env.id = r.environment_id
        JOIN endpoints ep ON ep.id = r.endpoint_id
        JOIN organizations org ON org.id = r.organization_id
        LEFT JOIN external_accounts acct ON acct.id = r.external_account_id
        JOIN event_records ev ON ev.id = r.event_id
        JOIN job_versions ver ON ver.id = r.version_id
        JOIN jobs job ON job.id = ver.job_id
        JOIN organizations ver_org ON ver_org.id = ver.organization_id
        WHERE r.id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let Json(run) = row.try_get::<Json<JobRun>, _>("run")?;
    let Json(environment) = row.try_get::<Json<RuntimeEnvironment>, _>("environment")?;
    let Json(endpoint) = row.try_get::<Json<Endpoint>, _>("endpoint")?;
    let Json(organization) = row.try_get::<Json<Organization>, _>("organization")?;
    let external_account = row
        .try_get::<Option<Json<ExternalAccount>>, _>("external_account")?
        .map(|Json(account)| account);
    let Json(event) = row.try_get::<Json<EventRecord>, _>("event")?;
    let Json(version) = row.try_get::<Json<JobVersion>, _>("version")?;
    let Json(job) = row.try_get::<Json<Job>, _>("job")?;
    let Json(version_organization) =
        row.try_get::<Json<Organization>, _>("version_organization")?;
    let Json(tasks) = row.try_get::<Json<Vec<Task>>, _>("tasks")?;
    let Json(run_connections) =
        row.try_get::<Json<Vec<RunConnectionRow>>, _>("run_connections")?;

    Ok(Some(RunGraph {
        run,
        environment,
        endpoint,
        organization,
        external_account,
        run_connections: run_connections
            .into_iter()
            .map(RunConnectionRow::into_graph)
            .collect(),
        tasks,
        event,
        version: JobVersionGraph {
            version,
            job,
            organization: version_organization,
        },
    }))
}
