//! Sample run graphs for tests in this and downstream crates.

use chrono::{TimeZone, Utc};
use serde_json::json;

use crate::models::*;

fn at(minute: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 10, minute, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// A freshly created run with the given id
pub fn job_run(id: &str) -> JobRun {
    JobRun {
        id: id.to_string(),
        number: 1,
        status: RunStatus::Pending,
        environment_id: "env_1".into(),
        endpoint_id: "ep_1".into(),
        organization_id: "org_1".into(),
        external_account_id: None,
        event_id: "evt_1".into(),
        version_id: "ver_1".into(),
        output: None,
        properties: None,
        started_at: None,
        completed_at: None,
        created_at: at(0),
        updated_at: at(0),
    }
}

/// Input matching [`job_run`]
pub fn new_run(id: Option<&str>) -> NewRun {
    NewRun {
        id: id.map(str::to_string),
        number: 1,
        status: RunStatus::Pending,
        environment_id: "env_1".into(),
        endpoint_id: "ep_1".into(),
        organization_id: "org_1".into(),
        external_account_id: None,
        event_id: "evt_1".into(),
        version_id: "ver_1".into(),
        properties: None,
    }
}

fn organization() -> Organization {
    Organization {
        id: "org_1".into(),
        slug: "acme".into(),
        title: "Acme".into(),
        created_at: at(0),
        updated_at: at(0),
    }
}

/// The fully joined graph of `run`, pointing at `endpoint_url` and
/// authenticated with `api_key`
pub fn run_graph(run: JobRun, endpoint_url: &str, api_key: &str) -> RunGraph {
    let run_id = run.id.clone();

    RunGraph {
        environment: RuntimeEnvironment {
            id: run.environment_id.clone(),
            slug: "prod".into(),
            api_key: api_key.into(),
            kind: "PRODUCTION".into(),
            organization_id: "org_1".into(),
            created_at: at(0),
            updated_at: at(0),
        },
        endpoint: Endpoint {
            id: run.endpoint_id.clone(),
            slug: "web".into(),
            url: endpoint_url.into(),
            environment_id: run.environment_id.clone(),
            organization_id: "org_1".into(),
            created_at: at(0),
            updated_at: at(0),
        },
        organization: organization(),
        external_account: None,
        run_connections: vec![RunConnectionGraph {
            run_connection: RunConnection {
                id: "rc_1".into(),
                key: "github".into(),
                auth_source: "HOSTED".into(),
                run_id: run_id.clone(),
                integration_id: "int_1".into(),
                connection_id: Some("conn_1".into()),
                created_at: at(1),
                updated_at: at(1),
            },
            integration: Integration {
                id: "int_1".into(),
                slug: "github".into(),
                title: Some("GitHub".into()),
                organization_id: "org_1".into(),
                created_at: at(0),
                updated_at: at(0),
            },
            connection: Some(ConnectionGraph {
                connection: IntegrationConnection {
                    id: "conn_1".into(),
                    connection_type: "DEVELOPER".into(),
                    metadata: None,
                    scopes: vec!["repo".into()],
                    expires_at: None,
                    integration_id: "int_1".into(),
                    organization_id: "org_1".into(),
                    data_reference_id: "sr_1".into(),
                    created_at: at(0),
                    updated_at: at(0),
                },
                data_reference: SecretReference {
                    id: "sr_1".into(),
                    key: "connection/github/conn_1".into(),
                    provider: "DATABASE".into(),
                    created_at: at(0),
                    updated_at: at(0),
                },
            }),
        }],
        tasks: vec![Task {
            id: "task_1".into(),
            run_id: run_id.clone(),
            parent_id: None,
            idempotency_key: "fetch-issues".into(),
            display_key: None,
            name: "Fetch issues".into(),
            icon: Some("github".into()),
            status: TaskStatus::Completed,
            no_op: false,
            params: Some(json!({"repo": "acme/web"})),
            output: Some(json!({"count": 3})),
            error: None,
            delay_until: None,
            started_at: Some(at(2)),
            completed_at: Some(at(3)),
            created_at: at(2),
            updated_at: at(3),
        }],
        event: EventRecord {
            id: run.event_id.clone(),
            event_id: "issue.opened-42".into(),
            name: "issue.opened".into(),
            source: "github".into(),
            payload: json!({"number": 42}),
            context: None,
            timestamp: at(0),
            delivered_at: Some(at(0)),
            environment_id: run.environment_id.clone(),
            organization_id: "org_1".into(),
            created_at: at(0),
            updated_at: at(0),
        },
        version: JobVersionGraph {
            version: JobVersion {
                id: run.version_id.clone(),
                version: "1.0.0".into(),
                event_specification: json!({"name": "issue.opened"}),
                job_id: "job_1".into(),
                endpoint_id: run.endpoint_id.clone(),
                environment_id: run.environment_id.clone(),
                organization_id: "org_1".into(),
                created_at: at(0),
                updated_at: at(0),
            },
            job: Job {
                id: "job_1".into(),
                slug: "triage-issues".into(),
                title: "Triage issues".into(),
                internal: false,
                organization_id: "org_1".into(),
                created_at: at(0),
                updated_at: at(0),
            },
            organization: organization(),
        },
        run,
    }
}
