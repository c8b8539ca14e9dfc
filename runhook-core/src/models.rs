//! Run record model
//!
//! Rows deserialize from their snake_case column names (the joined graph
//! arrives as `row_to_json` documents) and serialize as camelCase, which is
//! the shape notification endpoints receive. With the `sqlx` feature,
//! `JobRun` also decodes straight from a table row.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;

/// Lifecycle state of a job run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Pending,
    Queued,
    WaitingOnConnections,
    Started,
    Success,
    Failure,
    TimedOut,
    Aborted,
    Canceled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "PENDING",
            RunStatus::Queued => "QUEUED",
            RunStatus::WaitingOnConnections => "WAITING_ON_CONNECTIONS",
            RunStatus::Started => "STARTED",
            RunStatus::Success => "SUCCESS",
            RunStatus::Failure => "FAILURE",
            RunStatus::TimedOut => "TIMED_OUT",
            RunStatus::Aborted => "ABORTED",
            RunStatus::Canceled => "CANCELED",
        }
    }

    /// Whether the run has reached a terminal state
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            RunStatus::Success
                | RunStatus::Failure
                | RunStatus::TimedOut
                | RunStatus::Aborted
                | RunStatus::Canceled
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let status = match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => RunStatus::Pending,
            "QUEUED" => RunStatus::Queued,
            "WAITING_ON_CONNECTIONS" => RunStatus::WaitingOnConnections,
            "STARTED" => RunStatus::Started,
            "SUCCESS" => RunStatus::Success,
            "FAILURE" => RunStatus::Failure,
            "TIMED_OUT" => RunStatus::TimedOut,
            "ABORTED" => RunStatus::Aborted,
            "CANCELED" => RunStatus::Canceled,
            _ => return Err(CoreError::unknown_status("run", s)),
        };
        Ok(status)
    }
}

impl TryFrom<String> for RunStatus {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Lifecycle state of a task inside a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Waiting,
    Running,
    Completed,
    Errored,
    Canceled,
}

/// One execution instance being tracked. Writes to this entity trigger
/// endpoint notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all(serialize = "camelCase"))]
pub struct JobRun {
    pub id: String,
    pub number: i32,
    #[cfg_attr(feature = "sqlx", sqlx(try_from = "String"))]
    pub status: RunStatus,
    pub environment_id: String,
    pub endpoint_id: String,
    pub organization_id: String,
    pub external_account_id: Option<String>,
    pub event_id: String,
    pub version_id: String,
    pub output: Option<Value>,
    pub properties: Option<Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct Organization {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Deployment environment. Holds the secret API key endpoints use to
/// authenticate notifications.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct RuntimeEnvironment {
    pub id: String,
    pub slug: String,
    pub api_key: String,
    /// DEVELOPMENT, STAGING or PRODUCTION
    #[serde(rename(serialize = "type"))]
    pub kind: String,
    pub organization_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for RuntimeEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeEnvironment")
            .field("id", &self.id)
            .field("slug", &self.slug)
            .field("api_key", &"<redacted>")
            .field("kind", &self.kind)
            .field("organization_id", &self.organization_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct Endpoint {
    pub id: String,
    pub slug: String,
    pub url: String,
    pub environment_id: String,
    pub organization_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct ExternalAccount {
    pub id: String,
    pub identifier: String,
    pub metadata: Option<Value>,
    pub environment_id: String,
    pub organization_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct Task {
    pub id: String,
    pub run_id: String,
    pub parent_id: Option<String>,
    pub idempotency_key: String,
    pub display_key: Option<String>,
    pub name: String,
    pub icon: Option<String>,
    pub status: TaskStatus,
    pub no_op: bool,
    pub params: Option<Value>,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub delay_until: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The event that triggered a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct EventRecord {
    pub id: String,
    pub event_id: String,
    pub name: String,
    pub source: String,
    pub payload: Value,
    pub context: Option<Value>,
    pub timestamp: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub environment_id: String,
    pub organization_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct Job {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub internal: bool,
    pub organization_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct JobVersion {
    pub id: String,
    pub version: String,
    pub event_specification: Value,
    pub job_id: String,
    pub endpoint_id: String,
    pub environment_id: String,
    pub organization_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct Integration {
    pub id: String,
    pub slug: String,
    pub title: Option<String>,
    pub organization_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct IntegrationConnection {
    pub id: String,
    /// DEVELOPER or EXTERNAL
    pub connection_type: String,
    pub metadata: Option<Value>,
    pub scopes: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub integration_id: String,
    pub organization_id: String,
    pub data_reference_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Pointer to credentials held by a secret store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct SecretReference {
    pub id: String,
    pub key: String,
    pub provider: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct RunConnection {
    pub id: String,
    pub key: String,
    pub auth_source: String,
    pub run_id: String,
    pub integration_id: String,
    pub connection_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Integration connection together with its data reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct ConnectionGraph {
    #[serde(flatten)]
    pub connection: IntegrationConnection,
    pub data_reference: SecretReference,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct RunConnectionGraph {
    #[serde(flatten)]
    pub run_connection: RunConnection,
    pub integration: Integration,
    pub connection: Option<ConnectionGraph>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct JobVersionGraph {
    #[serde(flatten)]
    pub version: JobVersion,
    pub job: Job,
    pub organization: Organization,
}

/// A run with every relation a notification endpoint needs.
///
/// Serialized as-is into the notification body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct RunGraph {
    #[serde(flatten)]
    pub run: JobRun,
    pub environment: RuntimeEnvironment,
    pub endpoint: Endpoint,
    pub organization: Organization,
    pub external_account: Option<ExternalAccount>,
    pub run_connections: Vec<RunConnectionGraph>,
    pub tasks: Vec<Task>,
    pub event: EventRecord,
    pub version: JobVersionGraph,
}

impl RunGraph {
    pub fn id(&self) -> &str {
        &self.run.id
    }
}

/// Input for creating a run. A missing id is generated by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRun {
    pub id: Option<String>,
    pub number: i32,
    pub status: RunStatus,
    pub environment_id: String,
    pub endpoint_id: String,
    pub organization_id: String,
    pub external_account_id: Option<String>,
    pub event_id: String,
    pub version_id: String,
    pub properties: Option<Value>,
}

/// Partial update of a run. `None` leaves the column unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunUpdate {
    pub status: Option<RunStatus>,
    pub output: Option<Value>,
    pub properties: Option<Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RunUpdate {
    pub fn status(status: RunStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Default page size for run listings
pub const DEFAULT_RUN_LIMIT: i64 = 50;

/// Filter for listing runs, newest first
#[derive(Debug, Clone, PartialEq)]
pub struct RunFilter {
    pub environment_id: Option<String>,
    pub status: Option<RunStatus>,
    pub limit: i64,
}

impl Default for RunFilter {
    fn default() -> Self {
        Self {
            environment_id: None,
            status: None,
            limit: DEFAULT_RUN_LIMIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_run_status_parse_and_display() {
        assert_eq!(
            "waiting_on_connections".parse::<RunStatus>().unwrap(),
            RunStatus::WaitingOnConnections
        );
        assert_eq!(RunStatus::TimedOut.to_string(), "TIMED_OUT");
        assert!("EXPLODED".parse::<RunStatus>().is_err());
    }

    #[test]
    fn test_run_status_from_column_text() {
        assert_eq!(
            RunStatus::try_from("TIMED_OUT".to_string()).unwrap(),
            RunStatus::TimedOut
        );
        let err = RunStatus::try_from("paused".to_string()).unwrap_err();
        assert!(matches!(err, CoreError::UnknownStatus { kind: "run", .. }));
    }

    #[test]
    fn test_finished_statuses() {
        assert!(RunStatus::Success.is_finished());
        assert!(RunStatus::Canceled.is_finished());
        assert!(!RunStatus::Started.is_finished());
        assert!(!RunStatus::Pending.is_finished());
    }

    #[test]
    fn test_run_reads_snake_case_row_json() {
        let row = json!({
            "id": "run_1",
            "number": 4,
            "status": "STARTED",
            "environment_id": "env_1",
            "endpoint_id": "ep_1",
            "organization_id": "org_1",
            "external_account_id": null,
            "event_id": "evt_1",
            "version_id": "ver_1",
            "output": null,
            "properties": {"attempt": 1},
            "started_at": "2024-03-01T10:00:00.123456+00:00",
            "completed_at": null,
            "created_at": "2024-03-01T09:59:59+00:00",
            "updated_at": "2024-03-01T10:00:00+00:00"
        });

        let run: JobRun = serde_json::from_value(row).unwrap();
        assert_eq!(run.id, "run_1");
        assert_eq!(run.status, RunStatus::Started);
        assert!(run.started_at.is_some());

        let out = serde_json::to_value(&run).unwrap();
        assert_eq!(out["environmentId"], "env_1");
        assert_eq!(out["properties"]["attempt"], 1);
        assert!(out.get("environment_id").is_none());
    }

    #[test]
    fn test_environment_debug_hides_api_key() {
        let env = RuntimeEnvironment {
            id: "env_1".into(),
            slug: "prod".into(),
            api_key: "tr_prod_secret".into(),
            kind: "PRODUCTION".into(),
            organization_id: "org_1".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let rendered = format!("{:?}", env);
        assert!(!rendered.contains("tr_prod_secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_run_update_is_empty() {
        assert!(RunUpdate::default().is_empty());
        assert!(!RunUpdate::status(RunStatus::Queued).is_empty());
    }
}
