//! Job intake and status reporting against the planner backend.
//!
//! The backend itself (assignment logic, persistence) is an external
//! collaborator; this node only fetches its next assigned job and reports
//! status transitions back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use strum_macros::Display;
use tokio::sync::Mutex;

/// Status of one flight-plan job, as the backend records it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Processing,
    Processed,
    Error,
}

/// Status of this machine, as the backend records it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MachineStatus {
    Available,
    Busy,
    Error,
}

/// One assigned flight-plan job.
#[derive(Debug, Clone, Deserialize)]
pub struct FlightJob {
    pub id: i64,
    /// The raw plan document to materialize and fly.
    #[serde(rename = "fileContent")]
    pub file_content: String,
    #[serde(rename = "machineAssignedName")]
    pub machine_assigned: Option<String>,
    pub status: String,
}

#[derive(Debug, Display)]
pub enum ReportError {
    #[strum(to_string = "planner backend request failed: {0}")]
    Http(reqwest::Error),
    #[strum(to_string = "planner backend answered {0}")]
    Backend(reqwest::StatusCode),
}

impl std::error::Error for ReportError {}

impl From<reqwest::Error> for ReportError {
    fn from(value: reqwest::Error) -> Self { ReportError::Http(value) }
}

/// The job-layer collaborator as this node consumes it.
#[async_trait]
pub trait JobClient: Send + Sync {
    /// Registers this machine, or refreshes it to `Available` if known.
    async fn register_machine(&self) -> Result<(), ReportError>;

    async fn update_machine_status(&self, status: MachineStatus) -> Result<(), ReportError>;

    /// Fetches the job currently assigned to this machine, if any.
    async fn next_assigned_job(&self) -> Result<Option<FlightJob>, ReportError>;

    /// Reports a job status transition; on success the full flight-log
    /// content rides along.
    async fn update_job_status(
        &self,
        job_id: i64,
        status: JobStatus,
        log_content: Option<String>,
    ) -> Result<(), ReportError>;
}

#[derive(Debug, Serialize)]
struct MachineRegistration<'a> {
    name: &'a str,
    status: MachineStatus,
}

#[derive(Debug, Serialize)]
struct MachineUpdate {
    status: MachineStatus,
}

#[derive(Debug, Serialize)]
struct JobUpdate {
    status: JobStatus,
    #[serde(rename = "csvResult", skip_serializing_if = "Option::is_none")]
    csv_result: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MachineRecord {
    id: i64,
}

/// REST implementation of `JobClient` against the planner backend.
pub struct HttpJobClient {
    client: reqwest::Client,
    base_url: String,
    machine_name: String,
    machine_id: Mutex<Option<i64>>,
}

impl HttpJobClient {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(base_url: &str, machine_name: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Self::REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: String::from(base_url),
            machine_name: String::from(machine_name),
            machine_id: Mutex::new(None),
        }
    }

    fn url(&self, path: &str) -> String { format!("{}/{path}", self.base_url) }

    fn check(response: &reqwest::Response) -> Result<(), ReportError> {
        if response.status().is_success() {
            Ok(())
        } else {
            Err(ReportError::Backend(response.status()))
        }
    }
}

#[async_trait]
impl JobClient for HttpJobClient {
    async fn register_machine(&self) -> Result<(), ReportError> {
        let lookup = self
            .client
            .get(self.url("machines"))
            .query(&[("name", self.machine_name.as_str())])
            .send()
            .await?;
        if lookup.status().is_success() {
            let record: MachineRecord = lookup.json().await?;
            *self.machine_id.lock().await = Some(record.id);
            return self.update_machine_status(MachineStatus::Available).await;
        }

        let created = self
            .client
            .post(self.url("machines"))
            .json(&MachineRegistration {
                name: &self.machine_name,
                status: MachineStatus::Available,
            })
            .send()
            .await?;
        Self::check(&created)?;
        let record: MachineRecord = created.json().await?;
        *self.machine_id.lock().await = Some(record.id);
        Ok(())
    }

    async fn update_machine_status(&self, status: MachineStatus) -> Result<(), ReportError> {
        let Some(id) = *self.machine_id.lock().await else {
            return Ok(());
        };
        let response = self
            .client
            .put(self.url(&format!("machines/{id}")))
            .json(&MachineUpdate { status })
            .send()
            .await?;
        Self::check(&response)
    }

    async fn next_assigned_job(&self) -> Result<Option<FlightJob>, ReportError> {
        let response = self.client.get(self.url("flightPlans")).send().await?;
        Self::check(&response)?;
        let jobs: Vec<FlightJob> = response.json().await?;
        Ok(jobs.into_iter().find(|job| {
            job.machine_assigned.as_deref() == Some(self.machine_name.as_str())
                && job.status == JobStatus::Processing.to_string()
        }))
    }

    async fn update_job_status(
        &self,
        job_id: i64,
        status: JobStatus,
        log_content: Option<String>,
    ) -> Result<(), ReportError> {
        let response = self
            .client
            .put(self.url(&format!("flightPlans/{job_id}")))
            .json(&JobUpdate { status, csv_result: log_content })
            .send()
            .await?;
        Self::check(&response)
    }
}
