//! Instance control through the SQL Admin REST API

use super::RestClient;
use crate::models::{Edition, InstanceDescriptor, OperationRecord, OperationStatus};
use crate::shutdown::ShutdownSignal;
use crate::source::{InstanceController, SourceError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Time between status polls of a pending operation
pub const OPERATION_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ApiInstance {
    name: String,
    database_version: String,
    state: String,
    region: String,
    gce_zone: Option<String>,
    settings: ApiSettings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ApiSettings {
    tier: String,
    edition: Option<String>,
    availability_type: Option<String>,
    backup_configuration: Option<ApiBackupConfiguration>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ApiBackupConfiguration {
    enabled: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ApiInstanceList {
    items: Vec<ApiInstance>,
    next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ApiOperation {
    name: String,
    operation_type: String,
    status: String,
    target_id: Option<String>,
    insert_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    error: Option<ApiOperationErrors>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApiOperationErrors {
    errors: Vec<ApiOperationError>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApiOperationError {
    code: String,
    message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ApiOperationList {
    items: Vec<ApiOperation>,
}

#[derive(Serialize)]
struct TierPatch<'a> {
    settings: TierSettings<'a>,
}

#[derive(Serialize)]
struct TierSettings<'a> {
    tier: &'a str,
}

impl ApiOperation {
    fn error_message(&self) -> Option<String> {
        let errors = self.error.as_ref()?;
        if errors.errors.is_empty() {
            return None;
        }
        Some(
            errors
                .errors
                .iter()
                .map(|e| {
                    if e.code.is_empty() {
                        e.message.clone()
                    } else {
                        format!("{}: {}", e.code, e.message)
                    }
                })
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    fn into_record(self) -> OperationRecord {
        OperationRecord {
            error: self.error_message(),
            status: OperationStatus::parse(&self.status),
            id: self.name,
            operation_type: self.operation_type,
            insert_time: self.insert_time,
            end_time: self.end_time,
        }
    }
}

impl ApiInstance {
    fn into_descriptor(self, project: &str) -> InstanceDescriptor {
        let settings = self.settings;
        InstanceDescriptor {
            name: self.name,
            project: project.to_string(),
            database_version: self.database_version,
            tier: settings.tier,
            edition: Edition::parse(settings.edition.as_deref().unwrap_or_default()),
            state: self.state,
            region: self.region,
            zone: self.gce_zone.filter(|z| !z.is_empty()),
            high_availability: settings.availability_type.as_deref() == Some("REGIONAL"),
            backup_enabled: settings
                .backup_configuration
                .map(|b| b.enabled)
                .unwrap_or(false),
            last_scaled_at: None,
        }
    }
}

/// SQL Admin API adapter scoped to one project
pub struct SqlAdminClient {
    rest: RestClient,
    project: String,
    poll_interval: Duration,
}

impl SqlAdminClient {
    pub fn new(rest: RestClient, project: impl Into<String>) -> Self {
        Self {
            rest,
            project: project.into(),
            poll_interval: OPERATION_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn instance_path(&self, instance: &str) -> String {
        format!("v1/projects/{}/instances/{}", self.project, instance)
    }

    async fn wait_for_operation(
        &self,
        mut operation: ApiOperation,
        shutdown: &ShutdownSignal,
    ) -> Result<(), SourceError> {
        let path = format!("v1/projects/{}/operations/{}", self.project, operation.name);

        loop {
            if OperationStatus::parse(&operation.status) == OperationStatus::Done {
                return match operation.error_message() {
                    Some(message) => Err(SourceError::OperationFailed {
                        id: operation.name,
                        message,
                    }),
                    None => Ok(()),
                };
            }

            debug!(operation = %operation.name, status = %operation.status, "Waiting for operation");
            tokio::select! {
                _ = shutdown.triggered() => {
                    return Err(SourceError::Cancelled(operation.name));
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }

            operation = self.rest.get(&path, &[]).await?;
        }
    }
}

#[async_trait]
impl InstanceController for SqlAdminClient {
    async fn get(&self, instance: &str) -> Result<InstanceDescriptor, SourceError> {
        match self.rest.get::<ApiInstance>(&self.instance_path(instance), &[]).await {
            Ok(found) => Ok(found.into_descriptor(&self.project)),
            Err(SourceError::Backend { status: 404, .. }) => {
                Err(SourceError::NotFound(instance.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn list(&self, project: &str) -> Result<Vec<InstanceDescriptor>, SourceError> {
        let path = format!("v1/projects/{project}/instances");
        let mut instances = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let query: Vec<(&str, String)> = page_token
                .take()
                .map(|token| vec![("pageToken", token)])
                .unwrap_or_default();
            let page: ApiInstanceList = self.rest.get(&path, &query).await?;

            instances.extend(page.items.into_iter().map(|i| i.into_descriptor(project)));
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(instances)
    }

    async fn update_tier(
        &self,
        instance: &str,
        tier: &str,
        shutdown: &ShutdownSignal,
    ) -> Result<(), SourceError> {
        let body = TierPatch {
            settings: TierSettings { tier },
        };
        let operation: ApiOperation = self.rest.patch(&self.instance_path(instance), &body).await?;
        info!(instance = %instance, tier = %tier, operation = %operation.name, "Tier update submitted");

        self.wait_for_operation(operation, shutdown).await
    }

    async fn recent_operations(
        &self,
        instance: &str,
        limit: usize,
    ) -> Result<Vec<OperationRecord>, SourceError> {
        let path = format!("v1/projects/{}/operations", self.project);
        let query = [
            ("instance", instance.to_string()),
            ("maxResults", limit.to_string()),
        ];
        let list: ApiOperationList = self.rest.get(&path, &query).await?;

        Ok(list
            .items
            .into_iter()
            .filter(|op| op.target_id.as_deref().map_or(true, |t| t == instance))
            .take(limit)
            .map(ApiOperation::into_record)
            .collect())
    }
}
