//! Test utilities for unit tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, ThreadId};
use std::time::Duration;

use serde_json::{json, Value};

use crate::config::{MigrationConfig, Parameters};
use crate::job_runner::{Job, JobRunner, JobStatus, Sleeper};
use crate::primitives::http_client::{HttpClient, HttpError, HttpMethod, HttpRequest};
use crate::primitives::logger::{set_logger, LogLevel, Logger};
use crate::primitives::secret::Secret;
use crate::secrets::{MigrateConfigurationRequest, MigrateConfigurationResponse, MigrationsApi};
use crate::storage::{
    Bucket, Component, ComponentConfiguration, ConfigurationSummary, DevBranch, StorageApi,
    StorageIndex, Table, TokenInfo,
};

#[derive(Clone)]
enum FakeResponse {
    Body(Value),
    Failure { code: u16, message: String },
}

impl FakeResponse {
    fn into_result(self) -> Result<Vec<u8>, HttpError> {
        match self {
            Self::Body(body) => Ok(body.to_string().into_bytes()),
            Self::Failure { code, message } => Err(HttpError::BadStatusCode { code, message }),
        }
    }
}

fn method_name(method: HttpMethod) -> &'static str {
    match method {
        HttpMethod::Get => "GET",
        HttpMethod::Post => "POST",
        HttpMethod::Put => "PUT",
    }
}

/// Reads back the JSON body of a recorded request.
pub trait RequestBodyExt {
    fn json_body(&self) -> Option<Value>;
}

impl RequestBodyExt for HttpRequest {
    fn json_body(&self) -> Option<Value> {
        self.body
            .as_deref()
            .and_then(|body| serde_json::from_slice(body).ok())
    }
}

/// HTTP client answering from scripted responses.
///
/// Responses are queued per method and URL and served in order; the last
/// one keeps being served, so a single finished job answers every poll.
#[derive(Default)]
pub struct FakeHttpClient {
    responses: Mutex<HashMap<(&'static str, String), VecDeque<FakeResponse>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeHttpClient {
    fn push(&self, method: HttpMethod, url: &str, response: FakeResponse) {
        self.responses
            .lock()
            .unwrap()
            .entry((method_name(method), url.to_string()))
            .or_default()
            .push_back(response);
    }

    /// Queues a JSON response.
    pub fn respond(&self, method: HttpMethod, url: &str, body: Value) {
        self.push(method, url, FakeResponse::Body(body));
    }

    /// Queues an error status.
    pub fn fail(&self, method: HttpMethod, url: &str, code: u16, message: &str) {
        self.push(
            method,
            url,
            FakeResponse::Failure {
                code,
                message: message.to_string(),
            },
        );
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl HttpClient for FakeHttpClient {
    async fn fetch(&self, request: HttpRequest) -> Result<Vec<u8>, HttpError> {
        let key = (method_name(request.method), request.url.clone());
        self.requests.lock().unwrap().push(request);

        let mut responses = self.responses.lock().unwrap();
        let queue = responses.get_mut(&key);
        let response = match queue {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        response
            .unwrap_or_else(|| FakeResponse::Failure {
                code: 404,
                message: format!("No response for {} {}", key.0, key.1),
            })
            .into_result()
    }
}

/// Records the delays instead of sleeping.
#[derive(Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays_in_seconds(&self) -> Vec<u64> {
        self.delays
            .lock()
            .unwrap()
            .iter()
            .map(Duration::as_secs)
            .collect()
    }
}

#[async_trait::async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

/// A validated config migrating from `connection.keboola.com` to the Azure
/// North Europe stack, with `overrides` merged into the parameters.
pub fn migration_config(overrides: Value) -> MigrationConfig {
    let mut parameters = json!({
        "sourceKbcUrl": "https://connection.keboola.com",
        "#sourceKbcToken": "source-token",
    });
    if let (Some(target), Some(source)) = (parameters.as_object_mut(), overrides.as_object()) {
        for (key, value) in source {
            target.insert(key.clone(), value.clone());
        }
    }
    let parameters =
        Parameters::from_json(&json!({ "parameters": parameters }).to_string()).unwrap();
    MigrationConfig::new(
        parameters,
        "https://connection.north-europe.azure.keboola.com/".to_string(),
        Secret::from("dest-token"),
    )
    .unwrap()
}

/// A call received by [`FakeJobRunner`].
#[derive(Debug, Clone, PartialEq)]
pub enum RunnerCall {
    Job {
        component_id: String,
        data: Value,
        tag: Option<String>,
    },
    Action {
        component_id: String,
        action: String,
        data: Value,
    },
}

/// Job runner finishing every job immediately.
///
/// Jobs succeed unless a status was scripted for their component.
pub struct FakeJobRunner {
    orchestrations: bool,
    sync_result: Value,
    statuses: HashMap<String, (JobStatus, String)>,
    failures: HashMap<String, (u16, String)>,
    calls: Mutex<Vec<RunnerCall>>,
}

impl FakeJobRunner {
    /// A runner of the legacy surface, supporting orchestration migration.
    pub fn syrup() -> Self {
        Self::new(true)
    }

    /// A runner of the Job Queue.
    pub fn queue() -> Self {
        Self::new(false)
    }

    fn new(orchestrations: bool) -> Self {
        Self {
            orchestrations,
            sync_result: s3_credentials(),
            statuses: HashMap::new(),
            failures: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_sync_result(mut self, result: Value) -> Self {
        self.sync_result = result;
        self
    }

    pub fn with_job_status(mut self, component_id: &str, status: JobStatus, message: &str) -> Self {
        self.statuses
            .insert(component_id.to_string(), (status, message.to_string()));
        self
    }

    pub fn with_job_failure(mut self, component_id: &str, code: u16, message: &str) -> Self {
        self.failures
            .insert(component_id.to_string(), (code, message.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<RunnerCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Components of the submitted jobs, in order.
    pub fn job_components(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RunnerCall::Job { component_id, .. } => Some(component_id),
                RunnerCall::Action { .. } => None,
            })
            .collect()
    }

    /// Parameters of the first job of `component_id`.
    pub fn job_parameters(&self, component_id: &str) -> Value {
        self.calls()
            .into_iter()
            .find_map(|call| match call {
                RunnerCall::Job {
                    component_id: id,
                    data,
                    ..
                } if id == component_id => Some(data["parameters"].clone()),
                _ => None,
            })
            .unwrap_or_else(|| panic!("no job of {component_id}"))
    }
}

#[async_trait::async_trait]
impl JobRunner for FakeJobRunner {
    async fn run_job(
        &self,
        component_id: &str,
        data: Value,
        tag: Option<&str>,
    ) -> Result<Job, HttpError> {
        let id = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(RunnerCall::Job {
                component_id: component_id.to_string(),
                data,
                tag: tag.map(ToString::to_string),
            });
            calls.len()
        };
        if let Some((code, message)) = self.failures.get(component_id) {
            return Err(HttpError::BadStatusCode {
                code: *code,
                message: message.clone(),
            });
        }
        let job = match self.statuses.get(component_id) {
            Some((status, message)) => json!({
                "id": id,
                "status": status.to_string(),
                "isFinished": true,
                "result": {"message": message},
            }),
            None => json!({"id": id, "status": "success", "isFinished": true, "result": {}}),
        };
        Ok(serde_json::from_value(job).unwrap())
    }

    async fn run_sync_action(
        &self,
        component_id: &str,
        action: &str,
        data: Value,
    ) -> Result<Value, HttpError> {
        self.calls.lock().unwrap().push(RunnerCall::Action {
            component_id: component_id.to_string(),
            action: action.to_string(),
            data,
        });
        Ok(self.sync_result.clone())
    }

    fn supports_orchestration_migration(&self) -> bool {
        self.orchestrations
    }
}

/// Read credentials of an S3 backup.
pub fn s3_credentials() -> Value {
    json!({
        "backupId": "1",
        "backupUri": "https://kbc-backups.s3.amazonaws.com/data-takeout/us-east-1/1/",
        "region": "us-east-1",
        "credentials": {
            "accessKeyId": "AKIA-ACCESS",
            "secretAccessKey": "s3-secret",
            "sessionToken": "s3-session",
        },
    })
}

#[derive(Default)]
struct FakeStorageState {
    configurations: BTreeMap<(String, String), ComponentConfiguration>,
    updates: Vec<(String, ComponentConfiguration)>,
}

/// In-memory project.
pub struct FakeStorage {
    api_url: String,
    project: Value,
    index: Value,
    next_id: String,
    branches: Vec<Value>,
    components: Vec<String>,
    buckets: Vec<Bucket>,
    tables: Vec<(String, Table)>,
    table_failures: HashMap<String, (u16, String)>,
    token_failure: Option<(u16, String)>,
    state: Mutex<FakeStorageState>,
}

impl FakeStorage {
    pub fn new(api_url: &str) -> Self {
        Self {
            api_url: api_url.to_string(),
            project: json!({"id": 1, "name": "Project", "features": []}),
            index: json!({"services": [], "components": []}),
            next_id: "1".to_string(),
            branches: vec![json!({"id": 123, "name": "Main", "isDefault": true})],
            components: Vec::new(),
            buckets: Vec::new(),
            tables: Vec::new(),
            table_failures: HashMap::new(),
            token_failure: None,
            state: Mutex::new(FakeStorageState::default()),
        }
    }

    /// The source project of most tests.
    pub fn source() -> Self {
        Self::new("https://connection.keboola.com")
    }

    /// The destination project of most tests.
    pub fn destination() -> Self {
        Self::new("https://connection.north-europe.azure.keboola.com")
    }

    pub fn with_project(mut self, id: u64, name: &str, features: &[&str]) -> Self {
        self.project = json!({"id": id, "name": name, "features": features});
        self
    }

    pub fn with_index(mut self, index: Value) -> Self {
        self.index = index;
        self
    }

    pub fn with_branches(mut self, branches: Value) -> Self {
        self.branches = branches.as_array().cloned().unwrap_or_default();
        self
    }

    pub fn with_component(mut self, component_id: &str) -> Self {
        if !self.components.iter().any(|id| id == component_id) {
            self.components.push(component_id.to_string());
        }
        self
    }

    /// Adds a configuration, registering its component.
    pub fn with_configuration(self, component_id: &str, configuration: Value) -> Self {
        let configuration: ComponentConfiguration = serde_json::from_value(configuration).unwrap();
        self.state.lock().unwrap().configurations.insert(
            (component_id.to_string(), configuration.id.clone()),
            configuration,
        );
        self.with_component(component_id)
    }

    pub fn with_table(mut self, bucket: (&str, &str), table: Value) -> Self {
        let (bucket_id, bucket_name) = bucket;
        if !self.buckets.iter().any(|b| b.id == bucket_id) {
            self.buckets.push(Bucket {
                id: bucket_id.to_string(),
                name: bucket_name.to_string(),
            });
        }
        self.tables
            .push((bucket_id.to_string(), serde_json::from_value(table).unwrap()));
        self
    }

    pub fn with_table_failure(mut self, table_id: &str, code: u16, message: &str) -> Self {
        self.table_failures
            .insert(table_id.to_string(), (code, message.to_string()));
        self
    }

    pub fn with_token_failure(mut self, code: u16, message: &str) -> Self {
        self.token_failure = Some((code, message.to_string()));
        self
    }

    /// Configurations pushed through `update_configuration`, in order.
    pub fn updates(&self) -> Vec<(String, ComponentConfiguration)> {
        self.state.lock().unwrap().updates.clone()
    }
}

fn not_found(message: String) -> HttpError {
    HttpError::BadStatusCode {
        code: 404,
        message,
    }
}

#[async_trait::async_trait]
impl StorageApi for FakeStorage {
    fn api_url(&self) -> &str {
        &self.api_url
    }

    async fn verify_token(&self) -> Result<TokenInfo, HttpError> {
        if let Some((code, message)) = &self.token_failure {
            return Err(HttpError::BadStatusCode {
                code: *code,
                message: message.clone(),
            });
        }
        Ok(serde_json::from_value(json!({ "owner": self.project })).unwrap())
    }

    async fn index(&self) -> Result<StorageIndex, HttpError> {
        Ok(serde_json::from_value(self.index.clone()).unwrap())
    }

    async fn generate_id(&self) -> Result<String, HttpError> {
        Ok(self.next_id.clone())
    }

    async fn list_dev_branches(&self) -> Result<Vec<DevBranch>, HttpError> {
        Ok(serde_json::from_value(Value::Array(self.branches.clone())).unwrap())
    }

    async fn list_components(&self) -> Result<Vec<Component>, HttpError> {
        let state = self.state.lock().unwrap();
        Ok(self
            .components
            .iter()
            .map(|component_id| Component {
                id: component_id.clone(),
                configurations: state
                    .configurations
                    .iter()
                    .filter(|((id, _), _)| id == component_id)
                    .map(|(_, configuration)| ConfigurationSummary {
                        id: configuration.id.clone(),
                        name: configuration.name.clone(),
                    })
                    .collect(),
            })
            .collect())
    }

    async fn get_configuration(
        &self,
        component_id: &str,
        config_id: &str,
    ) -> Result<ComponentConfiguration, HttpError> {
        self.state
            .lock()
            .unwrap()
            .configurations
            .get(&(component_id.to_string(), config_id.to_string()))
            .cloned()
            .ok_or_else(|| not_found(format!("Configuration {config_id} not found")))
    }

    async fn update_configuration(
        &self,
        component_id: &str,
        configuration: &ComponentConfiguration,
    ) -> Result<(), HttpError> {
        let mut state = self.state.lock().unwrap();
        state.configurations.insert(
            (component_id.to_string(), configuration.id.clone()),
            configuration.clone(),
        );
        state
            .updates
            .push((component_id.to_string(), configuration.clone()));
        Ok(())
    }

    async fn list_buckets(&self) -> Result<Vec<Bucket>, HttpError> {
        Ok(self.buckets.clone())
    }

    async fn list_tables(&self, bucket_id: &str) -> Result<Vec<Table>, HttpError> {
        Ok(self
            .tables
            .iter()
            .filter(|(bucket, _)| bucket == bucket_id)
            .map(|(_, table)| table.clone())
            .collect())
    }

    async fn get_table(&self, table_id: &str) -> Result<Table, HttpError> {
        if let Some((code, message)) = self.table_failures.get(table_id) {
            return Err(HttpError::BadStatusCode {
                code: *code,
                message: message.clone(),
            });
        }
        self.tables
            .iter()
            .map(|(_, table)| table)
            .find(|table| table.id == table_id)
            .cloned()
            .ok_or_else(|| not_found(format!("The table \"{table_id}\" was not found")))
    }
}

/// Encryption API migrating every configuration successfully unless scripted otherwise.
#[derive(Default)]
pub struct FakeMigrationsApi {
    failures: HashMap<(String, String), (u16, String)>,
    warnings: HashMap<(String, String), Vec<String>>,
    requests: Mutex<Vec<MigrateConfigurationRequest>>,
}

impl FakeMigrationsApi {
    pub fn with_failure(mut self, component_id: &str, config_id: &str, code: u16, message: &str) -> Self {
        self.failures.insert(
            (component_id.to_string(), config_id.to_string()),
            (code, message.to_string()),
        );
        self
    }

    pub fn with_warnings(mut self, component_id: &str, config_id: &str, warnings: &[&str]) -> Self {
        self.warnings.insert(
            (component_id.to_string(), config_id.to_string()),
            warnings.iter().map(ToString::to_string).collect(),
        );
        self
    }

    pub fn requests(&self) -> Vec<MigrateConfigurationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl MigrationsApi for FakeMigrationsApi {
    async fn migrate_configuration(
        &self,
        request: MigrateConfigurationRequest,
    ) -> Result<MigrateConfigurationResponse, HttpError> {
        let key = (request.component_id.clone(), request.config_id.clone());
        self.requests.lock().unwrap().push(request.clone());

        if let Some((code, message)) = self.failures.get(&key) {
            return Err(HttpError::BadStatusCode {
                code: *code,
                message: message.clone(),
            });
        }
        Ok(MigrateConfigurationResponse {
            message: format!(
                "Configuration with ID \"{}\" successfully migrated to stack \"{}\".",
                request.config_id, request.destination_stack
            ),
            warnings: self.warnings.get(&key).cloned().unwrap_or_default(),
            data: json!({"destinationStack": request.destination_stack}),
        })
    }
}

type CapturedLine = (ThreadId, LogLevel, String);

/// Captures every log line together with the thread that emitted it.
struct CapturingLogger {
    lines: Mutex<Vec<CapturedLine>>,
}

impl Logger for CapturingLogger {
    fn log(&self, level: LogLevel, message: String) {
        self.lines
            .lock()
            .unwrap()
            .push((thread::current().id(), level, message));
    }
}

fn capturing_logger() -> &'static Arc<CapturingLogger> {
    static CAPTURE: OnceLock<Arc<CapturingLogger>> = OnceLock::new();
    CAPTURE.get_or_init(|| {
        let logger = Arc::new(CapturingLogger {
            lines: Mutex::new(Vec::new()),
        });
        set_logger(logger.clone());
        logger
    })
}

/// Installs the capturing logger and forgets what the current thread logged so far.
///
/// `#[tokio::test]` runs on a current-thread runtime, so everything a test
/// logs is attributed to its thread.
pub fn clear_logs() {
    let current = thread::current().id();
    capturing_logger()
        .lines
        .lock()
        .unwrap()
        .retain(|(thread, _, _)| *thread != current);
}

/// Lines logged by the current thread since [`clear_logs`].
pub fn logs() -> Vec<(LogLevel, String)> {
    let current = thread::current().id();
    capturing_logger()
        .lines
        .lock()
        .unwrap()
        .iter()
        .filter(|(thread, _, _)| *thread == current)
        .map(|(_, level, message)| (*level, message.clone()))
        .collect()
}

/// Lines of the current thread logged at `level`.
pub fn logs_at(level: LogLevel) -> Vec<String> {
    logs()
        .into_iter()
        .filter(|(l, _)| *l == level)
        .map(|(_, message)| message)
        .collect()
}
