use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use project_migrate::primitives::http_client::{HttpClient, HttpError, HttpMethod, HttpRequest};
use serde_json::{json, Value};

pub const SOURCE_URL: &str = "https://connection.keboola.com";
pub const DESTINATION_URL: &str = "https://connection.north-europe.azure.keboola.com";
pub const SOURCE_QUEUE: &str = "https://queue.keboola.com";
pub const DESTINATION_QUEUE: &str = "https://queue.north-europe.azure.keboola.com";

type Response = Result<Value, (u16, String)>;

/// Both stacks behind one scripted transport.
///
/// Responses are queued per method and URL; the last one keeps being served.
#[derive(Default)]
pub struct ScriptedStacks {
    routes: Mutex<HashMap<String, VecDeque<Response>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

fn route(method: HttpMethod, url: &str) -> String {
    format!("{method:?} {url}")
}

impl ScriptedStacks {
    pub fn respond(&self, method: HttpMethod, url: &str, body: Value) -> &Self {
        self.push(method, url, Ok(body))
    }

    pub fn fail(&self, method: HttpMethod, url: &str, code: u16, message: &str) -> &Self {
        self.push(method, url, Err((code, message.to_string())))
    }

    fn push(&self, method: HttpMethod, url: &str, response: Response) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .entry(route(method, url))
            .or_default()
            .push_back(response);
        self
    }

    /// Bodies of the requests sent to `url`, in order.
    pub fn bodies(&self, method: HttpMethod, url: &str) -> Vec<Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.method == method && request.url == url)
            .filter_map(|request| request.body.as_deref())
            .filter_map(|body| serde_json::from_slice(body).ok())
            .collect()
    }

    /// Value of `header` of every request sent to a URL starting with `prefix`.
    pub fn headers(&self, prefix: &str, header: &str) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.url.starts_with(prefix))
            .filter_map(|request| {
                request
                    .headers
                    .iter()
                    .find(|h| h.name == header)
                    .map(|h| h.value.clone())
            })
            .collect()
    }

    /// A source project on the Job Queue and an empty destination project.
    pub fn with_projects(self) -> Self {
        self.respond(
            HttpMethod::Get,
            &format!("{SOURCE_URL}/v2/storage/tokens/verify"),
            json!({"owner": {"id": 123, "name": "Source", "features": ["queuev2"]}}),
        )
        .respond(
            HttpMethod::Get,
            &format!("{SOURCE_URL}/v2/storage"),
            json!({
                "services": [
                    {"id": "queue", "url": SOURCE_QUEUE},
                    {"id": "sync-actions", "url": "https://sync-actions.keboola.com"},
                    {"id": "encryption", "url": "https://encryption.keboola.com"},
                ],
                "components": [{"id": "keboola.project-backup"}],
            }),
        )
        .respond(
            HttpMethod::Get,
            &format!("{DESTINATION_URL}/v2/storage/tokens/verify"),
            json!({"owner": {"id": 456, "name": "Destination", "features": ["queuev2"]}}),
        )
        .respond(
            HttpMethod::Get,
            &format!("{DESTINATION_URL}/v2/storage"),
            json!({
                "services": [
                    {"id": "queue", "url": DESTINATION_QUEUE},
                    {"id": "sync-actions", "url": "https://sync-actions.north-europe.azure.keboola.com"},
                ],
                "components": [
                    {"id": "keboola.project-restore"},
                    {"id": "keboola.app-orchestrator-migrate"},
                    {"id": "keboola.app-snowflake-writer-migrate"},
                ],
            }),
        )
        .respond(
            HttpMethod::Get,
            &format!("{DESTINATION_URL}/v2/storage/components?include="),
            json!([]),
        )
        .respond(
            HttpMethod::Get,
            &format!("{DESTINATION_URL}/v2/storage/buckets"),
            json!([]),
        );
        self
    }

    /// Backup id and S3 read credentials of the source project.
    pub fn with_backup_credentials(self) -> Self {
        self.respond(
            HttpMethod::Post,
            &format!("{SOURCE_URL}/v2/storage/tickets"),
            json!({"id": "42"}),
        )
        .respond(
            HttpMethod::Post,
            "https://sync-actions.keboola.com/actions",
            json!({
                "backupId": "42",
                "backupUri": "https://kbc-backups.s3.amazonaws.com/data-takeout/us-east-1/42/",
                "region": "us-east-1",
                "credentials": {
                    "accessKeyId": "AKIA-ACCESS",
                    "secretAccessKey": "s3-secret",
                    "sessionToken": "s3-session",
                },
            }),
        );
        self
    }

    /// Job `id` on `queue`: submitted once, processing on the first read, then `status`.
    pub fn with_job(self, queue: &str, id: u64, status: &str, message: &str) -> Self {
        let url = format!("{queue}/jobs/{id}");
        self.respond(HttpMethod::Post, &format!("{queue}/jobs"), json!({"id": id}))
            .respond(
                HttpMethod::Get,
                &url,
                json!({"id": id, "status": "processing", "isFinished": false}),
            )
            .respond(
                HttpMethod::Get,
                &url,
                json!({
                    "id": id,
                    "status": status,
                    "isFinished": true,
                    "result": {"message": message},
                }),
            );
        self
    }
}

#[async_trait::async_trait]
impl HttpClient for ScriptedStacks {
    async fn fetch(&self, request: HttpRequest) -> Result<Vec<u8>, HttpError> {
        let key = route(request.method, &request.url);
        self.requests.lock().unwrap().push(request);

        let mut routes = self.routes.lock().unwrap();
        let response = match routes.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        match response {
            Some(Ok(body)) => Ok(body.to_string().into_bytes()),
            Some(Err((code, message))) => Err(HttpError::BadStatusCode { code, message }),
            None => Err(HttpError::BadStatusCode {
                code: 404,
                message: format!("No route for {key}"),
            }),
        }
    }
}
