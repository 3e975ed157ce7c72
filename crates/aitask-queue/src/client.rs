//! Parse REST client for the task collection.
//!
//! - `GET  <collection>?limit=N&skip=0&where=<json>` lists tasks
//! - `PUT  <collection>/<id>` updates one task
//!
//! Authentication uses the application id and REST API key headers.

use std::time::{Duration, Instant};

use aitask_models::{Task, TaskStatus, TaskType};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::error::{QueueError, QueueResult};
use crate::filter::{FilterMode, TaskFilter};
use crate::metrics::{record_claim_lost, record_request};
use crate::queue::{ClaimOutcome, FailureUpdate, TaskQueue};
use crate::retry::{with_retry, RetryConfig};

/// Queue client configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Parse server origin, e.g. `http://queue.internal`
    pub api_url: String,
    /// Path of the task class below the origin
    pub task_path: String,
    /// `X-Parse-Application-Id`
    pub application_id: String,
    /// `X-Parse-REST-API-Key`
    pub rest_api_key: String,
    /// Request timeout
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Retry configuration for idempotent writes
    pub retry: RetryConfig,
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        let application_id = std::env::var("PARSE_APPLICATION_ID")
            .map_err(|_| QueueError::config_error("PARSE_APPLICATION_ID not set"))?;
        let rest_api_key = std::env::var("PARSE_REST_API_KEY")
            .map_err(|_| QueueError::config_error("PARSE_REST_API_KEY not set"))?;

        Ok(Self {
            api_url: std::env::var("QUEUE_API_URL")
                .unwrap_or_else(|_| "http://127.0.0.1".to_string()),
            task_path: std::env::var("QUEUE_TASK_PATH")
                .unwrap_or_else(|_| "/parseapi/parse/classes/AITask".to_string()),
            application_id,
            rest_api_key,
            timeout: Duration::from_secs(
                std::env::var("QUEUE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            connect_timeout: Duration::from_secs(5),
            retry: RetryConfig::from_env(),
        })
    }

    /// Full URL of the task collection.
    pub fn task_collection_url(&self) -> String {
        format!(
            "{}/{}",
            self.api_url.trim_end_matches('/'),
            self.task_path.trim_start_matches('/')
        )
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    results: Vec<Value>,
}

/// Task queue backed by a Parse server.
#[derive(Clone)]
pub struct ParseQueueClient {
    http: Client,
    config: QueueConfig,
    collection_url: String,
    executor: String,
    filter_mode: FilterMode,
}

impl ParseQueueClient {
    /// Create a client that writes `executor` into every update it makes.
    pub fn new(config: QueueConfig, executor: impl Into<String>) -> QueueResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-Parse-Application-Id",
            HeaderValue::from_str(&config.application_id)
                .map_err(|e| QueueError::config_error(format!("invalid application id: {}", e)))?,
        );
        headers.insert(
            "X-Parse-REST-API-Key",
            HeaderValue::from_str(&config.rest_api_key)
                .map_err(|e| QueueError::config_error(format!("invalid REST API key: {}", e)))?,
        );
        headers.insert("X-Parse-Revocable-Session", HeaderValue::from_static("1"));

        let http = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(concat!("aitask-queue/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(QueueError::Network)?;

        Ok(Self {
            http,
            collection_url: config.task_collection_url(),
            config,
            executor: executor.into(),
            filter_mode: FilterMode::legacy(),
        })
    }

    /// Widen fetches to lease-expired claims and/or gate on `retryAfter`.
    pub fn with_filter_mode(mut self, mode: FilterMode) -> Self {
        self.filter_mode = mode;
        self
    }

    pub fn executor(&self) -> &str {
        &self.executor
    }

    fn task_url(&self, task: &Task) -> String {
        format!("{}/{}", self.collection_url, task.id)
    }

    /// Time a request, tag it with a span, record metrics.
    async fn execute_request<T, F>(&self, operation: &str, task_id: Option<&str>, fut: F) -> QueueResult<T>
    where
        F: std::future::Future<Output = QueueResult<T>>,
    {
        let span = match task_id {
            Some(id) => info_span!("queue_request", operation = %operation, task_id = %id),
            None => info_span!("queue_request", operation = %operation),
        };

        let start = Instant::now();
        let result = fut.instrument(span).await;
        let latency_ms = start.elapsed().as_millis() as f64;

        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.http_status().unwrap_or(500),
        };
        record_request(operation, status, latency_ms);

        result
    }

    async fn put_json(&self, operation: &str, task: &Task, body: &Value) -> QueueResult<Value> {
        let url = self.task_url(task);

        self.execute_request(operation, Some(task.id.as_str()), async {
            let response = self.http.put(&url).json(body).send().await?;
            let status = response.status();

            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(QueueError::from_http_status(
                    status.as_u16(),
                    format!("PUT {} failed: {}", url, text),
                ));
            }

            let value: Value = response.json().await?;
            Ok(value)
        })
        .await
    }

    /// Current server copy of `task`.
    async fn get_task(&self, task: &Task) -> QueueResult<Task> {
        let url = self.task_url(task);

        self.execute_request("get_task", Some(task.id.as_str()), async {
            let response = self.http.get(&url).send().await?;
            let status = response.status();

            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(QueueError::from_http_status(
                    status.as_u16(),
                    format!("GET {} failed: {}", url, text),
                ));
            }

            response
                .json::<Task>()
                .await
                .map_err(|e| QueueError::invalid_response(format!("task record: {}", e)))
        })
        .await
    }

    async fn put_with_retry(&self, operation: &str, task: &Task, body: Value) -> QueueResult<()> {
        with_retry(&self.config.retry, operation, || self.put_json(operation, task, &body)).await?;
        Ok(())
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Decode each result on its own so one malformed record cannot hide the rest.
fn decode_tasks(results: Vec<Value>) -> Vec<Task> {
    results
        .into_iter()
        .filter_map(|raw| {
            let id = raw
                .get("objectId")
                .and_then(Value::as_str)
                .unwrap_or("<no objectId>")
                .to_string();
            match serde_json::from_value::<Task>(raw) {
                Ok(task) => Some(task),
                Err(e) => {
                    warn!(task_id = %id, "Skipping malformed task record: {}", e);
                    None
                }
            }
        })
        .collect()
}

#[async_trait]
impl TaskQueue for ParseQueueClient {
    async fn fetch_pending(&self, task_type: TaskType, limit: usize) -> QueueResult<Vec<Task>> {
        let filter = TaskFilter::new(task_type, self.filter_mode, now_ms());
        let where_json = serde_json::to_string(&filter.to_where())?;

        debug!(task_type = %task_type, limit, "Querying tasks where {}", where_json);

        let results = self
            .execute_request("fetch_pending", None, async {
                let response = self
                    .http
                    .get(&self.collection_url)
                    .query(&[
                        ("limit", limit.to_string()),
                        ("skip", "0".to_string()),
                        ("where", where_json.clone()),
                    ])
                    .send()
                    .await?;
                let status = response.status();

                if !status.is_success() {
                    let text = response.text().await.unwrap_or_default();
                    return Err(QueueError::from_http_status(
                        status.as_u16(),
                        format!("GET {} failed: {}", self.collection_url, text),
                    ));
                }

                let body: QueryResponse = response
                    .json()
                    .await
                    .map_err(|e| QueueError::invalid_response(format!("task query: {}", e)))?;
                Ok(body.results)
            })
            .await?;

        let tasks = decode_tasks(results);
        info!(task_type = %task_type, "Fetched {} {} tasks", tasks.len(), task_type);
        Ok(tasks)
    }

    async fn claim(&self, task: &Task, lease: Duration) -> QueueResult<ClaimOutcome> {
        // The lease rides on the increment so the task is hidden from
        // lease-aware fetches before status changes. Status is left alone
        // here, so a losing attempt cannot undo another worker's write.
        // Not retried: a replayed increment would only make us lose our own claim.
        let bump = json!({
            "claimSeq": { "__op": "Increment", "amount": 1 },
            "leaseExpiresAt": now_ms() + lease.as_millis() as i64,
        });
        let response = match self.put_json("claim", task, &bump).await {
            Ok(v) => v,
            Err(QueueError::NotFound(_)) => return Ok(ClaimOutcome::Lost),
            Err(e) => return Err(e),
        };

        let seq = response
            .get("claimSeq")
            .and_then(Value::as_u64)
            .ok_or_else(|| QueueError::invalid_response("claim response missing claimSeq"))?;

        if seq != task.claim_seq + 1 {
            debug!(task_id = %task.id, observed = task.claim_seq, got = seq, "Claim lost");
            record_claim_lost();
            return Ok(ClaimOutcome::Lost);
        }

        self.put_with_retry(
            "claim_status",
            task,
            json!({
                "status": TaskStatus::Claimed.code(),
                "executor": self.executor,
            }),
        )
        .await?;

        Ok(ClaimOutcome::Won)
    }

    async fn holds_claim(&self, task: &Task) -> QueueResult<bool> {
        match with_retry(&self.config.retry, "holds_claim", || self.get_task(task)).await {
            Ok(current) => Ok(current.status == TaskStatus::Claimed
                && current.claim_seq == task.claim_seq + 1),
            Err(QueueError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn release(&self, task: &Task) -> QueueResult<()> {
        self.put_with_retry(
            "release",
            task,
            json!({
                "status": TaskStatus::Pending.code(),
                "leaseExpiresAt": { "__op": "Delete" },
            }),
        )
        .await
    }

    async fn report_result(&self, task: &Task, status: TaskStatus, results: &[String]) -> QueueResult<()> {
        info!(task_id = %task.id, status = %status, "Updating task status");
        self.put_with_retry(
            "report_result",
            task,
            json!({
                "status": status.code(),
                "result": results,
                "executor": self.executor,
            }),
        )
        .await
    }

    async fn report_failure(&self, task: &Task, update: &FailureUpdate) -> QueueResult<()> {
        let body = match update {
            FailureUpdate::Reschedule {
                attempts,
                retry_after_ms,
                error,
            } => json!({
                "status": update.status().code(),
                "attempts": attempts,
                "retryAfter": retry_after_ms,
                "leaseExpiresAt": { "__op": "Delete" },
                "lastError": error,
                "executor": self.executor,
            }),
            FailureUpdate::DeadLetter { attempts, error } => json!({
                "status": update.status().code(),
                "attempts": attempts,
                "lastError": error,
                "executor": self.executor,
            }),
        };

        self.put_with_retry("report_failure", task, body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use wiremock::matchers::{
        body_json, body_partial_json, header, method, path, path_regex, query_param,
    };
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const COLLECTION: &str = "/parse/classes/AITask";

    fn test_config(server: &MockServer) -> QueueConfig {
        QueueConfig {
            api_url: server.uri(),
            task_path: COLLECTION.to_string(),
            application_id: "app-id".to_string(),
            rest_api_key: "rest-key".to_string(),
            timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(2),
            retry: RetryConfig {
                max_retries: 2,
                base_delay_ms: 1,
                max_delay_ms: 5,
            },
        }
    }

    fn client(server: &MockServer) -> ParseQueueClient {
        ParseQueueClient::new(test_config(server), "acc1").unwrap()
    }

    #[test]
    fn test_collection_url_joins_cleanly() {
        let config = QueueConfig {
            api_url: "http://queue/".to_string(),
            task_path: "/parseapi/parse/classes/AITask".to_string(),
            application_id: "a".to_string(),
            rest_api_key: "k".to_string(),
            timeout: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(1),
            retry: RetryConfig::none(),
        };
        assert_eq!(
            config.task_collection_url(),
            "http://queue/parseapi/parse/classes/AITask"
        );
    }

    #[tokio::test]
    async fn test_fetch_pending_sends_filter_and_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(COLLECTION))
            .and(query_param("limit", "2"))
            .and(query_param("skip", "0"))
            .and(header("X-Parse-Application-Id", "app-id"))
            .and(header("X-Parse-REST-API-Key", "rest-key"))
            .and(header("X-Parse-Revocable-Session", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {"objectId": "T1", "type": "txt2img", "status": 0, "data": {"prompt": "cat"}},
                    {"objectId": "T2", "type": "txt2img", "status": 0}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tasks = client(&server)
            .fetch_pending(TaskType::TextToImage, 2)
            .await
            .unwrap();

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].id.as_str(), "T1");
        assert!(tasks[1].data.is_none());

        let requests = server.received_requests().await.unwrap();
        let where_param = url::Url::parse(&requests[0].url.to_string())
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == "where")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        let where_json: Value = serde_json::from_str(&where_param).unwrap();
        assert_eq!(where_json, json!({"type": "txt2img", "status": 0}));
    }

    #[tokio::test]
    async fn test_fetch_skips_malformed_records() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(COLLECTION))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {"objectId": "bad", "type": "video", "status": 0},
                    {"objectId": "T1", "type": "img2img", "status": 0, "data": {}}
                ]
            })))
            .mount(&server)
            .await;

        let tasks = client(&server)
            .fetch_pending(TaskType::ImageToImage, 5)
            .await
            .unwrap();

        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id.as_str(), "T1");
    }

    #[tokio::test]
    async fn test_fetch_surfaces_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(COLLECTION))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = client(&server)
            .fetch_pending(TaskType::TextToImage, 2)
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::ServerError(500, _)));
    }

    #[tokio::test]
    async fn test_fetch_rejects_body_without_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(COLLECTION))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": "nope"})))
            .mount(&server)
            .await;

        let err = client(&server)
            .fetch_pending(TaskType::TextToImage, 2)
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_report_result_body() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(format!("{}/T1", COLLECTION)))
            .and(body_json(json!({
                "status": 1,
                "result": ["http://s/aitask/acc1/output_T1_0.png"],
                "executor": "acc1"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"updatedAt": "now"})))
            .expect(1)
            .mount(&server)
            .await;

        let task = Task::new("T1", TaskType::TextToImage, None);
        client(&server)
            .report_result(
                &task,
                TaskStatus::Completed,
                &["http://s/aitask/acc1/output_T1_0.png".to_string()],
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_report_result_retries_transient_failure() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(format!("{}/T1", COLLECTION)))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(format!("{}/T1", COLLECTION)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let task = Task::new("T1", TaskType::TextToImage, None);
        client(&server)
            .report_result(&task, TaskStatus::Completed, &[])
            .await
            .unwrap();

        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_claim_won_sets_lease_with_increment() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(format!("{}/T1", COLLECTION)))
            .and(body_partial_json(json!({"claimSeq": {"__op": "Increment", "amount": 1}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"claimSeq": 1})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(format!("{}/T1", COLLECTION)))
            .and(body_json(json!({"status": 2, "executor": "acc1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let before = now_ms();
        let task = Task::new("T1", TaskType::TextToImage, None);
        let outcome = client(&server)
            .claim(&task, Duration::from_secs(600))
            .await
            .unwrap();
        assert_eq!(outcome, ClaimOutcome::Won);

        let requests = server.received_requests().await.unwrap();
        let first: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(first.get("status").is_none());
        assert!(first["leaseExpiresAt"].as_i64().unwrap() >= before + 600_000);
    }

    #[tokio::test]
    async fn test_claim_lost_to_other_worker() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(format!("{}/T1", COLLECTION)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"claimSeq": 2})))
            .mount(&server)
            .await;

        let task = Task::new("T1", TaskType::TextToImage, None);
        let outcome = client(&server)
            .claim(&task, Duration::from_secs(600))
            .await
            .unwrap();

        assert_eq!(outcome, ClaimOutcome::Lost);
        // The lease write never happens for a lost claim.
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_claim_of_deleted_task_is_lost() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let task = Task::new("gone", TaskType::TextToImage, None);
        let outcome = client(&server)
            .claim(&task, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(outcome, ClaimOutcome::Lost);
    }

    #[tokio::test]
    async fn test_report_failure_dead_letter_body() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(format!("{}/T4", COLLECTION)))
            .and(body_json(json!({
                "status": 3,
                "attempts": 5,
                "lastError": "backend returned 500",
                "executor": "acc1"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let task = Task::new("T4", TaskType::TextToSpeech, None);
        client(&server)
            .report_failure(
                &task,
                &FailureUpdate::DeadLetter {
                    attempts: 5,
                    error: "backend returned 500".to_string(),
                },
            )
            .await
            .unwrap();
    }

    /// Parse-like task store: applies `Increment`/`Delete` ops on PUT and
    /// evaluates the subset of `where` the fetch filter uses on GET.
    #[derive(Clone)]
    struct ParseStub {
        record: Arc<Mutex<Value>>,
        increment_delay: Duration,
    }

    impl ParseStub {
        fn apply(&self, body: &Value) -> Value {
            let mut record = self.record.lock().unwrap();
            let mut echoed = serde_json::Map::new();
            for (key, value) in body.as_object().unwrap() {
                match value.get("__op").and_then(Value::as_str) {
                    Some("Increment") => {
                        let next = record[key].as_i64().unwrap_or(0) + value["amount"].as_i64().unwrap();
                        record[key] = json!(next);
                        echoed.insert(key.clone(), json!(next));
                    }
                    Some("Delete") => {
                        record.as_object_mut().unwrap().remove(key);
                    }
                    _ => record[key] = value.clone(),
                }
            }
            Value::Object(echoed)
        }
    }

    fn field_matches(field: Option<&Value>, condition: &Value) -> bool {
        match condition.as_object() {
            Some(ops) if ops.keys().all(|k| k.starts_with('$')) => {
                ops.iter().all(|(op, arg)| match op.as_str() {
                    "$exists" => field.is_some() == arg.as_bool().unwrap(),
                    "$lte" => field
                        .and_then(Value::as_i64)
                        .is_some_and(|v| v <= arg.as_i64().unwrap()),
                    other => panic!("unsupported operator {}", other),
                })
            }
            _ => field == Some(condition),
        }
    }

    fn where_matches(record: &Value, condition: &Value) -> bool {
        condition.as_object().unwrap().iter().all(|(key, value)| match key.as_str() {
            "$or" => value
                .as_array()
                .unwrap()
                .iter()
                .any(|c| where_matches(record, c)),
            _ => field_matches(record.get(key), value),
        })
    }

    impl wiremock::Respond for ParseStub {
        fn respond(&self, request: &wiremock::Request) -> ResponseTemplate {
            if request.method.to_string() == "PUT" {
                let body: Value = serde_json::from_slice(&request.body).unwrap();
                let echoed = self.apply(&body);
                let template = ResponseTemplate::new(200).set_body_json(echoed);
                return if body.get("claimSeq").is_some() {
                    template.set_delay(self.increment_delay)
                } else {
                    template
                };
            }

            let where_param = request
                .url
                .query_pairs()
                .find(|(k, _)| k == "where")
                .map(|(_, v)| v.into_owned())
                .unwrap();
            let condition: Value = serde_json::from_str(&where_param).unwrap();
            let record = self.record.lock().unwrap().clone();
            let results: Vec<Value> = if where_matches(&record, &condition) {
                vec![record]
            } else {
                Vec::new()
            };
            ResponseTemplate::new(200).set_body_json(json!({ "results": results }))
        }
    }

    fn lease_aware(client: ParseQueueClient) -> ParseQueueClient {
        client.with_filter_mode(FilterMode {
            lease_aware: true,
            respect_retry_after: false,
        })
    }

    #[tokio::test]
    async fn test_claim_in_flight_is_not_fetched_by_second_worker() {
        let server = MockServer::start().await;
        let stub = ParseStub {
            record: Arc::new(Mutex::new(json!({
                "objectId": "T1", "type": "txt2img", "status": 0, "data": {"prompt": "cat"}
            }))),
            increment_delay: Duration::from_millis(400),
        };
        Mock::given(path_regex(format!("^{}(/T1)?$", COLLECTION)))
            .respond_with(stub.clone())
            .mount(&server)
            .await;

        let worker_a = lease_aware(client(&server));
        let worker_b = lease_aware(ParseQueueClient::new(test_config(&server), "acc2").unwrap());

        let seen_by_a = worker_a.fetch_pending(TaskType::TextToImage, 1).await.unwrap();
        assert_eq!(seen_by_a.len(), 1);

        let claiming = {
            let worker_a = worker_a.clone();
            let task = seen_by_a[0].clone();
            tokio::spawn(async move { worker_a.claim(&task, Duration::from_secs(600)).await })
        };

        // The increment has landed but its response is still in flight.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(stub.record.lock().unwrap()["claimSeq"], json!(1));
        assert_eq!(stub.record.lock().unwrap()["status"], json!(0));
        let seen_by_b = worker_b.fetch_pending(TaskType::TextToImage, 1).await.unwrap();
        assert!(seen_by_b.is_empty());

        assert_eq!(claiming.await.unwrap().unwrap(), ClaimOutcome::Won);
        let record = stub.record.lock().unwrap().clone();
        assert_eq!(record["status"], json!(2));
        assert_eq!(record["executor"], json!("acc1"));

        // B acting on A's stale snapshot loses and leaves status alone.
        let outcome = worker_b
            .claim(&seen_by_a[0], Duration::from_secs(600))
            .await
            .unwrap();
        assert_eq!(outcome, ClaimOutcome::Lost);
        let record = stub.record.lock().unwrap().clone();
        assert_eq!(record["status"], json!(2));
        assert_eq!(record["executor"], json!("acc1"));
    }

    #[tokio::test]
    async fn test_holds_claim_compares_claim_seq() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{}/T1", COLLECTION)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "objectId": "T1", "type": "txt2img", "status": 2, "claimSeq": 3, "executor": "acc1"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{}/gone", COLLECTION)))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let queue = client(&server);
        let mut snapshot = Task::new("T1", TaskType::TextToImage, None);

        snapshot.claim_seq = 2;
        assert!(queue.holds_claim(&snapshot).await.unwrap());

        // Someone claimed again after us.
        snapshot.claim_seq = 1;
        assert!(!queue.holds_claim(&snapshot).await.unwrap());

        let gone = Task::new("gone", TaskType::TextToImage, None);
        assert!(!queue.holds_claim(&gone).await.unwrap());
    }
}
