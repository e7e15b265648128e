#![allow(dead_code)]

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use lium_sdk::{ClientOptions, Config, Lium, LifecycleTimings, RetryPolicy, SshBackend};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::path::Path as FsPath;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const API_KEY: &str = "test-key";

/// In-memory fleet behind the mock API.
#[derive(Debug, Default)]
pub struct Fleet {
    pub executors: Vec<Value>,
    pub pods: Vec<Value>,
    pub templates: Vec<Value>,
    /// Body returned by `POST /executors/{id}/rent`.
    pub rent_response: Value,
    /// Pods that appear in listings once a rent request arrives.
    pub pods_after_rent: Vec<Value>,
    /// Statuses served by `GET /executors` before the real listing.
    pub executor_failures: VecDeque<u16>,
    pub rented: Vec<(String, Value)>,
    pub released: Vec<String>,
    pub hits: HashMap<String, usize>,
}

#[derive(Clone)]
pub struct FleetState(Arc<Mutex<Fleet>>);

impl FleetState {
    pub fn hits(&self, route: &str) -> usize {
        self.0.lock().unwrap().hits.get(route).copied().unwrap_or(0)
    }

    pub fn with<T>(&self, f: impl FnOnce(&mut Fleet) -> T) -> T {
        f(&mut self.0.lock().unwrap())
    }
}

fn authorize(headers: &HeaderMap) -> Option<Response> {
    match headers.get("X-API-KEY").and_then(|v| v.to_str().ok()) {
        Some(API_KEY) => None,
        _ => Some((StatusCode::UNAUTHORIZED, Json(json!({ "message": "invalid api key" }))).into_response()),
    }
}

async fn list_executors(State(state): State<FleetState>, headers: HeaderMap) -> Response {
    if let Some(denied) = authorize(&headers) {
        return denied;
    }
    let mut fleet = state.0.lock().unwrap();
    *fleet.hits.entry("executors".into()).or_default() += 1;
    if let Some(status) = fleet.executor_failures.pop_front() {
        let status = StatusCode::from_u16(status).unwrap();
        return (status, Json(json!({ "message": "try later" }))).into_response();
    }
    Json(Value::Array(fleet.executors.clone())).into_response()
}

async fn list_pods(State(state): State<FleetState>, headers: HeaderMap) -> Response {
    if let Some(denied) = authorize(&headers) {
        return denied;
    }
    let mut fleet = state.0.lock().unwrap();
    *fleet.hits.entry("pods".into()).or_default() += 1;
    Json(Value::Array(fleet.pods.clone())).into_response()
}

async fn get_pod(State(state): State<FleetState>, Path(id): Path<String>, headers: HeaderMap) -> Response {
    if let Some(denied) = authorize(&headers) {
        return denied;
    }
    let mut fleet = state.0.lock().unwrap();
    *fleet.hits.entry(format!("pod:{}", id)).or_default() += 1;
    match fleet.pods.iter().find(|p| p["id"] == id.as_str()) {
        Some(pod) => Json(pod.clone()).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({ "message": "pod not found" }))).into_response(),
    }
}

async fn list_templates(State(state): State<FleetState>, headers: HeaderMap) -> Response {
    if let Some(denied) = authorize(&headers) {
        return denied;
    }
    let fleet = state.0.lock().unwrap();
    Json(Value::Array(fleet.templates.clone())).into_response()
}

async fn rent(
    State(state): State<FleetState>,
    Path(executor_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(denied) = authorize(&headers) {
        return denied;
    }
    let mut fleet = state.0.lock().unwrap();
    fleet.rented.push((executor_id, body));
    let appearing = std::mem::take(&mut fleet.pods_after_rent);
    fleet.pods.extend(appearing);
    Json(fleet.rent_response.clone()).into_response()
}

async fn release(State(state): State<FleetState>, Path(executor_id): Path<String>, headers: HeaderMap) -> Response {
    if let Some(denied) = authorize(&headers) {
        return denied;
    }
    state.0.lock().unwrap().released.push(executor_id);
    Json(json!({ "status": "released" })).into_response()
}

/// Serve `fleet` on an ephemeral port; returns the base URL.
pub async fn spawn_fleet(fleet: Fleet) -> (String, FleetState) {
    let state = FleetState(Arc::new(Mutex::new(fleet)));
    let app = Router::new()
        .route("/executors", get(list_executors))
        .route("/executors/{id}/rent", axum::routing::post(rent).delete(release))
        .route("/pods", get(list_pods))
        .route("/pods/{id}", get(get_pod))
        .route("/templates", get(list_templates))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}/", addr), state)
}

pub fn fast_options() -> ClientOptions {
    ClientOptions {
        retry: RetryPolicy {
            max_attempts: 6,
            base_delay: Duration::from_millis(5),
            max_jitter: Duration::from_millis(5),
        },
        timings: LifecycleTimings {
            poll_interval: Duration::from_millis(10),
            ready_check_interval: Duration::from_millis(10),
            settle_delay: Duration::from_millis(5),
            settle_retry_delay: Duration::from_millis(5),
        },
        ..Default::default()
    }
}

pub fn client(base_url: &str) -> Lium {
    Lium::with_options(Config::new(API_KEY).with_base_url(base_url), fast_options()).unwrap()
}

pub fn client_with_backend(base_url: &str, key: &FsPath, backend: Arc<dyn SshBackend>) -> Lium {
    let config = Config::new(API_KEY)
        .with_base_url(base_url)
        .with_ssh_key_path(key);
    Lium::with_backend(config, fast_options(), backend).unwrap()
}

pub fn pod_json(id: &str, name: &str, status: &str, host: Option<&str>) -> Value {
    json!({
        "id": id,
        "pod_name": name,
        "status": status,
        "ssh_connect_cmd": host.map(|h| format!("ssh root@{} -p 2200", h)),
        "ports_mapping": { "22": 2200 },
        "executor": { "id": format!("exec-{}", id) },
        "template": { "id": "tpl-1" },
    })
}

pub fn executor_json(id: &str, machine: &str, price: f64, gpus: u64) -> Value {
    json!({
        "id": id,
        "machine_name": machine,
        "price_per_hour": price,
        "location": { "country": "US" },
        "specs": { "gpu": { "count": gpus }, "sysbox_runtime": true },
        "status": "available",
    })
}
