use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod gpu;
pub mod huid;
pub mod ssh;

pub use gpu::{extract_gpu_type, gpu_type_matches, parse_gpu_types};
pub use huid::{generate_huid, INVALID_HUID};
pub use ssh::SshEndpoint;

/// Status string the fleet API reports once a pod is reachable.
pub const STATUS_RUNNING: &str = "RUNNING";

// --- Raw API records ---

/// Executor record exactly as `GET /executors` returns it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawExecutor {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub machine_name: String,
    #[serde(default)]
    pub price_per_hour: f64,
    #[serde(default)]
    pub location: Map<String, Value>,
    #[serde(default)]
    pub specs: Value,
    #[serde(default)]
    pub status: Option<String>,
}

/// Pod record exactly as `GET /pods` and `GET /pods/{id}` return it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPod {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub pod_name: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub ssh_connect_cmd: Option<String>,
    #[serde(default)]
    pub ports_mapping: Map<String, Value>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub executor: Value,
    #[serde(default)]
    pub template: Value,
}

// --- Entities ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Executor {
    pub id: String,
    pub huid: String,
    pub machine_name: String,
    pub gpu_type: String,
    pub gpu_count: u32,
    pub price_per_hour: f64,
    pub price_per_gpu_hour: f64,
    pub location: Map<String, Value>,
    pub specs: Value,
    pub docker_in_docker: bool,
    pub status: String,
}

impl From<RawExecutor> for Executor {
    fn from(raw: RawExecutor) -> Self {
        let gpu_count = raw
            .specs
            .pointer("/gpu/count")
            .and_then(Value::as_u64)
            .and_then(|c| u32::try_from(c).ok())
            .unwrap_or(1);
        let docker_in_docker = raw
            .specs
            .get("sysbox_runtime")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Self {
            huid: generate_huid(&raw.id),
            gpu_type: extract_gpu_type(&raw.machine_name),
            price_per_gpu_hour: raw.price_per_hour / f64::from(gpu_count.max(1)),
            id: raw.id,
            machine_name: raw.machine_name,
            gpu_count,
            price_per_hour: raw.price_per_hour,
            location: raw.location,
            specs: raw.specs,
            docker_in_docker,
            status: raw.status.unwrap_or_else(|| "unknown".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pod {
    pub id: String,
    pub name: String,
    pub status: String,
    pub huid: String,
    pub ssh_cmd: Option<String>,
    pub ports: Map<String, Value>,
    pub created_at: String,
    pub updated_at: String,
    pub executor: Value,
    pub template: Value,
}

impl From<RawPod> for Pod {
    fn from(raw: RawPod) -> Self {
        Self {
            huid: generate_huid(&raw.id),
            id: raw.id,
            name: raw.pod_name,
            status: raw.status.unwrap_or_else(|| "unknown".to_string()),
            ssh_cmd: raw
                .ssh_connect_cmd
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            ports: raw.ports_mapping,
            created_at: raw.created_at.unwrap_or_default(),
            updated_at: raw.updated_at.unwrap_or_default(),
            executor: raw.executor,
            template: raw.template,
        }
    }
}

impl Pod {
    pub fn is_running(&self) -> bool {
        self.status.eq_ignore_ascii_case(STATUS_RUNNING)
    }

    /// Running and reachable over SSH.
    pub fn is_ready(&self) -> bool {
        self.is_running() && self.ssh_cmd.is_some()
    }

    pub fn ssh_endpoint(&self) -> Option<SshEndpoint> {
        self.ssh_cmd.as_deref().and_then(SshEndpoint::parse)
    }

    pub fn host(&self) -> Option<String> {
        self.ssh_endpoint().map(|e| e.host)
    }

    pub fn username(&self) -> Option<String> {
        self.ssh_endpoint().map(|e| e.user)
    }

    pub fn ssh_port(&self) -> u16 {
        self.ssh_endpoint()
            .map(|e| e.port)
            .unwrap_or(ssh::DEFAULT_SSH_PORT)
    }

    /// Id of the executor backing this pod, if the API sent one.
    pub fn executor_id(&self) -> Option<&str> {
        self.executor
            .get("id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn template_id(&self) -> Option<&str> {
        self.template
            .get("id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub docker_image: Option<String>,
    #[serde(default)]
    pub docker_image_tag: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Outcome of a provisioning request.
///
/// The rent endpoint does not always echo the created pod, so callers may
/// only get a placeholder carrying what they asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum Provisioned {
    Confirmed(Pod),
    Placeholder { name: String, executor_id: String },
}

impl Provisioned {
    pub fn pod(&self) -> Option<&Pod> {
        match self {
            Provisioned::Confirmed(pod) => Some(pod),
            Provisioned::Placeholder { .. } => None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Provisioned::Confirmed(pod) => &pod.name,
            Provisioned::Placeholder { name, .. } => name,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, Provisioned::Confirmed(_))
    }
}
