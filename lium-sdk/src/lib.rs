//! Client SDK for renting GPU executors on the Lium fleet and running work on
//! the resulting pods.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod remote;
pub mod resolver;
pub mod retry;
pub mod transport;

pub use cache::PodCache;
pub use catalog::{Catalog, MachineFilter, SortBy, SortOrder};
pub use config::{ClientOptions, Config, ConfigOverrides};
pub use error::{LiumError, Result};
pub use lifecycle::{Lifecycle, LifecycleTimings};
pub use lium_common::{Executor, Pod, Provisioned, Template};
pub use remote::{
    ExecResult, HostKeyPolicy, OpenSshBackend, OutputChunk, OutputKind, OutputStream, PodExecResult,
    RemoteExecutor, RsyncOptions, SshBackend, SshOptions, SshTarget, SyncDirection,
};
pub use resolver::{PodRef, PodResolver};
pub use retry::RetryPolicy;
pub use transport::HttpTransport;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Entry point: one configured client with its own pod cache.
pub struct Lium {
    config: Config,
    catalog: Catalog,
    resolver: PodResolver,
    lifecycle: Lifecycle,
    remote: RemoteExecutor,
}

impl Lium {
    pub fn new(config: Config) -> Result<Self> {
        Self::with_options(config, ClientOptions::default())
    }

    /// Configuration from the environment, `.env` and `~/.lium/config.toml`.
    pub fn from_env() -> Result<Self> {
        Self::new(Config::load()?)
    }

    pub fn with_options(config: Config, options: ClientOptions) -> Result<Self> {
        let backend = Arc::new(OpenSshBackend::new(options.ssh.clone()));
        Self::with_backend(config, options, backend)
    }

    pub fn with_backend(config: Config, options: ClientOptions, backend: Arc<dyn SshBackend>) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(&config, &options)?);
        let catalog = Catalog::new(transport.clone(), Arc::new(PodCache::new()));
        let resolver = PodResolver::new(catalog.clone());
        let lifecycle = Lifecycle::new(
            transport,
            catalog.clone(),
            resolver.clone(),
            config.clone(),
            options.timings.clone(),
        );
        let remote = RemoteExecutor::new(resolver.clone(), backend, config.clone(), options.max_workers);
        tracing::debug!("[lium] client ready for {}", config.base_url);
        Ok(Self {
            config,
            catalog,
            resolver,
            lifecycle,
            remote,
        })
    }

    /// Authenticate SSH sessions with this key instead of the configured one.
    pub fn with_ssh_key(mut self, key_path: impl Into<PathBuf>) -> Self {
        self.remote = self.remote.with_key(key_path);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn remote(&self) -> &RemoteExecutor {
        &self.remote
    }

    // --- Catalog ---

    pub async fn list_executors(&self) -> Result<Vec<Executor>> {
        self.catalog.list_executors().await
    }

    pub async fn list_executors_by_gpu(&self, gpu_type: &str) -> Result<Vec<Executor>> {
        self.catalog.list_executors_by_gpu(gpu_type).await
    }

    pub async fn list_machines(&self, filter: &MachineFilter) -> Result<Vec<Executor>> {
        self.catalog.list_machines(filter).await
    }

    pub async fn gpu_types(&self) -> Result<Vec<String>> {
        self.catalog.gpu_types().await
    }

    pub async fn executor_by_huid(&self, huid: &str) -> Result<Executor> {
        self.catalog.executor_by_huid(huid).await
    }

    pub async fn list_pods(&self) -> Result<Vec<Pod>> {
        self.catalog.list_pods().await
    }

    pub async fn list_templates(&self) -> Result<Vec<Template>> {
        self.catalog.list_templates().await
    }

    // --- Resolution ---

    pub async fn resolve(&self, pod: impl Into<PodRef>) -> Result<Pod> {
        self.resolver.resolve(pod).await
    }

    pub async fn pod_by_name(&self, name: &str) -> Result<Pod> {
        self.resolver.pod_by_name(name).await
    }

    // --- Lifecycle ---

    pub async fn create(&self, executor_id: &str, name: &str, template_id: &str, public_keys: &[String]) -> Result<Pod> {
        self.lifecycle.create(executor_id, name, template_id, public_keys).await
    }

    pub async fn retrieve(&self, pod_id: &str, wait_until_running: bool, timeout: Duration) -> Result<Pod> {
        self.lifecycle.retrieve(pod_id, wait_until_running, timeout).await
    }

    pub async fn delete(&self, executor_id: &str) -> Result<()> {
        self.lifecycle.delete(executor_id).await
    }

    pub async fn down(&self, pod: impl Into<PodRef>) -> Result<()> {
        self.lifecycle.down(pod).await
    }

    pub async fn up(
        &self,
        executor_id: &str,
        name: Option<&str>,
        template_id: Option<&str>,
        public_keys: Option<Vec<String>>,
    ) -> Result<Provisioned> {
        self.lifecycle.up(executor_id, name, template_id, public_keys).await
    }

    pub async fn wait_ready(&self, pod: impl Into<PodRef>, timeout: Duration) -> Result<Option<Pod>> {
        self.lifecycle.wait_ready(pod, timeout).await
    }

    // --- Remote ---

    pub async fn exec(
        &self,
        pod: impl Into<PodRef>,
        command: &str,
        env: Option<&BTreeMap<String, String>>,
    ) -> Result<ExecResult> {
        self.remote.exec(pod, command, env).await
    }

    pub async fn stream_exec(
        &self,
        pod: impl Into<PodRef>,
        command: &str,
        env: Option<&BTreeMap<String, String>>,
    ) -> Result<OutputStream> {
        self.remote.stream_exec(pod, command, env).await
    }

    pub async fn exec_all<I, P>(
        &self,
        pods: I,
        command: &str,
        env: Option<&BTreeMap<String, String>>,
        max_workers: Option<usize>,
    ) -> Vec<PodExecResult>
    where
        I: IntoIterator<Item = P>,
        P: Into<PodRef>,
    {
        self.remote.exec_all(pods, command, env, max_workers).await
    }

    pub async fn upload(&self, pod: impl Into<PodRef>, local: &Path, remote: &str) -> Result<()> {
        self.remote.upload(pod, local, remote).await
    }

    pub async fn scp(&self, pod: impl Into<PodRef>, local: &Path, remote: &str) -> Result<()> {
        self.remote.scp(pod, local, remote).await
    }

    pub async fn download(&self, pod: impl Into<PodRef>, remote: &str, local: &Path) -> Result<()> {
        self.remote.download(pod, remote, local).await
    }

    pub async fn rsync(&self, pod: impl Into<PodRef>, local: &str, remote: &str, options: &RsyncOptions) -> Result<()> {
        self.remote.rsync(pod, local, remote, options).await
    }

    pub async fn ssh_command(&self, pod: impl Into<PodRef>) -> Result<String> {
        self.remote.ssh_command(pod).await
    }
}
