//! Command execution and file transfer on pods over SSH.

mod openssh;
mod rsync;

pub use openssh::{HostKeyPolicy, OpenSshBackend, SshOptions};
pub use rsync::{rsync_args, RsyncOptions, SyncDirection};

use crate::config::{resolve_private_key, Config};
use crate::error::{LiumError, Result};
use crate::resolver::{PodRef, PodResolver};
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use lium_common::{Pod, SshEndpoint};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where and as whom to open a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SshTarget {
    pub endpoint: SshEndpoint,
    pub key_path: PathBuf,
}

impl SshTarget {
    pub fn label(&self) -> String {
        format!("{}:{}", self.endpoint.destination(), self.endpoint.port)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub success: bool,
}

impl ExecResult {
    pub fn new(stdout: String, stderr: String, exit_code: i32) -> Self {
        Self {
            stdout,
            stderr,
            exit_code,
            success: exit_code == 0,
        }
    }
}

/// One target's outcome in [`RemoteExecutor::exec_all`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodExecResult {
    pub pod: String,
    #[serde(flatten)]
    pub result: ExecResult,
    /// Set when the command could not be run at all.
    pub error: Option<String>,
}

impl PodExecResult {
    fn failed(pod: String, error: &LiumError) -> Self {
        let message = error.to_string();
        Self {
            pod,
            result: ExecResult::new(String::new(), message.clone(), -1),
            error: Some(message),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    Stdout,
    Stderr,
}

/// A piece of live output, at most 4 KiB.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputChunk {
    pub kind: OutputKind,
    pub data: Vec<u8>,
}

impl OutputChunk {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

pub type OutputStream = BoxStream<'static, Result<OutputChunk>>;

/// Session layer. One call, one session; nothing is pooled.
#[async_trait]
pub trait SshBackend: Send + Sync {
    async fn exec(&self, target: &SshTarget, command: &str) -> Result<ExecResult>;

    /// Output is yielded as it arrives; the stream ends once the remote side
    /// has closed both stdout and stderr. Dropping it ends the session.
    async fn stream(&self, target: &SshTarget, command: &str) -> Result<OutputStream>;

    async fn put(&self, target: &SshTarget, local: &Path, remote: &str) -> Result<()>;

    async fn get(&self, target: &SshTarget, remote: &str, local: &Path) -> Result<()>;
}

/// `export K="V" && ... && command`, keys in sorted order.
pub fn prepare_command(command: &str, env: Option<&BTreeMap<String, String>>) -> String {
    let Some(env) = env.filter(|e| !e.is_empty()) else {
        return command.to_string();
    };
    let exports: Vec<String> = env
        .iter()
        .map(|(k, v)| format!("export {}=\"{}\"", k, v.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    format!("{} && {}", exports.join(" && "), command)
}

pub struct RemoteExecutor {
    resolver: PodResolver,
    backend: Arc<dyn SshBackend>,
    config: Config,
    key_override: Option<PathBuf>,
    max_workers: usize,
}

impl RemoteExecutor {
    pub fn new(resolver: PodResolver, backend: Arc<dyn SshBackend>, config: Config, max_workers: usize) -> Self {
        Self {
            resolver,
            backend,
            config,
            key_override: None,
            max_workers: max_workers.max(1),
        }
    }

    /// Use this private key ahead of the configured one.
    pub fn with_key(mut self, key_path: impl Into<PathBuf>) -> Self {
        self.key_override = Some(key_path.into());
        self
    }

    fn private_key(&self) -> Result<PathBuf> {
        let explicit = [self.key_override.as_deref(), self.config.ssh_key_path.as_deref()]
            .into_iter()
            .flatten()
            .find_map(|p| resolve_private_key(Some(p), None));
        if let Some(key) = explicit {
            return Ok(key);
        }
        let ssh_dir = dirs::home_dir().map(|h| h.join(".ssh"));
        resolve_private_key(None, ssh_dir.as_deref()).ok_or_else(|| {
            LiumError::configuration(
                "no SSH private key found",
                "set LIUM_SSH_KEY_PATH, [ssh] key_path in ~/.lium/config.toml, or create ~/.ssh/id_ed25519",
            )
        })
    }

    fn target_for(&self, pod: &Pod) -> Result<SshTarget> {
        let endpoint = pod.ssh_endpoint().ok_or_else(|| {
            LiumError::configuration(
                format!("pod '{}' has no usable SSH connect command", pod.name),
                "wait until the pod is RUNNING",
            )
        })?;
        Ok(SshTarget {
            endpoint,
            key_path: self.private_key()?,
        })
    }

    async fn connect(&self, pod: impl Into<PodRef>) -> Result<SshTarget> {
        let pod = self.resolver.resolve(pod).await?;
        self.target_for(&pod)
    }

    /// Run a command and capture its output. A non-zero exit is reported in
    /// the result, not as an error.
    pub async fn exec(
        &self,
        pod: impl Into<PodRef>,
        command: &str,
        env: Option<&BTreeMap<String, String>>,
    ) -> Result<ExecResult> {
        let target = self.connect(pod).await?;
        let command = prepare_command(command, env);
        tracing::debug!("[remote] exec on {}: {}", target.label(), command);
        let result = self.backend.exec(&target, &command).await?;
        if !result.success {
            tracing::debug!("[remote] {} exited with {}", target.label(), result.exit_code);
        }
        Ok(result)
    }

    pub async fn stream_exec(
        &self,
        pod: impl Into<PodRef>,
        command: &str,
        env: Option<&BTreeMap<String, String>>,
    ) -> Result<OutputStream> {
        let target = self.connect(pod).await?;
        let command = prepare_command(command, env);
        tracing::debug!("[remote] streaming on {}: {}", target.label(), command);
        self.backend.stream(&target, &command).await
    }

    /// Run the same command on many pods with bounded concurrency.
    ///
    /// Results come back in input order. A pod that cannot be reached gets a
    /// record with `exit_code == -1` and `error` set; the others are unaffected.
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
        let targets: Vec<PodRef> = pods.into_iter().map(Into::into).collect();
        if targets.is_empty() {
            return vec![];
        }
        let workers = max_workers
            .unwrap_or(self.max_workers)
            .min(targets.len())
            .max(1);
        tracing::info!("[remote] exec on {} pods ({} workers)", targets.len(), workers);

        stream::iter(targets.into_iter().map(|target| async move {
            let pod = target.identifier().to_string();
            let label = target.label().to_string();
            match self.exec(target, command, env).await {
                Ok(result) => PodExecResult {
                    pod,
                    result,
                    error: None,
                },
                Err(e) => {
                    tracing::warn!("[remote] {} failed: {}", label, e);
                    PodExecResult::failed(pod, &e)
                }
            }
        }))
        .buffered(workers)
        .collect()
        .await
    }

    pub async fn upload(&self, pod: impl Into<PodRef>, local: &Path, remote: &str) -> Result<()> {
        let target = self.connect(pod).await?;
        tracing::info!("[remote] upload {} -> {}:{}", local.display(), target.label(), remote);
        self.backend.put(&target, local, remote).await
    }

    pub async fn scp(&self, pod: impl Into<PodRef>, local: &Path, remote: &str) -> Result<()> {
        self.upload(pod, local, remote).await
    }

    pub async fn download(&self, pod: impl Into<PodRef>, remote: &str, local: &Path) -> Result<()> {
        let target = self.connect(pod).await?;
        tracing::info!("[remote] download {}:{} -> {}", target.label(), remote, local.display());
        self.backend.get(&target, remote, local).await
    }

    pub async fn rsync(&self, pod: impl Into<PodRef>, local: &str, remote: &str, options: &RsyncOptions) -> Result<()> {
        let target = self.connect(pod).await?;
        rsync::run(&rsync_args(&target, local, remote, options)).await
    }

    /// The pod's connect command with `-i <key>` added, ready for a terminal.
    pub async fn ssh_command(&self, pod: impl Into<PodRef>) -> Result<String> {
        let pod = self.resolver.resolve(pod).await?;
        let target = self.target_for(&pod)?;
        let cmd = pod.ssh_cmd.as_deref().unwrap_or_default();
        Ok(cmd.replacen("ssh ", &format!("ssh -i {} ", target.key_path.display()), 1))
    }
}
