use super::SshTarget;
use crate::error::{LiumError, Result};
use std::process::Stdio;
use tokio::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncDirection {
    /// Local to pod.
    #[default]
    Up,
    /// Pod to local.
    Down,
}

#[derive(Debug, Clone, Default)]
pub struct RsyncOptions {
    pub direction: SyncDirection,
    /// Remove destination files missing from the source.
    pub delete: bool,
    pub exclude: Vec<String>,
}

/// Full `rsync` argument list for syncing `local` with `remote` on the target.
pub fn rsync_args(target: &SshTarget, local: &str, remote: &str, options: &RsyncOptions) -> Vec<String> {
    let shell = format!(
        "ssh -i {} -p {} -o StrictHostKeyChecking=no",
        target.key_path.display(),
        target.endpoint.port
    );
    let mut args = vec!["-avz".to_string(), "-e".to_string(), shell];
    if options.delete {
        args.push("--delete".to_string());
    }
    for pattern in &options.exclude {
        args.push("--exclude".to_string());
        args.push(pattern.clone());
    }

    let remote = format!("{}:{}", target.endpoint.destination(), remote);
    match options.direction {
        SyncDirection::Up => args.extend([local.to_string(), remote]),
        SyncDirection::Down => args.extend([remote, local.to_string()]),
    }
    args
}

pub(super) async fn run(args: &[String]) -> Result<()> {
    tracing::info!("[remote] rsync {}", args.join(" "));
    let output = Command::new("rsync")
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await?;
    if output.status.success() {
        return Ok(());
    }
    Err(LiumError::Sync {
        status: output.status.code().unwrap_or(-1),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}
