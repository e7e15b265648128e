use super::{ExecResult, OutputChunk, OutputKind, OutputStream, SshBackend, SshTarget};
use crate::error::{LiumError, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// OpenSSH reserves this status for its own failures.
const SSH_FAILURE_STATUS: i32 = 255;
const CHUNK_SIZE: usize = 4096;
const STREAM_QUEUE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostKeyPolicy {
    /// Accept any host key and remember none of them.
    #[default]
    AutoAccept,
    /// Require the host to be in `~/.ssh/known_hosts`.
    Strict,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SshOptions {
    /// The `ssh` client to run, looked up on `PATH` unless absolute.
    pub program: PathBuf,
    pub connect_timeout: Duration,
    pub host_key_policy: HostKeyPolicy,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ssh"),
            connect_timeout: Duration::from_secs(10),
            host_key_policy: HostKeyPolicy::AutoAccept,
        }
    }
}

impl SshOptions {
    fn common_args(&self) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "LogLevel=ERROR".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)),
        ];
        match self.host_key_policy {
            HostKeyPolicy::AutoAccept => args.extend([
                "-o".to_string(),
                "StrictHostKeyChecking=no".to_string(),
                "-o".to_string(),
                "UserKnownHostsFile=/dev/null".to_string(),
            ]),
            HostKeyPolicy::Strict => {
                args.extend(["-o".to_string(), "StrictHostKeyChecking=yes".to_string()])
            }
        }
        args
    }

    /// Arguments for `ssh`, up to and including the destination.
    pub fn ssh_args(&self, target: &SshTarget, tty: bool) -> Vec<String> {
        let mut args = vec![
            "-i".to_string(),
            target.key_path.display().to_string(),
            "-p".to_string(),
            target.endpoint.port.to_string(),
        ];
        if tty {
            args.push("-tt".to_string());
        }
        args.extend(self.common_args());
        args.push(target.endpoint.destination());
        args
    }

    /// Arguments for `scp`, without the two paths.
    pub fn scp_args(&self, target: &SshTarget) -> Vec<String> {
        let mut args = vec![
            "-i".to_string(),
            target.key_path.display().to_string(),
            "-P".to_string(),
            target.endpoint.port.to_string(),
        ];
        args.extend(self.common_args());
        args
    }
}

/// [`SshBackend`] that drives the system `ssh` and `scp` binaries.
#[derive(Debug, Clone, Default)]
pub struct OpenSshBackend {
    options: SshOptions,
}

impl OpenSshBackend {
    pub fn new(options: SshOptions) -> Self {
        Self { options }
    }

    fn ssh_error(target: &SshTarget, message: impl Into<String>) -> LiumError {
        LiumError::Ssh {
            target: target.label(),
            message: message.into(),
        }
    }

    async fn scp(&self, target: &SshTarget, from: &str, to: &str) -> Result<()> {
        let output = Command::new("scp")
            .args(self.options.scp_args(target))
            .arg(from)
            .arg(to)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Self::ssh_error(target, format!("cannot start scp: {}", e)))?;
        if output.status.success() {
            return Ok(());
        }
        Err(Self::ssh_error(
            target,
            format!(
                "scp exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ))
    }
}

fn exec_result(target: &SshTarget, output: Output) -> Result<ExecResult> {
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    match output.status.code() {
        Some(SSH_FAILURE_STATUS) => Err(OpenSshBackend::ssh_error(target, stderr.trim())),
        Some(code) => Ok(ExecResult::new(
            String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr,
            code,
        )),
        None => Err(OpenSshBackend::ssh_error(target, "ssh terminated by signal")),
    }
}

async fn pump<R>(mut reader: R, kind: OutputKind, tx: mpsc::Sender<Result<OutputChunk>>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let chunk = OutputChunk {
                    kind,
                    data: buf[..n].to_vec(),
                };
                if tx.send(Ok(chunk)).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                let _ = tx.send(Err(e.into())).await;
                break;
            }
        }
    }
}

#[async_trait]
impl SshBackend for OpenSshBackend {
    async fn exec(&self, target: &SshTarget, command: &str) -> Result<ExecResult> {
        let output = Command::new(&self.options.program)
            .args(self.options.ssh_args(target, false))
            .arg(command)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Self::ssh_error(target, format!("cannot start ssh: {}", e)))?;
        exec_result(target, output)
    }

    async fn stream(&self, target: &SshTarget, command: &str) -> Result<OutputStream> {
        let mut child = Command::new(&self.options.program)
            .args(self.options.ssh_args(target, true))
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Self::ssh_error(target, format!("cannot start ssh: {}", e)))?;

        let (tx, rx) = mpsc::channel(STREAM_QUEUE);
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let out_task = stdout.map(|r| tokio::spawn(pump(r, OutputKind::Stdout, tx.clone())));
        let err_task = stderr.map(|r| tokio::spawn(pump(r, OutputKind::Stderr, tx.clone())));

        // Owns the child: reaps it once both pipes are drained, or kills it
        // as soon as the consumer drops the stream.
        let label = target.label();
        tokio::spawn(async move {
            let drained = async {
                for task in [out_task, err_task].into_iter().flatten() {
                    let _ = task.await;
                }
            };
            tokio::select! {
                _ = drained => {
                    match child.wait().await {
                        Ok(status) if status.code() == Some(SSH_FAILURE_STATUS) => {
                            let _ = tx
                                .send(Err(LiumError::Ssh {
                                    target: label,
                                    message: "connection failed".to_string(),
                                }))
                                .await;
                        }
                        Ok(status) => {
                            tracing::debug!("[remote] stream on {} finished: {}", label, status);
                        }
                        Err(e) => {
                            let _ = tx.send(Err(e.into())).await;
                        }
                    }
                }
                _ = tx.closed() => {
                    tracing::debug!("[remote] stream on {} dropped, killing session", label);
                    let _ = child.kill().await;
                }
            }
        });

        Ok(ReceiverStream::new(rx).boxed())
    }

    async fn put(&self, target: &SshTarget, local: &Path, remote: &str) -> Result<()> {
        let dest = format!("{}:{}", target.endpoint.destination(), remote);
        self.scp(target, &local.display().to_string(), &dest).await
    }

    async fn get(&self, target: &SshTarget, remote: &str, local: &Path) -> Result<()> {
        let src = format!("{}:{}", target.endpoint.destination(), remote);
        self.scp(target, &src, &local.display().to_string()).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use lium_common::SshEndpoint;
    use std::os::unix::fs::PermissionsExt;
    use std::os::unix::process::ExitStatusExt;

    fn target() -> SshTarget {
        SshTarget {
            endpoint: SshEndpoint::parse("ssh root@10.0.0.5 -p 2222").unwrap(),
            key_path: PathBuf::from("/keys/id_ed25519"),
        }
    }

    fn output(code: i32, stdout: &str, stderr: &str) -> Output {
        Output {
            status: std::process::ExitStatus::from_raw(code << 8),
            stdout: stdout.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    #[test]
    fn auto_accept_args() {
        let args = SshOptions::default().ssh_args(&target(), false);
        assert_eq!(&args[..4], ["-i", "/keys/id_ed25519", "-p", "2222"]);
        assert!(args.contains(&"StrictHostKeyChecking=no".to_string()));
        assert!(args.contains(&"UserKnownHostsFile=/dev/null".to_string()));
        assert!(args.contains(&"ConnectTimeout=10".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("root@10.0.0.5"));
        assert!(!args.contains(&"-tt".to_string()));
    }

    #[test]
    fn strict_policy_keeps_known_hosts() {
        let opts = SshOptions {
            host_key_policy: HostKeyPolicy::Strict,
            ..Default::default()
        };
        let args = opts.ssh_args(&target(), true);
        assert!(args.contains(&"-tt".to_string()));
        assert!(args.contains(&"StrictHostKeyChecking=yes".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("UserKnownHostsFile")));
    }

    #[test]
    fn scp_uses_capital_port_flag() {
        let args = SshOptions::default().scp_args(&target());
        assert_eq!(&args[2..4], ["-P", "2222"]);
    }

    #[test]
    fn remote_exit_codes_are_results() {
        let r = exec_result(&target(), output(3, "partial", "boom")).unwrap();
        assert_eq!(r.exit_code, 3);
        assert!(!r.success);
        assert_eq!(r.stdout, "partial");

        let r = exec_result(&target(), output(0, "ok\n", "")).unwrap();
        assert!(r.success);
    }

    #[test]
    fn status_255_is_connection_failure() {
        let err = exec_result(&target(), output(255, "", "Connection refused")).unwrap_err();
        match err {
            LiumError::Ssh { target, message } => {
                assert_eq!(target, "root@10.0.0.5:2222");
                assert_eq!(message, "Connection refused");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    /// Backend whose `ssh` is a shell script ignoring its arguments.
    fn scripted(dir: &Path, body: &str) -> OpenSshBackend {
        let program = dir.join("ssh");
        std::fs::write(&program, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();
        OpenSshBackend::new(SshOptions {
            program,
            ..Default::default()
        })
    }

    async fn drain(stream: OutputStream) -> Vec<Result<OutputChunk>> {
        tokio::time::timeout(Duration::from_secs(10), stream.collect())
            .await
            .expect("stream should end once the command exits")
    }

    #[tokio::test]
    async fn stream_splits_stdout_and_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let backend = scripted(dir.path(), "printf out; printf err >&2");

        let items = drain(backend.stream(&target(), "true").await.unwrap()).await;
        let mut stdout = String::new();
        let mut stderr = String::new();
        for item in items {
            let chunk = item.unwrap();
            match chunk.kind {
                OutputKind::Stdout => stdout.push_str(&chunk.text()),
                OutputKind::Stderr => stderr.push_str(&chunk.text()),
            }
        }
        assert_eq!(stdout, "out");
        assert_eq!(stderr, "err");
    }

    #[tokio::test]
    async fn stream_ends_with_error_on_255() {
        let dir = tempfile::tempdir().unwrap();
        let backend = scripted(dir.path(), "printf partial; exit 255");

        let mut items = drain(backend.stream(&target(), "true").await.unwrap()).await;
        match items.pop() {
            Some(Err(LiumError::Ssh { target, .. })) => assert_eq!(target, "root@10.0.0.5:2222"),
            other => panic!("unexpected {:?}", other),
        }
        let text: String = items.into_iter().map(|c| c.unwrap().text()).collect();
        assert_eq!(text, "partial");
    }

    #[tokio::test]
    async fn dropping_stream_kills_session() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = dir.path().join("pid");
        let backend = scripted(
            dir.path(),
            &format!("echo $$ > {}; printf started; exec sleep 30", pidfile.display()),
        );

        let mut stream = backend.stream(&target(), "true").await.unwrap();
        let first = tokio::time::timeout(Duration::from_secs(10), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(first.text(), "started");
        let pid = std::fs::read_to_string(&pidfile).unwrap().trim().to_string();
        drop(stream);

        let mut alive = true;
        for _ in 0..200 {
            let status = Command::new("kill")
                .args(["-0", &pid])
                .stderr(Stdio::null())
                .status()
                .await
                .unwrap();
            if !status.success() {
                alive = false;
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        assert!(!alive, "ssh child {} still running", pid);
    }
}
