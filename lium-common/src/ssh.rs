//! Parsing of the `ssh <user>@<host> [-p <port>]` connect command pods expose.

use serde::{Deserialize, Serialize};

pub const DEFAULT_SSH_PORT: u16 = 22;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshEndpoint {
    pub user: String,
    pub host: String,
    pub port: u16,
}

impl SshEndpoint {
    /// Returns `None` for anything that is not a well-formed connect command.
    pub fn parse(cmd: &str) -> Option<Self> {
        let parts: Vec<&str> = cmd.split_whitespace().collect();
        if parts.first() != Some(&"ssh") {
            return None;
        }

        let mut target = None;
        let mut port = DEFAULT_SSH_PORT;
        let mut i = 1;
        while i < parts.len() {
            match parts[i] {
                "-p" => {
                    port = parts.get(i + 1)?.parse().ok()?;
                    i += 2;
                }
                arg if arg.contains('@') && target.is_none() => {
                    target = Some(arg);
                    i += 1;
                }
                _ => i += 1,
            }
        }

        let (user, host) = target?.split_once('@')?;
        if user.is_empty() || host.is_empty() {
            return None;
        }
        Some(Self {
            user: user.to_string(),
            host: host.to_string(),
            port,
        })
    }

    /// `user@host`, as `ssh`/`scp`/`rsync` expect it.
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}
