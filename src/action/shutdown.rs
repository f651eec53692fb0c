// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Remote shutdown through an external SSH client.
//!
//! With a password and `sshpass` on `PATH` the password is passed through
//! the `SSHPASS` environment variable. Otherwise plain `ssh` is used and
//! authentication is left to the agent or key files.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::device::ShutdownTarget;
use crate::error::ActionError;

/// Runs a shutdown command on a remote host over SSH.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteShutdown {
    command: String,
    timeout: Duration,
    ssh_program: String,
    sshpass_program: String,
}

/// A fully resolved client invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub password_env: Option<String>,
}

impl RemoteShutdown {
    /// Windows shutdown, immediate.
    pub const DEFAULT_COMMAND: &'static str = "shutdown /s /t 0";
    /// Upper bound on one shutdown request.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Creates a runner with default programs and command.
    #[must_use]
    pub fn new() -> Self {
        Self {
            command: Self::DEFAULT_COMMAND.to_string(),
            timeout: Self::DEFAULT_TIMEOUT,
            ssh_program: "ssh".to_string(),
            sshpass_program: "sshpass".to_string(),
        }
    }

    /// Sets the command executed on the remote host.
    #[must_use]
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the SSH client program.
    #[must_use]
    pub fn with_ssh_program(mut self, program: impl Into<String>) -> Self {
        self.ssh_program = program.into();
        self
    }

    /// Sets the `sshpass` program.
    #[must_use]
    pub fn with_sshpass_program(mut self, program: impl Into<String>) -> Self {
        self.sshpass_program = program.into();
        self
    }

    /// Requests shutdown of `target`.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError`] if the client cannot be started, does not
    /// finish within the timeout, or exits unsuccessfully.
    pub async fn run(&self, target: &ShutdownTarget) -> Result<(), ActionError> {
        let use_sshpass = target.password.is_some() && program_available(&self.sshpass_program);
        let invocation = self.invocation(target, use_sshpass);

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(password) = &invocation.password_env {
            cmd.env("SSHPASS", password);
        }

        tracing::debug!(
            host = %target.host,
            port = target.port,
            program = %invocation.program,
            "Requesting remote shutdown"
        );

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| ActionError::Timeout {
                host: target.host.clone(),
                secs: self.timeout.as_secs(),
            })?
            .map_err(|source| ActionError::Spawn {
                program: invocation.program.clone(),
                source,
            })?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::debug!(host = %target.host, stderr = %stderr.trim(), "Remote shutdown stderr");
            Err(ActionError::ExitStatus {
                host: target.host.clone(),
                status: output.status.to_string(),
            })
        }
    }

    pub(crate) fn invocation(&self, target: &ShutdownTarget, use_sshpass: bool) -> Invocation {
        let connect_timeout = self.timeout.as_secs().max(1);
        let mut ssh_args = vec![
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={connect_timeout}"),
        ];
        let password_env = if use_sshpass {
            ssh_args.push("-o".to_string());
            ssh_args.push("PreferredAuthentications=password".to_string());
            target.password.clone()
        } else {
            ssh_args.push("-o".to_string());
            ssh_args.push("BatchMode=yes".to_string());
            None
        };
        ssh_args.extend([
            "-p".to_string(),
            target.port.to_string(),
            format!("{}@{}", target.user, target.host),
            self.command.clone(),
        ]);

        if password_env.is_some() {
            let mut args = vec!["-e".to_string(), self.ssh_program.clone()];
            args.extend(ssh_args);
            Invocation {
                program: self.sshpass_program.clone(),
                args,
                password_env,
            }
        } else {
            Invocation {
                program: self.ssh_program.clone(),
                args: ssh_args,
                password_env: None,
            }
        }
    }
}

impl Default for RemoteShutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns true if `program` resolves to a file, directly or via `PATH`.
fn program_available(program: &str) -> bool {
    let path = Path::new(program);
    if path.components().count() > 1 {
        return path.is_file();
    }
    std::env::var_os("PATH")
        .is_some_and(|paths| std::env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> ShutdownTarget {
        ShutdownTarget::new("10.0.0.7", "admin")
            .with_password("pw")
            .with_port(2222)
    }

    #[test]
    fn invocation_with_sshpass() {
        let inv = RemoteShutdown::new().invocation(&target(), true);
        assert_eq!(inv.program, "sshpass");
        assert_eq!(inv.args[..2], ["-e", "ssh"]);
        assert!(inv.args.contains(&"PreferredAuthentications=password".to_string()));
        assert_eq!(inv.password_env.as_deref(), Some("pw"));
        // The password never appears on the command line.
        assert!(!inv.args.iter().any(|a| a == "pw"));
        assert_eq!(
            inv.args[inv.args.len() - 4..],
            ["-p", "2222", "admin@10.0.0.7", "shutdown /s /t 0"]
        );
    }

    #[test]
    fn invocation_without_sshpass_uses_agent() {
        let inv = RemoteShutdown::new()
            .with_command("sudo poweroff")
            .invocation(&target(), false);
        assert_eq!(inv.program, "ssh");
        assert!(inv.password_env.is_none());
        assert!(inv.args.contains(&"BatchMode=yes".to_string()));
        assert_eq!(inv.args.last().map(String::as_str), Some("sudo poweroff"));
    }

    #[test]
    fn missing_program_is_unavailable() {
        assert!(!program_available("definitely-not-a-real-binary-4f1c"));
        assert!(!program_available("/nonexistent/dir/sshpass"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_reports_exit_status() {
        let ok = RemoteShutdown::new()
            .with_ssh_program("true")
            .with_sshpass_program("definitely-not-a-real-binary-4f1c");
        ok.run(&target()).await.unwrap();

        let failing = ok.clone().with_ssh_program("false");
        let err = failing.run(&target()).await.unwrap_err();
        assert!(matches!(err, ActionError::ExitStatus { ref host, .. } if host == "10.0.0.7"));
    }

    #[tokio::test]
    async fn run_reports_spawn_failure() {
        let runner = RemoteShutdown::new()
            .with_ssh_program("definitely-not-a-real-binary-4f1c")
            .with_sshpass_program("definitely-not-a-real-binary-4f1c");
        let err = runner.run(&ShutdownTarget::new("h", "u")).await.unwrap_err();
        assert!(matches!(err, ActionError::Spawn { .. }));
    }
}
