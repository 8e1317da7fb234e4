//! Command Runner, spec.md §4.1: execute external processes off the I/O
//! path without ever raising on a non-zero exit.

use std::collections::HashMap;
use tokio::process::Command;

/// Runs external processes for the VPN Tunnel Manager and the teardown path.
/// Thread-confined only in the sense that every call spawns its own
/// `tokio::process::Command` — there's no shared mutable state to guard.
#[derive(Clone, Default)]
pub struct CommandRunner;

impl CommandRunner {
    pub fn new() -> Self {
        Self
    }

    /// Executes `argv[0] argv[1..]` with `env` merged into the inherited
    /// process environment. Never errors: a missing executable or non-zero
    /// exit both come back as `ok=false` with whatever output was captured.
    pub async fn run(&self, argv: &[&str], env: &HashMap<String, String>) -> (bool, String) {
        let Some((program, args)) = argv.split_first() else {
            return (false, String::new());
        };

        let mut cmd = Command::new(program);
        cmd.args(args);
        for (k, v) in env {
            cmd.env(k, v);
        }

        match cmd.output().await {
            Ok(output) => {
                let ok = output.status.success();
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                let text = if stdout.trim().is_empty() {
                    stderr.into_owned()
                } else {
                    stdout.into_owned()
                };
                (ok, text)
            }
            Err(e) => (false, e.to_string()),
        }
    }

    /// `run`, but with the WireGuard environment spec.md §4.1 requires
    /// injected: a userspace implementation, endpoint-resolution retries,
    /// and a sanitized `PATH`.
    pub async fn run_wireguard(&self, argv: &[&str]) -> (bool, String) {
        let mut env = HashMap::new();
        env.insert(
            "WG_QUICK_USERSPACE_IMPLEMENTATION".to_string(),
            "boringtun".to_string(),
        );
        env.insert("WG_ENDPOINT_RESOLUTION_RETRIES".to_string(), "2".to_string());
        env.insert(
            "PATH".to_string(),
            "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin".to_string(),
        );
        self.run(argv, &env).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_executable_is_not_ok() {
        let runner = CommandRunner::new();
        let (ok, _) = runner.run(&["m360-definitely-not-a-real-binary"], &HashMap::new()).await;
        assert!(!ok);
    }

    #[tokio::test]
    async fn nonzero_exit_is_not_ok_but_does_not_panic() {
        let runner = CommandRunner::new();
        let (ok, _) = runner.run(&["false"], &HashMap::new()).await;
        assert!(!ok);
    }

    #[tokio::test]
    async fn zero_exit_is_ok_and_captures_stdout() {
        let runner = CommandRunner::new();
        let (ok, output) = runner.run(&["echo", "hello"], &HashMap::new()).await;
        assert!(ok);
        assert!(output.contains("hello"));
    }

    #[tokio::test]
    async fn wireguard_env_is_injected() {
        let runner = CommandRunner::new();
        let (ok, output) = runner
            .run_wireguard(&["sh", "-c", "echo $WG_QUICK_USERSPACE_IMPLEMENTATION"])
            .await;
        assert!(ok);
        assert!(output.contains("boringtun"));
    }
}
