use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use serde_json::Value;
use tokio::process::Command;
use tokio::sync::Semaphore;

use crate::config::RunnerConfig;
use crate::error::LocustgenError;
use crate::runner::{RunResult, StopOutcome};
use crate::spec::model::LoadTestSpecification;

/// Runs Locust scripts as child processes.
///
/// At most `max_concurrent_runs` processes run at once; a run that finds
/// every slot taken is refused straight away rather than queued.
pub struct RunOrchestrator {
    executable: String,
    permits: Arc<Semaphore>,
    max_concurrent_runs: usize,
}

impl RunOrchestrator {
    pub fn new(executable: impl Into<String>, max_concurrent_runs: usize) -> Self {
        Self {
            executable: executable.into(),
            permits: Arc::new(Semaphore::new(max_concurrent_runs)),
            max_concurrent_runs,
        }
    }

    pub fn from_config(config: &RunnerConfig) -> Self {
        Self::new(config.executable.clone(), config.max_concurrent_runs)
    }

    pub fn executable(&self) -> &str {
        &self.executable
    }

    /// Number of runs currently holding a slot.
    pub fn active_runs(&self) -> usize {
        self.max_concurrent_runs - self.permits.available_permits()
    }

    /// Run `script` against the host and load parameters of `spec` and wait
    /// for it to finish. Failures are reported in the result, never raised.
    pub async fn run(&self, script: &str, spec: &LoadTestSpecification) -> RunResult {
        match self.execute(script, spec).await {
            Ok(statistics) => {
                tracing::info!(host = %spec.target_host, "load test run completed");
                RunResult::completed(statistics)
            }
            Err(e) => {
                tracing::warn!(host = %spec.target_host, error = %e, "load test run failed");
                if let Some(raw) = e.raw_output() {
                    tracing::debug!(raw_output = %raw, "load generator output");
                }
                RunResult::failed(e)
            }
        }
    }

    async fn execute(
        &self,
        script: &str,
        spec: &LoadTestSpecification,
    ) -> Result<Value, LocustgenError> {
        if script.trim().is_empty() {
            return Err(process_error("No test script provided", None));
        }

        let _permit = self.permits.clone().try_acquire_owned().map_err(|_| {
            process_error(
                format!(
                    "run limit reached: {} runs already active",
                    self.max_concurrent_runs
                ),
                None,
            )
        })?;

        // Removed when dropped, whichever way this function returns.
        let script_file = tempfile::Builder::new()
            .prefix("locustgen_")
            .suffix(".py")
            .tempfile()?;
        tokio::fs::write(script_file.path(), script).await?;

        let args = self.command_args(script_file.path(), spec);
        tracing::debug!(executable = %self.executable, ?args, "launching load generator");

        let output = Command::new(&self.executable)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                process_error(format!("failed to launch {}: {e}", self.executable), None)
            })?;

        tracing::debug!(status = ?output.status, "load generator exited");

        let stdout = String::from_utf8_lossy(&output.stdout);
        match serde_json::from_str::<Value>(stdout.trim()) {
            Ok(statistics) => Ok(statistics),
            Err(_) => {
                let raw = if stdout.trim().is_empty() {
                    String::from_utf8_lossy(&output.stderr).into_owned()
                } else {
                    stdout.into_owned()
                };
                Err(process_error(
                    "Failed to parse load generator output",
                    Some(raw),
                ))
            }
        }
    }

    /// The argument list passed to the executable for `script_path`.
    pub fn command_args(&self, script_path: &Path, spec: &LoadTestSpecification) -> Vec<String> {
        vec![
            "-f".to_string(),
            script_path.display().to_string(),
            "--host".to_string(),
            spec.target_host.clone(),
            "--users".to_string(),
            spec.users.to_string(),
            "--spawn-rate".to_string(),
            spec.spawn_rate.to_string(),
            "--run-time".to_string(),
            spec.run_duration.to_string(),
            "--headless".to_string(),
            "--json".to_string(),
        ]
    }

    /// Signal every process named like the executable to terminate.
    ///
    /// Matches the exact process name, so the server itself is never hit.
    /// Always reports success, whether or not anything was running.
    pub async fn stop(&self) -> StopOutcome {
        let name = Path::new(&self.executable)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.executable.clone());

        match Command::new("pkill")
            .arg("-x")
            .arg(&name)
            .stdin(Stdio::null())
            .output()
            .await
        {
            Ok(output) => tracing::info!(
                process = %name,
                status = ?output.status,
                active_runs = self.active_runs(),
                "stop signal sent"
            ),
            Err(e) => tracing::warn!(process = %name, error = %e, "could not run pkill"),
        }

        StopOutcome {
            success: true,
            message: "All load generator processes stopped".to_string(),
        }
    }
}

fn process_error(message: impl Into<String>, raw_output: Option<String>) -> LocustgenError {
    LocustgenError::ExternalProcess {
        message: message.into(),
        raw_output,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::model::RunDuration;

    fn make_spec() -> LoadTestSpecification {
        LoadTestSpecification {
            target_host: "https://api.example.com".to_string(),
            users: 5,
            spawn_rate: 2,
            run_duration: RunDuration::seconds(10),
            ..Default::default()
        }
    }

    #[test]
    fn command_args_carry_load_parameters() {
        let orchestrator = RunOrchestrator::new("locust", 1);
        let args = orchestrator.command_args(Path::new("/tmp/t.py"), &make_spec());
        assert_eq!(
            args,
            vec![
                "-f", "/tmp/t.py", "--host", "https://api.example.com", "--users", "5",
                "--spawn-rate", "2", "--run-time", "10s", "--headless", "--json"
            ]
        );
    }

    #[tokio::test]
    async fn empty_script_is_rejected_without_launch() {
        let orchestrator = RunOrchestrator::new("/nonexistent/locust", 1);
        let result = orchestrator.run("   ", &make_spec()).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("No test script provided"));
    }

    #[tokio::test]
    async fn missing_executable_is_reported() {
        let orchestrator = RunOrchestrator::new("/nonexistent/locust", 1);
        let result = orchestrator.run("print('hi')", &make_spec()).await;
        assert!(!result.success);
        assert!(result.error.expect("error message").contains("failed to launch"));
        assert_eq!(orchestrator.active_runs(), 0);
    }

    #[tokio::test]
    async fn full_orchestrator_refuses_new_runs() {
        let orchestrator = RunOrchestrator::new("/nonexistent/locust", 1);
        let _held = orchestrator.permits.clone().try_acquire_owned().expect("permit");
        assert_eq!(orchestrator.active_runs(), 1);

        let result = orchestrator.run("print('hi')", &make_spec()).await;
        assert!(result.error.expect("error message").starts_with("run limit reached"));
    }

    #[tokio::test]
    async fn stop_succeeds_with_nothing_running() {
        let orchestrator = RunOrchestrator::new("locustgen-no-such-process", 1);
        let outcome = orchestrator.stop().await;
        assert!(outcome.success);
        assert_eq!(outcome.message, "All load generator processes stopped");
    }

    #[cfg(unix)]
    mod fake_executable {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        /// Write an executable shell script into `dir` and return its path.
        fn install(dir: &Path, body: &str) -> String {
            let path = dir.join("fake-locust");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write fake");
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
                .expect("chmod fake");
            path.display().to_string()
        }

        #[tokio::test]
        async fn parses_json_output_and_removes_script() {
            let dir = tempfile::tempdir().expect("tempdir should be created");
            let marker = dir.path().join("script-path");
            let exe = install(
                dir.path(),
                &format!(
                    "echo \"$2\" > '{}'\necho '[{{\"name\": \"/\", \"num_requests\": 4, \"num_failures\": 1, \"total_response_time\": 40}}]'",
                    marker.display()
                ),
            );

            let result = RunOrchestrator::new(exe, 1).run("print('hi')", &make_spec()).await;

            assert!(result.success, "run failed: {:?}", result.error);
            let summary = result.summary.expect("summary");
            assert_eq!(summary.total_requests, 4);
            assert!((summary.mean_response_time_ms - 10.0).abs() < 1e-9);

            let script_path = std::fs::read_to_string(&marker).expect("marker written");
            let script_path = script_path.trim();
            assert!(script_path.ends_with(".py"));
            assert!(!Path::new(script_path).exists(), "temp script was not removed");
        }

        #[tokio::test]
        async fn unparseable_output_is_attached() {
            let dir = tempfile::tempdir().expect("tempdir should be created");
            let exe = install(dir.path(), "echo 'not json at all'");

            let result = RunOrchestrator::new(exe, 1).run("print('hi')", &make_spec()).await;

            assert!(!result.success);
            assert_eq!(result.error.as_deref(), Some("Failed to parse load generator output"));
            assert_eq!(result.raw_output.as_deref(), Some("not json at all\n"));
        }

        #[tokio::test]
        async fn stderr_is_attached_when_stdout_is_empty() {
            let dir = tempfile::tempdir().expect("tempdir should be created");
            let exe = install(dir.path(), "echo 'boom' >&2\nexit 2");

            let result = RunOrchestrator::new(exe, 1).run("print('hi')", &make_spec()).await;

            assert!(!result.success);
            assert_eq!(result.raw_output.as_deref(), Some("boom\n"));
        }
    }
}
