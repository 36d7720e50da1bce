//! Test runners: execute one UI test file against a target.

use async_trait::async_trait;
use chrono::Utc;
use qgjob_core::config::{RunnerConfig, RunnerKind};
use qgjob_core::profiles::AppProject;
use qgjob_core::types::{ReportDetails, Target, TestReport};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Substrings at least one of which a runnable test file must contain.
const TEST_MARKERS: [&str; 4] = ["test(", "it(", "describe(", "console.log("];
/// Build used when no APK for the app version can be found.
const FALLBACK_BUILD: &str = "apps/test123.apk";
/// Runner output kept in reports and error messages.
const MAX_OUTPUT_CHARS: usize = 4000;

#[derive(Debug, Clone)]
pub enum RunOutcome {
    Passed(TestReport),
    Failed(String),
}

impl RunOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, RunOutcome::Passed(_))
    }
}

#[async_trait]
pub trait TestRunner: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run one test file. Failures are reported in the outcome, never as a
    /// panic or error, so a single bad file cannot abort a batch.
    async fn run(&self, test_path: &str, app_version_id: &str, target: Target) -> RunOutcome;
}

pub fn build_runner(config: &RunnerConfig) -> Arc<dyn TestRunner> {
    match config.kind {
        RunnerKind::Simulated => Arc::new(SimulatedRunner::new(config.clone())),
        RunnerKind::Appwright => Arc::new(AppwrightRunner::new(config.clone())),
    }
}

/// Existence and extension check shared by all runners.
pub fn validate_test_file(path: &Path, display: &str) -> Result<(), String> {
    if !path.is_file() {
        return Err(format!("Test file not found: {display}"));
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some("js") | Some("ts") => Ok(()),
        _ => Err(format!("Invalid test file format: {display}")),
    }
}

fn resolve(base: &Path, test_path: &str) -> PathBuf {
    let path = Path::new(test_path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn file_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("js") => "javascript",
        _ => "typescript",
    }
}

fn clip(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(MAX_OUTPUT_CHARS) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

// ─── Simulated ──────────────────────────────────────────────────────────

/// Checks the file looks like a test and waits the target's typical run time.
pub struct SimulatedRunner {
    config: RunnerConfig,
}

impl SimulatedRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl TestRunner for SimulatedRunner {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn run(&self, test_path: &str, app_version_id: &str, target: Target) -> RunOutcome {
        let path = resolve(&self.config.workspace_dir, test_path);
        if let Err(e) = validate_test_file(&path, test_path) {
            return RunOutcome::Failed(e);
        }

        let nominal = target.simulated_run_secs();
        debug!(test = %test_path, target = %target, secs = nominal, "Simulating test execution");
        tokio::time::sleep(self.config.scaled(nominal)).await;

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => return RunOutcome::Failed(format!("Error reading test file: {e}")),
        };
        if content.trim().is_empty() {
            return RunOutcome::Failed("Test file is empty".to_string());
        }
        if !TEST_MARKERS.iter().any(|m| content.contains(m)) {
            return RunOutcome::Failed(
                "Test file doesn't contain recognizable test patterns".to_string(),
            );
        }

        RunOutcome::Passed(TestReport {
            test_file: test_path.to_string(),
            app_version_id: app_version_id.to_string(),
            target,
            execution_time: nominal as f64,
            tests_run: 1,
            tests_passed: 1,
            tests_failed: 0,
            video_path: None,
            screenshots: Vec::new(),
            details: ReportDetails {
                file_size: Some(content.len() as u64),
                file_type: Some(file_type(&path).to_string()),
                timestamp: Utc::now(),
                target_config: None,
                test_output: None,
            },
        })
    }
}

// ─── Appwright ──────────────────────────────────────────────────────────

#[derive(Debug)]
struct CommandOutput {
    success: bool,
    code: Option<i32>,
    stdout: String,
    stderr: String,
}

/// Run a program in `cwd`, killing it if it outlives `timeout`.
async fn run_command(
    program: &str,
    args: &[&str],
    cwd: &Path,
    timeout: Duration,
) -> Result<CommandOutput, String> {
    debug!(program, ?args, "Running command");
    let child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| format!("Failed to run command: {e}"))?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }),
        Ok(Err(e)) => Err(format!("Failed to run command: {e}")),
        Err(_) => Err(format!(
            "Command timed out after {} seconds",
            timeout.as_secs()
        )),
    }
}

#[derive(Debug, Default, Deserialize)]
struct JsonReport {
    #[serde(default)]
    stats: Option<JsonStats>,
}

#[derive(Debug, Default, Deserialize)]
struct JsonStats {
    #[serde(default)]
    expected: u32,
    #[serde(default)]
    unexpected: u32,
    #[serde(default)]
    flaky: u32,
}

/// Pull (run, passed, failed) out of the JSON reporter's output. Anything
/// printed before the report object is skipped.
fn parse_stats(stdout: &str) -> Option<(u32, u32, u32)> {
    let start = stdout.find('{')?;
    let report: JsonReport = serde_json::from_str(stdout[start..].trim_end()).ok()?;
    let stats = report.stats?;
    let passed = stats.expected + stats.flaky;
    Some((passed + stats.unexpected, passed, stats.unexpected))
}

/// Locate the APK for an app version on local targets: `<apps>/<id>.apk`,
/// else the first APK in the directory, else the fallback build.
fn find_build(workspace: &Path, apps_dir: &str, app_version_id: &str) -> String {
    let dir = workspace.join(apps_dir);
    let versioned = format!("{app_version_id}.apk");
    if dir.join(&versioned).is_file() {
        return format!("{apps_dir}/{versioned}");
    }
    let mut apks: Vec<String> = std::fs::read_dir(&dir)
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.ends_with(".apk"))
        .collect();
    apks.sort();
    match apks.first() {
        Some(name) => format!("{apps_dir}/{name}"),
        None => FALLBACK_BUILD.to_string(),
    }
}

/// Drives `npx appwright test` against an emulator, a USB device or
/// BrowserStack.
pub struct AppwrightRunner {
    config: RunnerConfig,
}

impl AppwrightRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.command_timeout_secs)
    }

    async fn project_for(&self, app_version_id: &str, target: Target) -> Result<AppProject, String> {
        match target {
            Target::Emulator | Target::Device => {
                let adb = run_command("adb", &["devices"], &self.config.workspace_dir, self.timeout())
                    .await
                    .ok()
                    .filter(|out| out.success);
                if adb.is_none() {
                    return Err(if target == Target::Emulator {
                        "ADB not available. Use the browserstack target or install the Android SDK"
                            .to_string()
                    } else {
                        "No physical devices detected. Please connect a device.".to_string()
                    });
                }
                let build = find_build(
                    &self.config.workspace_dir,
                    &self.config.apps_dir,
                    app_version_id,
                );
                Ok(AppProject::for_target(&self.config.project, target, build))
            }
            Target::Browserstack => {
                let project = AppProject::for_target(
                    &self.config.project,
                    target,
                    self.config.build_path.clone(),
                );
                let username = std::env::var("BROWSERSTACK_USERNAME").ok();
                let access_key = std::env::var("BROWSERSTACK_ACCESS_KEY").ok();
                match (username, access_key) {
                    (Some(u), Some(k)) if !u.is_empty() && !k.is_empty() => {
                        info!(credentials = true, "BrowserStack credentials found");
                        Ok(project.with_credentials(u, k))
                    }
                    _ => {
                        warn!("BrowserStack credentials not found, running in demo mode");
                        Ok(project)
                    }
                }
            }
        }
    }
}

#[async_trait]
impl TestRunner for AppwrightRunner {
    fn name(&self) -> &'static str {
        "appwright"
    }

    async fn run(&self, test_path: &str, app_version_id: &str, target: Target) -> RunOutcome {
        let path = resolve(&self.config.workspace_dir, test_path);
        if let Err(e) = validate_test_file(&path, test_path) {
            return RunOutcome::Failed(e);
        }

        let project = match self.project_for(app_version_id, target).await {
            Ok(p) => p,
            Err(e) => return RunOutcome::Failed(e),
        };
        let target_config = serde_json::to_value(&project).ok();
        info!(
            test = %test_path,
            target = %target,
            build = %project.use_.build_path,
            "Starting appwright run"
        );

        let path_arg = path.to_string_lossy();
        let args = [
            "appwright",
            "test",
            &*path_arg,
            "--config",
            self.config.config_path.as_str(),
            "--reporter",
            "json",
            "--project",
            self.config.project.as_str(),
            "--trace",
            "on",
        ];

        let started = Instant::now();
        let output = match run_command("npx", &args, &self.config.workspace_dir, self.timeout()).await {
            Ok(o) => o,
            Err(e) => return RunOutcome::Failed(e),
        };
        let execution_time = started.elapsed().as_secs_f64();

        if !output.success {
            let detail = if output.stderr.trim().is_empty() {
                clip(&output.stdout)
            } else {
                clip(&output.stderr)
            };
            let code = output
                .code
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            warn!(test = %test_path, exit = %code, "Appwright run failed");
            return RunOutcome::Failed(if detail.is_empty() {
                format!("Test execution failed (exit code {code})")
            } else {
                detail
            });
        }

        let (tests_run, tests_passed, tests_failed) = parse_stats(&output.stdout).unwrap_or((1, 1, 0));
        RunOutcome::Passed(TestReport {
            test_file: test_path.to_string(),
            app_version_id: app_version_id.to_string(),
            target,
            execution_time,
            tests_run,
            tests_passed,
            tests_failed,
            video_path: None,
            screenshots: Vec::new(),
            details: ReportDetails {
                file_size: std::fs::metadata(&path).ok().map(|m| m.len()),
                file_type: Some(file_type(&path).to_string()),
                timestamp: Utc::now(),
                target_config,
                test_output: Some(clip(&output.stdout)),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instant_config(dir: &Path) -> RunnerConfig {
        RunnerConfig {
            time_scale: 0.0,
            workspace_dir: dir.to_path_buf(),
            ..RunnerConfig::default()
        }
    }

    #[test]
    fn test_validation_messages() {
        let dir = tempfile::tempdir().unwrap();
        let txt = dir.path().join("notes.txt");
        std::fs::write(&txt, "test('x')").unwrap();

        assert_eq!(
            validate_test_file(&dir.path().join("missing.js"), "missing.js").unwrap_err(),
            "Test file not found: missing.js"
        );
        assert_eq!(
            validate_test_file(&txt, "notes.txt").unwrap_err(),
            "Invalid test file format: notes.txt"
        );
    }

    #[tokio::test]
    async fn test_simulated_runner_reports_file_details() {
        let dir = tempfile::tempdir().unwrap();
        let body = "test('opens search', async () => {});\n";
        std::fs::write(dir.path().join("search.spec.ts"), body).unwrap();

        let runner = SimulatedRunner::new(instant_config(dir.path()));
        match runner.run("search.spec.ts", "v1", Target::Device).await {
            RunOutcome::Passed(report) => {
                assert_eq!(report.execution_time, 5.0);
                assert_eq!(report.tests_passed, 1);
                assert_eq!(report.details.file_size, Some(body.len() as u64));
                assert_eq!(report.details.file_type.as_deref(), Some("typescript"));
            }
            RunOutcome::Failed(e) => panic!("unexpected failure: {e}"),
        }
    }

    #[tokio::test]
    async fn test_simulated_runner_rejects_unrecognisable_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("empty.js"), "   \n").unwrap();
        std::fs::write(dir.path().join("plain.js"), "const a = 1;").unwrap();
        let runner = SimulatedRunner::new(instant_config(dir.path()));

        let empty = runner.run("empty.js", "v1", Target::Emulator).await;
        assert!(matches!(empty, RunOutcome::Failed(ref e) if e == "Test file is empty"));
        let plain = runner.run("plain.js", "v1", Target::Emulator).await;
        assert!(
            matches!(plain, RunOutcome::Failed(ref e) if e.contains("recognizable test patterns"))
        );
    }

    #[test]
    fn test_parse_reporter_stats() {
        let stdout = "Running 3 tests\n{\"config\":{},\"stats\":{\"expected\":2,\"unexpected\":1,\"flaky\":0,\"skipped\":0}}\n";
        assert_eq!(parse_stats(stdout), Some((3, 2, 1)));
        assert_eq!(parse_stats("no json here"), None);
        assert_eq!(parse_stats("{\"suites\": []}"), None);
    }

    #[test]
    fn test_find_build_fallbacks() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(find_build(dir.path(), "apps", "v1"), FALLBACK_BUILD);

        std::fs::create_dir(dir.path().join("apps")).unwrap();
        std::fs::write(dir.path().join("apps/other.apk"), b"").unwrap();
        assert_eq!(find_build(dir.path(), "apps", "v1"), "apps/other.apk");

        std::fs::write(dir.path().join("apps/v1.apk"), b"").unwrap();
        assert_eq!(find_build(dir.path(), "apps", "v1"), "apps/v1.apk");
    }

    #[test]
    fn test_clip_long_output() {
        let long = "x".repeat(MAX_OUTPUT_CHARS + 10);
        let clipped = clip(&long);
        assert!(clipped.ends_with("..."));
        assert_eq!(clipped.len(), MAX_OUTPUT_CHARS + 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_timeout_kills_process() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_command("sh", &["-c", "sleep 5"], dir.path(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err, "Command timed out after 1 seconds");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_captures_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = run_command("sh", &["-c", "echo ok; exit 3"], dir.path(), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(!out.success);
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stdout.trim(), "ok");
    }

    #[tokio::test]
    async fn test_missing_program_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_command("qgjob-no-such-binary", &[], dir.path(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.starts_with("Failed to run command"));
    }

    #[test]
    fn test_build_runner_follows_kind() {
        let mut config = RunnerConfig::default();
        assert_eq!(build_runner(&config).name(), "simulated");
        config.kind = RunnerKind::Appwright;
        assert_eq!(build_runner(&config).name(), "appwright");
    }
}
