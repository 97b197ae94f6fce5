use crate::error::{DepsError, Result};
use crate::{ReconcileReport, Resolution, ResolverOptions, Suggestion};
use async_trait::async_trait;
use log::{info, warn};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::time::timeout;

pub const DEFAULT_INSTALL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Runs package-manager commands; swapped for a fake in tests.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String], cwd: &Path) -> Result<CommandOutput>;
}

#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Duration,
}

impl ProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(DEFAULT_INSTALL_TIMEOUT)
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, program: &str, args: &[String], cwd: &Path) -> Result<CommandOutput> {
        let child = tokio::process::Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();
        let output = timeout(self.timeout, child)
            .await
            .map_err(|_| DepsError::Timeout {
                program: program.to_string(),
                after_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            })??;
        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// A package-manager add command, e.g. `cargo add`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Installer {
    pub program: &'static str,
    pub args: &'static [&'static str],
}

impl Installer {
    pub(crate) fn command_line(&self, names: &[String]) -> String {
        let mut parts = vec![self.program.to_string()];
        parts.extend(self.args.iter().map(|arg| (*arg).to_string()));
        parts.extend(names.iter().cloned());
        parts.join(" ")
    }

    /// Runs the installer in the manifest's directory. Failures become a report, never an error.
    pub(crate) async fn install(
        &self,
        runner: &dyn CommandRunner,
        manifest: &Path,
        names: Vec<String>,
    ) -> ReconcileReport {
        let cwd = manifest.parent().unwrap_or_else(|| Path::new("."));
        let mut args: Vec<String> = self.args.iter().map(|arg| (*arg).to_string()).collect();
        args.extend(names.iter().cloned());

        let command = self.command_line(&names);
        match runner.run(self.program, &args, cwd).await {
            Ok(output) if output.success => {
                info!("Installed {} missing dependencies: {command}", names.len());
                ReconcileReport::Installed { names }
            }
            Ok(output) => {
                let detail = output.stderr.trim().to_string();
                warn!("Failed to install dependencies with `{command}`: {detail}");
                ReconcileReport::InstallFailed { names, detail }
            }
            Err(err) => {
                warn!("Failed to install dependencies with `{command}`: {err}");
                ReconcileReport::InstallFailed {
                    names,
                    detail: err.to_string(),
                }
            }
        }
    }
}

/// Installs `names` when an installer exists and auto-install is on; otherwise reports
/// what the user should add.
pub(crate) async fn install_or_suggest(
    options: &ResolverOptions,
    installer: Option<Installer>,
    manifest: &Path,
    names: Vec<String>,
) -> ReconcileReport {
    if names.is_empty() {
        return ReconcileReport::NothingMissing;
    }
    match installer {
        Some(installer) if options.auto_install => {
            installer
                .install(options.runner.as_ref(), manifest, names)
                .await
        }
        _ => {
            let suggestions: Vec<Suggestion> = names
                .into_iter()
                .map(|name| Suggestion {
                    resolution: Resolution::AddManually {
                        command: installer.map(|i| i.command_line(std::slice::from_ref(&name))),
                    },
                    identifier: name,
                })
                .collect();
            info!(
                "Dependencies to add to {}: {}",
                manifest.display(),
                suggestions
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            ReconcileReport::Suggested { suggestions }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingRunner;
    use super::*;
    use pretty_assertions::assert_eq;

    const CARGO_ADD: Installer = Installer {
        program: "cargo",
        args: &["add"],
    };

    #[tokio::test]
    async fn installer_runs_next_to_manifest() {
        let runner = RecordingRunner::default();
        let report = CARGO_ADD
            .install(&runner, Path::new("/p/crate/Cargo.toml"), vec!["tokio".into()])
            .await;
        assert_eq!(
            report,
            ReconcileReport::Installed {
                names: vec!["tokio".into()]
            }
        );
        assert_eq!(
            runner.calls(),
            vec![(
                "cargo".to_string(),
                vec!["add".to_string(), "tokio".to_string()],
                Path::new("/p/crate").to_path_buf()
            )]
        );
    }

    #[tokio::test]
    async fn installer_failure_is_reported() {
        let runner = RecordingRunner::failing("error: no such crate\n");
        let report = CARGO_ADD
            .install(&runner, Path::new("/p/Cargo.toml"), vec!["nope".into()])
            .await;
        assert_eq!(
            report,
            ReconcileReport::InstallFailed {
                names: vec!["nope".into()],
                detail: "error: no such crate".into()
            }
        );
    }

    #[tokio::test]
    async fn process_runner_reports_exit_status() {
        let temp = tempfile::TempDir::new().expect("tempdir");
        let runner = ProcessRunner::default();
        let missing = runner
            .run("shadow-sync-no-such-binary", &[], temp.path())
            .await;
        assert!(matches!(missing, Err(DepsError::IoError(_))));
    }

    #[test]
    fn command_line_is_printable() {
        assert_eq!(
            CARGO_ADD.command_line(&["serde-json".into(), "tokio".into()]),
            "cargo add serde-json tokio"
        );
    }
}
