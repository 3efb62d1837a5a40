//! Package installer for application dependencies
//!
//! Runs the configured installer (npm by default) inside the project
//! directory, streaming its output into the log.

use crate::config::schema::InstallerConfig;
use crate::error::{StageError, StageResult};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info};

/// Max number of output lines to include in installer error messages.
const ERROR_TAIL_LINES: usize = 50;

/// Installs application dependencies for a project
#[async_trait]
pub trait PackageInstaller: Send + Sync {
    /// Cold install from scratch
    async fn build(&self) -> StageResult<()>;

    /// Incremental rebuild over a restored install tree
    async fn rebuild(&self) -> StageResult<()>;
}

/// Installer driving npm (or a compatible program) as a subprocess
pub struct NpmInstaller {
    project_dir: PathBuf,
    config: InstallerConfig,
}

impl NpmInstaller {
    /// Create an installer for the given project directory
    pub fn new(project_dir: PathBuf, config: InstallerConfig) -> Self {
        Self {
            project_dir,
            config,
        }
    }

    /// Whether the project declares any dependencies
    fn has_package_json(&self) -> bool {
        self.project_dir.join("package.json").is_file()
    }

    /// Run the installer with `args`, failing on a non-zero exit
    async fn exec(&self, args: &[String]) -> StageResult<()> {
        let command = std::iter::once(self.config.program.as_str())
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        info!("Running {}", command);

        let mut child = Command::new(&self.config.program)
            .args(args)
            .current_dir(&self.project_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| StageError::command_failed(&command, e))?;

        let output = stream_child_output(&mut child).await;
        let status = child
            .wait()
            .await
            .map_err(|e| StageError::command_failed(&command, e))?;

        match status.code() {
            Some(0) => Ok(()),
            Some(code) => Err(StageError::InstallerFailed {
                command,
                code,
                output: output.render(),
            }),
            None => Err(StageError::ProcessSignaled),
        }
    }
}

#[async_trait]
impl PackageInstaller for NpmInstaller {
    async fn build(&self) -> StageResult<()> {
        if !self.has_package_json() {
            info!("Skipping dependency install (no package.json)");
            return Ok(());
        }
        self.exec(&self.config.install_args).await
    }

    async fn rebuild(&self) -> StageResult<()> {
        if !self.has_package_json() {
            info!("Skipping dependency rebuild (no package.json)");
            return Ok(());
        }
        self.exec(&self.config.rebuild_args).await?;
        // Pick up dependencies declared since the cached tree was built
        self.exec(&self.config.install_args).await
    }
}

/// Bounded buffer of the most recent installer output lines
#[derive(Debug, Default)]
struct OutputTail {
    lines: VecDeque<String>,
    total: usize,
}

impl OutputTail {
    fn push(&mut self, line: String) {
        if self.lines.len() == ERROR_TAIL_LINES {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
        self.total += 1;
    }

    fn render(&self) -> String {
        self.lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }
}

/// Stream stdout+stderr from a child process into the log.
///
/// Only the last `ERROR_TAIL_LINES` lines are kept for error reporting.
async fn stream_child_output(child: &mut Child) -> OutputTail {
    let mut tail = OutputTail::default();
    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return tail;
    };

    let mut stderr_reader = BufReader::new(stderr).lines();
    let mut stdout_reader = BufReader::new(stdout).lines();
    let mut stderr_done = false;
    let mut stdout_done = false;

    while !stderr_done || !stdout_done {
        tokio::select! {
            line = stderr_reader.next_line(), if !stderr_done => {
                match line {
                    Ok(Some(line)) => {
                        info!("       {}", line);
                        tail.push(line);
                    }
                    _ => stderr_done = true,
                }
            }
            line = stdout_reader.next_line(), if !stdout_done => {
                match line {
                    Ok(Some(line)) => {
                        info!("       {}", line);
                        tail.push(line);
                    }
                    _ => stdout_done = true,
                }
            }
        }
    }

    debug!("Installer produced {} output lines", tail.total);
    tail
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn installer(temp: &TempDir, script: &str) -> NpmInstaller {
        let project = temp.path().join("app");
        std::fs::create_dir_all(&project).unwrap();
        std::fs::write(project.join("package.json"), "{}").unwrap();
        NpmInstaller::new(
            project,
            InstallerConfig {
                program: "sh".to_string(),
                install_args: vec!["-c".to_string(), script.to_string()],
                rebuild_args: vec!["-c".to_string(), "echo rebuilt >> calls".to_string()],
                modules_dir: "node_modules".to_string(),
            },
        )
    }

    #[test]
    fn output_tail_keeps_last_lines() {
        let mut tail = OutputTail::default();
        tail.push("only".to_string());
        assert_eq!(tail.render(), "only");

        for i in 1..60 {
            tail.push(i.to_string());
        }
        assert_eq!(tail.lines.len(), ERROR_TAIL_LINES);
        assert_eq!(tail.total, 60);
        let rendered = tail.render();
        assert!(rendered.starts_with("10\n"));
        assert!(rendered.ends_with("59"));
    }

    #[tokio::test]
    async fn long_failure_reports_only_tail() {
        let temp = TempDir::new().unwrap();
        let installer = installer(&temp, "for i in $(seq 1 60); do echo line$i; done; exit 2");

        let err = installer.build().await.unwrap_err();
        match err {
            StageError::InstallerFailed { output, .. } => {
                assert_eq!(output.lines().count(), ERROR_TAIL_LINES);
                assert!(output.starts_with("line11\n"));
                assert!(output.ends_with("line60"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn build_runs_in_project_dir() {
        let temp = TempDir::new().unwrap();
        let installer = installer(&temp, "mkdir -p node_modules && echo installed >> calls");

        installer.build().await.unwrap();
        assert!(temp.path().join("app/node_modules").is_dir());
        let calls = std::fs::read_to_string(temp.path().join("app/calls")).unwrap();
        assert_eq!(calls, "installed\n");
    }

    #[tokio::test]
    async fn rebuild_then_installs() {
        let temp = TempDir::new().unwrap();
        let installer = installer(&temp, "echo installed >> calls");

        installer.rebuild().await.unwrap();
        let calls = std::fs::read_to_string(temp.path().join("app/calls")).unwrap();
        assert_eq!(calls, "rebuilt\ninstalled\n");
    }

    #[tokio::test]
    async fn failure_surfaces_output() {
        let temp = TempDir::new().unwrap();
        let installer = installer(&temp, "echo 'npm ERR! boom' >&2; exit 3");

        let err = installer.build().await.unwrap_err();
        match err {
            StageError::InstallerFailed { code, output, .. } => {
                assert_eq!(code, 3);
                assert!(output.contains("npm ERR! boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn skips_without_package_json() {
        let temp = TempDir::new().unwrap();
        let installer = installer(&temp, "exit 1");
        std::fs::remove_file(temp.path().join("app/package.json")).unwrap();

        installer.build().await.unwrap();
        installer.rebuild().await.unwrap();
    }

    #[tokio::test]
    async fn missing_program_is_command_failure() {
        let temp = TempDir::new().unwrap();
        let mut installer = installer(&temp, "true");
        installer.config.program = "definitely-not-a-real-installer".to_string();

        let err = installer.build().await.unwrap_err();
        assert!(matches!(err, StageError::CommandFailed { .. }));
    }
}
