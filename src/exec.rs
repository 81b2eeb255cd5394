use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::error::EfciError;

/// A fully described external invocation: program, ordered arguments,
/// working directory and the environment variables to inject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<String>,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: None,
            env: Vec::new(),
        }
    }

    pub fn current_dir(mut self, dir: impl Into<String>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((name.into(), value.into()));
        self
    }

    /// One-line rendering for job logs.
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Whether subprocess output is buffered and returned, or forwarded live
/// to the console as it is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Streamed,
    Captured,
}

impl OutputMode {
    pub fn from_flag(get_exec_output: bool) -> Self {
        if get_exec_output {
            OutputMode::Captured
        } else {
            OutputMode::Streamed
        }
    }
}

/// Exit status of one external invocation, with captured output when the
/// runner was asked to buffer it.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOutcome {
    pub exit_code: Option<i32>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

impl ExecutionOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// The single seam through which every external process is invoked.
/// Swapped for a recording double in orchestrator tests.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        spec: &CommandSpec,
        mode: OutputMode,
    ) -> Result<ExecutionOutcome, EfciError>;
}

/// Runs commands as real child processes via tokio.
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        spec: &CommandSpec,
        mode: OutputMode,
    ) -> Result<ExecutionOutcome, EfciError> {
        match mode {
            OutputMode::Captured => self.run_captured(spec).await,
            OutputMode::Streamed => self.run_streamed(spec).await,
        }
    }
}

impl ProcessRunner {
    fn command(&self, spec: &CommandSpec) -> Command {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }
        for (name, value) in &spec.env {
            cmd.env(name, value);
        }
        cmd
    }

    async fn run_captured(&self, spec: &CommandSpec) -> Result<ExecutionOutcome, EfciError> {
        let output = self
            .command(spec)
            .output()
            .await
            .map_err(|e| EfciError::process(format!("Failed to run {}: {}", spec.program, e)))?;

        Ok(ExecutionOutcome {
            exit_code: output.status.code(),
            stdout: Some(String::from_utf8_lossy(&output.stdout).into_owned()),
            stderr: Some(String::from_utf8_lossy(&output.stderr).into_owned()),
        })
    }

    async fn run_streamed(&self, spec: &CommandSpec) -> Result<ExecutionOutcome, EfciError> {
        let mut child = self
            .command(spec)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EfciError::process(format!("Failed to start {}: {}", spec.program, e)))?;

        // The handles exist because we asked for pipes above.
        let stdout = child.stdout.take().ok_or_else(|| {
            EfciError::process(format!("No stdout handle for {}", spec.program))
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            EfciError::process(format!("No stderr handle for {}", spec.program))
        })?;

        let mut stdout_reader = BufReader::new(stdout).lines();
        let mut stderr_reader = BufReader::new(stderr).lines();

        // Forward both streams live until the child closes them.
        tokio::join!(
            async {
                while let Ok(Some(line)) = stdout_reader.next_line().await {
                    println!("{}", line);
                }
            },
            async {
                while let Ok(Some(line)) = stderr_reader.next_line().await {
                    eprintln!("{}", line);
                }
            },
        );

        let status = child
            .wait()
            .await
            .map_err(|e| EfciError::process(format!("Failed to wait for {}: {}", spec.program, e)))?;

        Ok(ExecutionOutcome {
            exit_code: status.code(),
            stdout: None,
            stderr: None,
        })
    }
}
