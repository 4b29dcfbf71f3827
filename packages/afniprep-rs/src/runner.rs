use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::process::Command;

use crate::error::{AfniPrepError, Result};
use crate::tools::{Tool, Toolbox};

/// One external program call
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub tool: Tool,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Captured stdout is written here (the equivalent of `> file`)
    pub stdout_path: Option<PathBuf>,
}

impl Invocation {
    pub fn new(toolbox: &Toolbox, tool: Tool) -> Self {
        Self {
            tool,
            program: toolbox.program(tool),
            args: Vec::new(),
            cwd: None,
            stdout_path: None,
        }
    }

    /// A script written by `tool` (such as `@ss_review_basic`), run from `path`.
    pub fn script(tool: Tool, path: impl AsRef<Path>) -> Self {
        Self {
            tool,
            program: path.as_ref().to_path_buf(),
            args: Vec::new(),
            cwd: None,
            stdout_path: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<str>) -> Self {
        self.args.push(arg.as_ref().to_string());
        self
    }

    pub fn path_arg(mut self, path: impl AsRef<Path>) -> Self {
        self.args.push(path.as_ref().display().to_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_string()));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn stdout_to(mut self, path: impl AsRef<Path>) -> Self {
        self.stdout_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Argument following `flag`, if present.
    pub fn arg_after(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(|s| s.as_str())
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            if arg.contains(' ') || arg.contains('[') {
                write!(f, " '{}'", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        if let Some(ref out) = self.stdout_path {
            write!(f, " > {}", out.display())?;
        }
        Ok(())
    }
}

/// Result of a finished invocation
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

/// Executes external programs.
///
/// Pipelines are generic over the runner so they can be driven without AFNI installed.
#[allow(async_fn_in_trait)]
pub trait ToolRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ToolOutput>;
}

/// Runs invocations as child processes
#[derive(Debug, Clone, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

impl ToolRunner for SystemRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ToolOutput> {
        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args);
        if let Some(ref cwd) = invocation.cwd {
            command.current_dir(cwd);
        }

        log::info!("Executing: {}", invocation);

        let start_time = Instant::now();
        let output = command.output().await.map_err(|e| {
            AfniPrepError::ExecutionFailed(format!(
                "Failed to execute {}: {}",
                invocation.program.display(),
                e
            ))
        })?;
        let elapsed = start_time.elapsed();

        log::debug!(
            "{} finished in {:.2}s",
            invocation.tool.program(),
            elapsed.as_secs_f64()
        );

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            log::error!("{} failed with status: {}", invocation.tool.program(), output.status);
            log::error!("stderr: {}", stderr);
            return Err(AfniPrepError::ExecutionFailed(format!(
                "{} failed with status: {}. stderr: {}",
                invocation.tool.program(),
                output.status,
                stderr.trim()
            )));
        }

        if let Some(ref path) = invocation.stdout_path {
            tokio::fs::write(path, &stdout).await?;
        }

        Ok(ToolOutput {
            stdout,
            stderr,
            elapsed,
        })
    }
}

type Responder = dyn Fn(&Invocation) -> Result<String> + Send + Sync;

/// Records invocations instead of running them.
///
/// The responder supplies stdout for each call; when the invocation redirects stdout,
/// the response is written to that file just like `SystemRunner` would.
pub struct RecordingRunner {
    calls: Mutex<Vec<Invocation>>,
    responder: Box<Responder>,
}

impl Default for RecordingRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::with_responder(|_| Ok(String::new()))
    }

    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&Invocation) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            calls: Mutex::new(Vec::new()),
            responder: Box::new(responder),
        }
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    pub fn calls_to(&self, tool: Tool) -> Vec<Invocation> {
        self.calls().into_iter().filter(|c| c.tool == tool).collect()
    }
}

impl ToolRunner for RecordingRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ToolOutput> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(invocation.clone());
        }
        let stdout = (self.responder)(invocation)?;
        if let Some(ref path) = invocation.stdout_path {
            std::fs::write(path, &stdout)?;
        }
        Ok(ToolOutput {
            stdout,
            ..Default::default()
        })
    }
}
