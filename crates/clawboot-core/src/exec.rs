//! Subprocess execution with an explicit environment
//!
//! Stages never mutate the bootstrap's own process environment. Exports go
//! into the [`ExecContext`] map instead, which is layered over the inherited
//! environment of every subprocess and of the final gateway launch.

use crate::{CoreError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};

/// A subprocess invocation
#[derive(Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Payload written to the child's stdin, then closed
    pub stdin: Option<String>,
    /// Variables layered over the inherited environment
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            env: BTreeMap::new(),
        }
    }

    /// Build from a full argument vector (program first)
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone()).args(args.iter().cloned()))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

// Stdin and env values can carry tokens; only names are rendered.
impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("stdin", &self.stdin.as_ref().map(|_| "<redacted>"))
            .field("env", &self.env.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Captured result of a finished subprocess
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `-1` when the child was killed by a signal
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs subprocesses on behalf of the bootstrap stages
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion, capturing stdout and stderr
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;

    /// Run with inherited stdio and return the exit code.
    ///
    /// Termination signals received meanwhile are forwarded to the child.
    async fn run_foreground(&self, spec: &CommandSpec) -> Result<i32>;
}

/// [`CommandRunner`] backed by real processes
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl SystemRunner {
    fn command(spec: &CommandSpec) -> Command {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args).envs(&spec.env);
        cmd
    }
}

fn spawn_error(spec: &CommandSpec, source: std::io::Error) -> CoreError {
    CoreError::Spawn {
        program: spec.program.clone(),
        source,
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let mut cmd = Self::command(spec);
        cmd.stdin(if spec.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| spawn_error(spec, e))?;

        if let (Some(input), Some(mut stdin)) = (spec.stdin.as_ref(), child.stdin.take()) {
            if let Err(e) = stdin.write_all(input.as_bytes()).await {
                tracing::debug!("Failed to write stdin of {}: {}", spec.program, e);
            }
            drop(stdin);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| CoreError::CommandFailed {
                program: spec.program.clone(),
                message: e.to_string(),
            })?;

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    async fn run_foreground(&self, spec: &CommandSpec) -> Result<i32> {
        let mut cmd = Self::command(spec);
        cmd.stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let mut child = cmd.spawn().map_err(|e| spawn_error(spec, e))?;
        let status = wait_forwarding_signals(&mut child).await?;
        Ok(foreground_exit_code(status))
    }
}

#[cfg(unix)]
async fn wait_forwarding_signals(child: &mut Child) -> Result<ExitStatus> {
    use nix::sys::signal::Signal;
    use std::io::IsTerminal;
    use tokio::signal::unix::{signal, SignalKind};

    let pid = child.id();
    let interactive = std::io::stdin().is_terminal();
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    loop {
        let received = tokio::select! {
            status = child.wait() => return Ok(status?),
            Some(()) = terminate.recv() => Signal::SIGTERM,
            Some(()) = interrupt.recv() => Signal::SIGINT,
        };
        if should_forward(received, interactive) {
            forward_signal(pid, received);
        } else {
            tracing::debug!("{} already delivered to the gateway by the terminal", received);
        }
    }
}

/// A terminal sends Ctrl-C to the whole foreground process group, so the
/// gateway has already seen SIGINT when stdin is a terminal.
#[cfg(unix)]
fn should_forward(signal: nix::sys::signal::Signal, interactive: bool) -> bool {
    signal != nix::sys::signal::Signal::SIGINT || !interactive
}

#[cfg(not(unix))]
async fn wait_forwarding_signals(child: &mut Child) -> Result<ExitStatus> {
    Ok(child.wait().await?)
}

#[cfg(unix)]
fn forward_signal(pid: Option<u32>, signal: nix::sys::signal::Signal) {
    use nix::unistd::Pid;

    let Some(pid) = pid else {
        return;
    };
    tracing::info!("Forwarding {} to gateway (pid {})", signal, pid);
    if let Err(e) = nix::sys::signal::kill(Pid::from_raw(pid as i32), signal) {
        tracing::warn!("Failed to forward {}: {}", signal, e);
    }
}

/// Exit code of a foreground child, shell style (`128 + signal` when killed)
fn foreground_exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

/// Execution state shared by every stage: exported variables plus the runner
#[derive(Clone)]
pub struct ExecContext {
    env: BTreeMap<String, String>,
    runner: Arc<dyn CommandRunner>,
}

impl ExecContext {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            env: BTreeMap::new(),
            runner,
        }
    }

    /// Export a variable to every later subprocess, overwriting any previous value
    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        tracing::debug!("Exporting {}", key);
        self.env.insert(key, value.into());
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    /// Context exports first; the command's own entries take precedence
    fn with_env(&self, mut spec: CommandSpec) -> CommandSpec {
        let mut env = self.env.clone();
        env.append(&mut spec.env);
        spec.env = env;
        spec
    }

    /// Run a command, propagating spawn failures
    pub async fn run(&self, spec: CommandSpec) -> Result<CommandOutput> {
        let spec = self.with_env(spec);
        tracing::debug!("Running {}", spec);
        self.runner.run(&spec).await
    }

    /// Fire-and-continue: failures are logged, never raised.
    ///
    /// Returns `None` only when the command could not be started.
    pub async fn run_best_effort(&self, spec: CommandSpec) -> Option<CommandOutput> {
        let command = spec.to_string();
        match self.run(spec).await {
            Ok(output) => {
                if !output.success() {
                    tracing::warn!(
                        "`{}` exited with code {}: {}",
                        command,
                        output.exit_code,
                        output.stderr.trim()
                    );
                }
                Some(output)
            }
            Err(e) => {
                tracing::warn!("`{}` could not be run: {}", command, e);
                None
            }
        }
    }

    /// Run with inherited stdio until the child exits
    pub async fn run_foreground(&self, spec: CommandSpec) -> Result<i32> {
        let spec = self.with_env(spec);
        tracing::debug!("Launching {}", spec);
        self.runner.run_foreground(&spec).await
    }
}
