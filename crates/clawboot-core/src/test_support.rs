//! Test support utilities for clawboot-core
//!
//! Provides MockRunner for exercising the bootstrap stages without invoking
//! ssh-agent, git, gh or a real gateway.

use crate::{CommandOutput, CommandRunner, CommandSpec, CoreError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Records which runner methods were called
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Run(CommandSpec),
    Foreground(CommandSpec),
}

impl MockCall {
    pub fn spec(&self) -> &CommandSpec {
        match self {
            Self::Run(spec) | Self::Foreground(spec) => spec,
        }
    }
}

#[derive(Debug, Clone)]
enum MockResponse {
    Output(CommandOutput),
    SpawnFailure,
}

/// Configurable mock command runner for testing
pub struct MockRunner {
    pub calls: Arc<Mutex<Vec<MockCall>>>,
    /// Scripted responses keyed by full command line or bare program name
    responses: Arc<Mutex<HashMap<String, MockResponse>>>,
    /// Exit code returned by foreground launches
    pub foreground_exit_code: Arc<Mutex<i32>>,
    /// If set, foreground launches fail to spawn with this error kind
    pub foreground_error: Arc<Mutex<Option<std::io::ErrorKind>>>,
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRunner {
    /// Create a mock where every command succeeds with empty output
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            responses: Arc::new(Mutex::new(HashMap::new())),
            foreground_exit_code: Arc::new(Mutex::new(0)),
            foreground_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Script the result for a command.
    ///
    /// `command` is either a full command line (`"ssh-add -l"`) or a bare
    /// program name; full command lines take precedence.
    pub fn respond(&self, command: &str, exit_code: i32, stdout: &str, stderr: &str) {
        self.responses.lock().unwrap().insert(
            command.to_string(),
            MockResponse::Output(CommandOutput {
                exit_code,
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            }),
        );
    }

    /// Make a command fail to spawn as if it were not installed
    pub fn fail_spawn(&self, command: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(command.to_string(), MockResponse::SpawnFailure);
    }

    pub fn set_foreground_exit_code(&self, code: i32) {
        *self.foreground_exit_code.lock().unwrap() = code;
    }

    pub fn fail_foreground(&self, kind: std::io::ErrorKind) {
        *self.foreground_error.lock().unwrap() = Some(kind);
    }

    fn record(&self, call: MockCall) {
        self.calls.lock().unwrap().push(call);
    }

    /// Get all recorded calls
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Command lines of all recorded calls, in order
    pub fn commands(&self) -> Vec<String> {
        self.get_calls()
            .iter()
            .map(|call| call.spec().to_string())
            .collect()
    }

    /// Check if a command line was run
    pub fn was_run(&self, command: &str) -> bool {
        self.commands().iter().any(|c| c == command)
    }

    /// The most recently recorded command
    pub fn last_spec(&self) -> Option<CommandSpec> {
        self.get_calls().last().map(|call| call.spec().clone())
    }

    /// The recorded command for a command line
    pub fn spec_for(&self, command: &str) -> Option<CommandSpec> {
        self.get_calls()
            .into_iter()
            .map(|call| call.spec().clone())
            .find(|spec| spec.to_string() == command)
    }

    fn response_for(&self, spec: &CommandSpec) -> Option<MockResponse> {
        let responses = self.responses.lock().unwrap();
        responses
            .get(&spec.to_string())
            .or_else(|| responses.get(&spec.program))
            .cloned()
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        self.record(MockCall::Run(spec.clone()));
        match self.response_for(spec) {
            Some(MockResponse::Output(output)) => Ok(output),
            Some(MockResponse::SpawnFailure) => Err(CoreError::Spawn {
                program: spec.program.clone(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            }),
            None => Ok(CommandOutput::default()),
        }
    }

    async fn run_foreground(&self, spec: &CommandSpec) -> Result<i32> {
        self.record(MockCall::Foreground(spec.clone()));
        if let Some(kind) = *self.foreground_error.lock().unwrap() {
            return Err(CoreError::Spawn {
                program: spec.program.clone(),
                source: std::io::Error::from(kind),
            });
        }
        Ok(*self.foreground_exit_code.lock().unwrap())
    }
}
