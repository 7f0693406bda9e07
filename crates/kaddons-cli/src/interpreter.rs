//! External-command interpreter
//!
//! Runs a user-supplied command per workload. The interpretation request is
//! written to its stdin as JSON and a verdict object is read back from
//! stdout, optionally wrapped in a Markdown code fence.

use async_trait::async_trait;
use kaddons_core::pipeline::{InterpretationRequest, InterpretedVerdict, Interpreter};
use kaddons_core::{CoreError, CoreResult};
use kaddons_fetch::retry::{is_transient_message, retry};
use kaddons_fetch::RetryPolicy;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

pub struct CommandInterpreter {
    program: String,
    args: Vec<String>,
    retry: RetryPolicy,
}

impl CommandInterpreter {
    /// Split a command line on whitespace. No shell is involved.
    pub fn parse(command_line: &str) -> CoreResult<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| CoreError::Config("interpreter command is empty".to_string()))?;
        Ok(Self {
            program,
            args: parts.collect(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn run_once(&self, input: &[u8]) -> CoreResult<InterpretedVerdict> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Feed stdin while stdout is drained so a chatty command cannot
        // block on a full pipe.
        let stdin = child.stdin.take();
        let input = input.to_vec();
        let writer = tokio::spawn(async move {
            let Some(mut stdin) = stdin else {
                return Ok(());
            };
            match stdin.write_all(&input).await {
                // A command may exit without reading its input.
                Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => Err(e),
                _ => Ok(()),
            }
        });

        let output = child.wait_with_output().await?;
        writer
            .await
            .map_err(|e| CoreError::Collaborator(format!("interpreter input task failed: {}", e)))??;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CoreError::Collaborator(format!(
                "interpreter exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        parse_verdict(&String::from_utf8_lossy(&output.stdout))
    }
}

#[async_trait]
impl Interpreter for CommandInterpreter {
    async fn interpret(&self, request: &InterpretationRequest) -> CoreResult<InterpretedVerdict> {
        let input = serde_json::to_vec(request)?;
        retry(
            &self.retry,
            |e: &CoreError| is_transient_message(&e.to_string()),
            |_| self.run_once(&input),
        )
        .await
    }
}

/// The JSON object in interpreter output, with code fences removed.
pub fn extract_json_object(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    let body = match trimmed.strip_prefix("```") {
        Some(fenced) => {
            let fenced = fenced.strip_prefix("json").unwrap_or(fenced);
            fenced.trim_end().strip_suffix("```").unwrap_or(fenced)
        }
        None => trimmed,
    };
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (start < end).then(|| &body[start..=end])
}

pub fn parse_verdict(output: &str) -> CoreResult<InterpretedVerdict> {
    let json = extract_json_object(output).ok_or_else(|| {
        CoreError::Collaborator("interpreter returned no JSON object".to_string())
    })?;
    Ok(serde_json::from_str(json)?)
}
