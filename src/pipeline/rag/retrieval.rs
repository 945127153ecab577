//! Knowledge bridge: documentation retrieval through an external driver.
//!
//! One subprocess per call. The driver writes newline-delimited JSON; the
//! last `success` or `result` line is authoritative, `debug` and `error`
//! lines are diagnostics. Every failure degrades to "no passages".
//!
//! The bundled driver dispatches on its arguments: none initialises the
//! index, `<query> <limit>` searches it.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use super::types::RetrievedPassage;
use crate::config::{BridgeConfig, BridgeDriver};

/// Python source of the bundled driver, run with `python3 -c`.
pub const DOCS_DRIVER_SCRIPT: &str = include_str!("docs_driver.py");

#[derive(Debug, thiserror::Error)]
pub(crate) enum BridgeError {
    #[error("Failed to start retrieval driver: {0}")]
    Spawn(String),

    #[error("Retrieval driver timed out after {0:?}")]
    Timeout(Duration),

    #[error("Retrieval driver exited with status {code:?}")]
    ExitStatus { code: Option<i32> },

    #[error("Retrieval driver produced no success or result line")]
    NoAuthoritativeLine,

    #[error("Malformed retrieval payload: {0}")]
    Malformed(String),
}

/// The driver could not be brought up; retrieval stays disabled.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Documentation retriever unavailable: {reason}")]
pub struct BridgeUnavailable {
    pub reason: String,
}

/// Proof that the driver initialised successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeReady;

/// One line of driver output. A `result` line without `message` does not
/// parse and is skipped like any non-JSON line.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum DriverLine {
    Debug {
        #[serde(default)]
        message: serde_json::Value,
    },
    Error {
        #[serde(default)]
        message: serde_json::Value,
    },
    Success,
    Result {
        message: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

impl DriverLine {
    fn is_authoritative(&self) -> bool {
        matches!(self, Self::Success | Self::Result { .. })
    }
}

/// Diagnostic text of a `debug`/`error` message.
fn message_text(message: &serde_json::Value) -> String {
    match message {
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct KnowledgeBridge {
    config: Arc<BridgeConfig>,
}

impl KnowledgeBridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Run the driver with no arguments and expect a `success` line.
    pub async fn initialize(&self) -> Result<BridgeReady, BridgeUnavailable> {
        let unavailable = |e: BridgeError| BridgeUnavailable {
            reason: e.to_string(),
        };
        let output = self.run(&[]).await.map_err(unavailable)?;
        match authoritative_line(&output) {
            Some(DriverLine::Success) => {
                tracing::info!(program = %self.config.program.display(), "Documentation retriever initialised");
                Ok(BridgeReady)
            }
            Some(_) => Err(unavailable(BridgeError::Malformed(
                "expected a success line".to_string(),
            ))),
            None => Err(unavailable(BridgeError::NoAuthoritativeLine)),
        }
    }

    /// Up to `limit` passages for `text`, in driver order. Empty on any
    /// failure.
    #[instrument(skip_all, fields(limit = limit))]
    pub async fn query(&self, text: &str, limit: usize) -> Vec<RetrievedPassage> {
        match self.try_query(text, limit).await {
            Ok(passages) => {
                debug!(count = passages.len(), "Retrieved passages");
                passages
            }
            Err(e) => {
                warn!(error = %e, "Retrieval failed, continuing without documentation context");
                Vec::new()
            }
        }
    }

    /// `query` with the configured result limit.
    pub async fn search(&self, text: &str) -> Vec<RetrievedPassage> {
        self.query(text, self.config.result_limit).await
    }

    async fn try_query(&self, text: &str, limit: usize) -> Result<Vec<RetrievedPassage>, BridgeError> {
        let output = self.run(&[text.to_string(), limit.to_string()]).await?;
        match authoritative_line(&output).ok_or(BridgeError::NoAuthoritativeLine)? {
            DriverLine::Result { message } => parse_passages(message),
            _ => {
                debug!("Driver reported success without results");
                Ok(Vec::new())
            }
        }
    }

    /// Program and arguments for one driver call.
    pub fn command_line(&self, args: &[String]) -> (PathBuf, Vec<OsString>) {
        let mut argv: Vec<OsString> = Vec::with_capacity(args.len() + 2);
        match &self.config.driver {
            Some(BridgeDriver::Builtin) => {
                argv.push("-c".into());
                argv.push(DOCS_DRIVER_SCRIPT.into());
            }
            Some(BridgeDriver::Script(path)) => argv.push(path.clone().into_os_string()),
            None => {}
        }
        argv.extend(args.iter().map(OsString::from));
        (self.config.program.clone(), argv)
    }

    /// Combined stdout then stderr of one driver run. Non-zero exit is an error.
    async fn run(&self, args: &[String]) -> Result<String, BridgeError> {
        let (program, argv) = self.command_line(args);
        let mut cmd = Command::new(program);
        cmd.args(argv)
            .env("PYTHONUNBUFFERED", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(python_path) = &self.config.python_path {
            cmd.env("PYTHONPATH", python_path);
        }
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }

        let output = tokio::time::timeout(self.config.timeout, cmd.output())
            .await
            .map_err(|_| BridgeError::Timeout(self.config.timeout))?
            .map_err(|e| BridgeError::Spawn(e.to_string()))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        if !combined.is_empty() && !combined.ends_with('\n') {
            combined.push('\n');
        }
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        log_diagnostics(&combined);

        if !output.status.success() {
            return Err(BridgeError::ExitStatus {
                code: output.status.code(),
            });
        }
        Ok(combined)
    }
}

fn log_diagnostics(output: &str) {
    for line in output.lines() {
        let Ok(parsed) = serde_json::from_str::<DriverLine>(line.trim()) else {
            continue;
        };
        match parsed {
            DriverLine::Debug { message } => {
                debug!(driver = %message_text(&message), "Retrieval driver")
            }
            DriverLine::Error { message } => {
                warn!(driver = %message_text(&message), "Retrieval driver reported an error")
            }
            _ => {}
        }
    }
}

/// Last `success` line, or last `result` line carrying a message.
fn authoritative_line(output: &str) -> Option<DriverLine> {
    output
        .lines()
        .rev()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| serde_json::from_str::<DriverLine>(line).ok())
        .find(DriverLine::is_authoritative)
}

fn parse_passages(message: serde_json::Value) -> Result<Vec<RetrievedPassage>, BridgeError> {
    let serde_json::Value::Array(entries) = message else {
        return Err(BridgeError::Malformed(
            "result message is not an array".to_string(),
        ));
    };

    let passages = entries
        .into_iter()
        .filter_map(|entry| {
            let content = entry.get("content")?.as_str()?.to_string();
            let relevance = entry.get("relevance")?.as_f64()?;
            let metadata = entry
                .get("metadata")
                .and_then(|m| m.as_object())
                .cloned()
                .unwrap_or_default();
            Some(RetrievedPassage {
                content,
                metadata,
                relevance,
            })
        })
        .collect();
    Ok(passages)
}
