//! Display capability: where the pipeline writes chat lines.
//!
//! The host widget implements `DisplaySink`. Every appended line returns a
//! `LineHandle`; transient lines (the "Thinking..." status) are retracted by
//! that handle rather than located by text.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// What a display line represents. Hosts use this for styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    /// Echo of the user's submission.
    User,
    /// Assistant answer.
    Assistant,
    /// Transient progress indicator, retracted when the run settles.
    Status,
    /// Surfaced failure.
    Error,
    /// Informational line (welcome text, warnings, conversation reset).
    Notice,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayLine {
    pub kind: LineKind,
    pub text: String,
}

impl DisplayLine {
    pub fn user(text: impl Into<String>) -> Self {
        Self { kind: LineKind::User, text: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { kind: LineKind::Assistant, text: text.into() }
    }

    pub fn status(text: impl Into<String>) -> Self {
        Self { kind: LineKind::Status, text: text.into() }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self { kind: LineKind::Error, text: text.into() }
    }

    pub fn notice(text: impl Into<String>) -> Self {
        Self { kind: LineKind::Notice, text: text.into() }
    }

    /// Plain-text rendering for hosts without rich styling.
    pub fn render(&self) -> String {
        match self.kind {
            LineKind::User => format!("You: {}", self.text),
            LineKind::Assistant | LineKind::Status => format!("AI: {}", self.text),
            LineKind::Error => format!("AI: Error - {}", self.text),
            LineKind::Notice => self.text.clone(),
        }
    }
}

/// Opaque identifier of a line appended to a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineHandle(u64);

impl LineHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line#{}", self.0)
    }
}

pub trait DisplaySink: Send + Sync {
    fn append_line(&self, line: DisplayLine) -> LineHandle;

    /// Remove a previously appended line. Unknown handles are ignored.
    fn retract(&self, handle: LineHandle);
}

// ═══════════════════════════════════════════════════════════
// ChatLog: in-memory sink
// ═══════════════════════════════════════════════════════════

/// Thread-safe in-memory display buffer.
///
/// Suitable as the backing model of a simple text widget: the host re-renders
/// from `lines()` after each change.
#[derive(Debug, Default)]
pub struct ChatLog {
    next_id: AtomicU64,
    lines: Mutex<Vec<(LineHandle, DisplayLine)>>,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of current lines, oldest first.
    pub fn lines(&self) -> Vec<DisplayLine> {
        self.lines
            .lock()
            .map(|lines| lines.iter().map(|(_, l)| l.clone()).collect())
            .unwrap_or_default()
    }

    /// All lines rendered and joined with newlines.
    pub fn rendered(&self) -> String {
        self.lines()
            .iter()
            .map(DisplayLine::render)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn lines_of(&self, kind: LineKind) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|l| l.kind == kind)
            .map(|l| l.text)
            .collect()
    }
}

impl DisplaySink for ChatLog {
    fn append_line(&self, line: DisplayLine) -> LineHandle {
        let handle = LineHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut lines) = self.lines.lock() {
            lines.push((handle, line));
        }
        handle
    }

    fn retract(&self, handle: LineHandle) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.retain(|(h, _)| *h != handle);
        }
    }
}
