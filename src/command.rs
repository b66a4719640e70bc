use std::fmt;
use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::context::ExecutionContext;
use crate::format::{Format, Variant};

/// Terminal status of a pipeline command. `Initialized` is the only
/// non-terminal state; a command moves to exactly one of the others, once,
/// and never reverts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Initialized,
    Ok,
    Fail,
    Skipped,
    Noop,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        self != Status::Initialized
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Initialized => "INITIALIZED",
            Status::Ok => "OK",
            Status::Fail => "FAIL",
            Status::Skipped => "SKIPPED",
            Status::Noop => "NOOP",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a command does, for reporting and for graph-shape assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Export,
    Convert,
    Correctness,
    Performance,
    ConfigGen,
    Preprocess,
    Dump,
}

impl CommandKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::Export => "export",
            CommandKind::Convert => "convert",
            CommandKind::Correctness => "correctness",
            CommandKind::Performance => "performance",
            CommandKind::ConfigGen => "config_gen",
            CommandKind::Preprocess => "preprocess",
            CommandKind::Dump => "dump",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an invocation ended, as seen by the action itself. Errors are a
/// separate channel (`Result::Err` becomes `Status::Fail`).
#[derive(Debug)]
pub enum Execution {
    /// Work done (or cached output found); carries the workdir-relative
    /// artifact path if the command produces one.
    Completed(Option<PathBuf>),
    /// A precondition was missing (typically the input artifact of an
    /// upstream command that did not run); carries the reason.
    Skipped(String),
    /// Nothing to do under this configuration.
    Noop,
}

/// The invocable body of a command.
///
/// Implementations must be idempotent: when the canonical output artifact
/// already exists on disk they short-circuit and return the existing path.
/// The cache check is existence-only: a changed upstream artifact does not
/// force re-conversion; delete the output (or the workdir) to redo work.
pub trait CommandAction {
    fn run(&self, ctx: &ExecutionContext) -> Result<Execution>;
}

impl<F> CommandAction for F
where
    F: Fn(&ExecutionContext) -> Result<Execution>,
{
    fn run(&self, ctx: &ExecutionContext) -> Result<Execution> {
        self(ctx)
    }
}

/// Index of a command within its pipeline's arena. Stable for the lifetime
/// of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandId(pub(crate) usize);

impl CommandId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One unit of work in the pipeline graph: identity, declared dependencies,
/// status, and the action to invoke.
pub struct Command {
    pub name: String,
    pub kind: CommandKind,
    pub target_format: Option<Format>,
    pub variant: Variant,
    pub requires: Vec<CommandId>,
    /// False for prerequisites the builder inserted on its own; those do not
    /// count toward the user's requested outputs in the report.
    pub requested: bool,
    status: Status,
    output: Option<PathBuf>,
    action: Box<dyn CommandAction>,
}

impl Command {
    pub fn new(
        name: impl Into<String>,
        kind: CommandKind,
        action: impl CommandAction + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            target_format: None,
            variant: Variant::default(),
            requires: Vec::new(),
            requested: true,
            status: Status::Initialized,
            output: None,
            action: Box::new(action),
        }
    }

    pub fn target_format(mut self, format: Format) -> Self {
        self.target_format = Some(format);
        self
    }

    pub fn variant(mut self, variant: Variant) -> Self {
        self.variant = variant;
        self
    }

    pub fn requires(mut self, requires: Vec<CommandId>) -> Self {
        self.requires = requires;
        self
    }

    pub fn not_requested(mut self) -> Self {
        self.requested = false;
        self
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn output(&self) -> Option<&PathBuf> {
        self.output.as_ref()
    }

    pub(crate) fn invoke(&self, ctx: &ExecutionContext) -> Result<Execution> {
        self.action.run(ctx)
    }

    /// Record the terminal status. Statuses are monotonic: once terminal,
    /// further transitions are ignored.
    pub(crate) fn finish(&mut self, status: Status, output: Option<PathBuf>) {
        if self.status.is_terminal() {
            return;
        }
        debug_assert!(status.is_terminal());
        self.status = status;
        self.output = output;
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("target_format", &self.target_format)
            .field("variant", &self.variant)
            .field("requires", &self.requires)
            .field("requested", &self.requested)
            .field("status", &self.status)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &ExecutionContext) -> Result<Execution> {
        Ok(Execution::Noop)
    }

    #[test]
    fn status_serializes_in_report_vocabulary() {
        assert_eq!(serde_json::to_string(&Status::Ok).unwrap(), "\"OK\"");
        assert_eq!(serde_json::to_string(&Status::Skipped).unwrap(), "\"SKIPPED\"");
        assert_eq!(
            serde_json::from_str::<Status>("\"INITIALIZED\"").unwrap(),
            Status::Initialized
        );
    }

    #[test]
    fn terminal_status_never_reverts() {
        let mut command = Command::new("x", CommandKind::Export, noop);
        assert!(!command.status().is_terminal());
        command.finish(Status::Fail, None);
        command.finish(Status::Ok, Some(PathBuf::from("onnx/model.onnx")));
        assert_eq!(command.status(), Status::Fail);
        assert!(command.output().is_none());
    }
}
