// Plumbing shared by the drivers: running tools and reporting their output.

use partsmith_core::driver::execute_command;
use partsmith_core::{CommandResult, CommandRunner, OperationDetail, OperationStatus, Partition, Settings};
use std::sync::Arc;

/// Everything a driver needs to reach the outside world. Cheap to clone;
/// every driver holds its own copy.
#[derive(Clone)]
pub struct ToolContext {
    runner: Arc<dyn CommandRunner>,
    settings: Settings,
}

impl ToolContext {
    pub fn new(runner: Arc<dyn CommandRunner>, settings: Settings) -> Self {
        Self { runner, settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Run an inspection command under the C locale so its numbers parse.
    pub fn read(&self, command: &str) -> CommandResult {
        self.runner.run(command, true)
    }

    /// Run a state-changing command, logging it into `detail`. Returns whether
    /// the exit status is in `accepted`.
    pub fn execute(&self, command: &str, detail: &mut OperationDetail, accepted: &[i32]) -> bool {
        let result = execute_command(
            self.runner.as_ref(),
            command,
            detail,
            self.settings.command_timeout(),
            accepted,
        );
        accepted.contains(&result.exit_status)
    }
}

/// Keep a failed inspection's output for the operator.
pub fn record_failure(partition: &mut Partition, result: &CommandResult) {
    partition.push_output(&result.stdout, &result.stderr);
}

/// Log a step that failed before any tool could be run.
pub fn log_error(detail: &mut OperationDetail, message: impl Into<String>) -> bool {
    detail
        .add_child(OperationDetail::new(message, OperationStatus::Error))
        .set_status(OperationStatus::Error);
    false
}
