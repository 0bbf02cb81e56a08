//! Stand-ins for the host: a command runner that replays canned output and
//! a probe with a fixed set of programs.

use crate::common::ToolContext;
use partsmith_core::{CommandResult, CommandRunner, FilesystemType, HostProbe, Operation, Settings};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Responder = Box<dyn Fn(&str) -> CommandResult + Send + Sync>;

/// Answers each command with the first response whose pattern it contains.
/// Commands nothing matches exit 127, as a shell does for a missing tool.
pub struct ScriptedRunner {
    responses: Mutex<Vec<(String, Responder)>>,
    calls: Mutex<Vec<(String, bool)>>,
}

impl ScriptedRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn respond(self: Arc<Self>, pattern: &str, result: CommandResult) -> Arc<Self> {
        self.respond_with(pattern, move |_| result.clone())
    }

    pub fn respond_with(
        self: Arc<Self>,
        pattern: &str,
        responder: impl Fn(&str) -> CommandResult + Send + Sync + 'static,
    ) -> Arc<Self> {
        self.responses
            .lock()
            .unwrap()
            .push((pattern.to_string(), Box::new(responder)));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn locales(&self) -> Vec<bool> {
        self.calls.lock().unwrap().iter().map(|(_, l)| *l).collect()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, command: &str, fixed_locale: bool) -> CommandResult {
        self.calls.lock().unwrap().push((command.to_string(), fixed_locale));
        let responses = self.responses.lock().unwrap();
        responses
            .iter()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
            .map(|(_, responder)| responder(command))
            .unwrap_or_else(|| CommandResult::new("", format!("sh: {}: not found\n", command), 127))
    }

    fn run_timed(&self, command: &str, fixed_locale: bool, _timeout: Duration) -> CommandResult {
        self.run(command, fixed_locale)
    }
}

/// Settings for tests: no pause before serial changes.
pub fn test_settings() -> Settings {
    Settings {
        uuid_write_delay_ms: 0,
        ..Settings::default()
    }
}

pub fn context(runner: &Arc<ScriptedRunner>) -> ToolContext {
    ToolContext::new(runner.clone(), test_settings())
}

#[derive(Default)]
pub struct FakeHost {
    programs: HashSet<String>,
    native_fat_resize: bool,
}

impl FakeHost {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with(programs: &[&str]) -> Self {
        Self {
            programs: programs.iter().map(|p| p.to_string()).collect(),
            native_fat_resize: false,
        }
    }

    pub fn native_fat_resize(mut self) -> Self {
        self.native_fat_resize = true;
        self
    }
}

impl HostProbe for FakeHost {
    fn has_program(&self, program: &str) -> bool {
        self.programs.contains(program)
    }

    fn native_support(&self, filesystem: FilesystemType, op: Operation) -> bool {
        self.native_fat_resize
            && matches!(filesystem, FilesystemType::Fat16 | FilesystemType::Fat32)
            && matches!(op, Operation::Grow | Operation::Shrink)
    }
}
