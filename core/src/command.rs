// Synchronous execution of external tools through the shell.

use crate::text::cleanup_cursor;
use crate::PartsmithError;
use log::{debug, warn};
use std::process::{Command, ExitStatus, Output, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;

/// Exit status reported when the process could not be started at all.
pub const SPAWN_FAILED: i32 = -1;
/// Exit status reported when a timed command was killed.
pub const TIMED_OUT: i32 = -2;

/// Captured result of one command. Created per invocation and dropped once
/// the caller has parsed it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: i32,
}

impl CommandResult {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>, exit_status: i32) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_status,
        }
    }

    pub fn spawn_failure(error: &PartsmithError) -> Self {
        Self::new(String::new(), error.to_string(), SPAWN_FAILED)
    }

    pub fn success(&self) -> bool {
        self.exit_status == 0
    }

    pub fn spawn_failed(&self) -> bool {
        self.exit_status == SPAWN_FAILED
    }

    pub fn timed_out(&self) -> bool {
        self.exit_status == TIMED_OUT
    }
}

/// Runs a command line and waits for it. Implementations never fail: a
/// process that cannot be started is reported as [`SPAWN_FAILED`].
pub trait CommandRunner: Send + Sync {
    fn run(&self, command: &str, fixed_locale: bool) -> CommandResult;

    /// Like [`run`](CommandRunner::run) but kills the command once `timeout`
    /// has passed and reports [`TIMED_OUT`].
    fn run_timed(&self, command: &str, fixed_locale: bool, timeout: Duration) -> CommandResult;
}

/// Runs commands with `sh -c`.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: String,
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self { shell: "sh".to_string() }
    }
}

impl ShellRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different shell binary.
    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self { shell: shell.into() }
    }

    fn command(&self, command: &str, fixed_locale: bool) -> Command {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(command);
        if fixed_locale {
            // Only the locale and the search path reach the tool so its
            // numbers and messages come out in a predictable form.
            cmd.env_clear().env("LC_ALL", "C");
            if let Some(path) = std::env::var_os("PATH") {
                cmd.env("PATH", path);
            }
        }
        cmd
    }

    /// Run to completion, failing only if the process cannot be spawned.
    pub fn execute(&self, command: &str, fixed_locale: bool) -> Result<CommandResult, PartsmithError> {
        debug!("exec: {}", command);
        let output: Output = self
            .command(command, fixed_locale)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| PartsmithError::Spawn {
                command: command.to_string(),
                source,
            })?;

        Ok(CommandResult::new(
            cleanup_cursor(&String::from_utf8_lossy(&output.stdout)),
            String::from_utf8_lossy(&output.stderr),
            exit_code(output.status),
        ))
    }

    /// Run with a deadline. The tool is driven on a single-threaded tokio
    /// runtime so its pipes are drained while the deadline runs.
    pub fn execute_timed(
        &self,
        command: &str,
        fixed_locale: bool,
        timeout: Duration,
    ) -> Result<CommandResult, PartsmithError> {
        debug!("exec (timeout {:?}): {}", timeout, command);
        let mut cmd = self.command(command, fixed_locale);
        #[cfg(unix)]
        {
            // Own process group, so a timeout takes down whatever the shell
            // started as well.
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
        let (status, stdout, mut stderr) = runtime.block_on(async move {
            let mut child = tokio::process::Command::from(cmd)
                .spawn()
                .map_err(|source| PartsmithError::Spawn {
                    command: command.to_string(),
                    source,
                })?;
            let stdout_reader = tokio::spawn(drain(child.stdout.take()));
            let stderr_reader = tokio::spawn(drain(child.stderr.take()));

            let status = match tokio::time::timeout(timeout, child.wait()).await {
                Ok(status) => Some(status?),
                Err(_) => {
                    kill_tree(&mut child);
                    child.wait().await?;
                    None
                }
            };

            let stdout = stdout_reader.await.unwrap_or_default();
            let stderr = stderr_reader.await.unwrap_or_default();
            Ok::<_, PartsmithError>((status, stdout, stderr))
        })?;

        let exit_status = match status {
            Some(status) => exit_code(status),
            None => {
                let err = PartsmithError::Timeout {
                    command: command.to_string(),
                    seconds: timeout.as_secs_f64(),
                };
                warn!("{}", err);
                if !stderr.is_empty() && !stderr.ends_with('\n') {
                    stderr.push('\n');
                }
                stderr.push_str(&err.to_string());
                TIMED_OUT
            }
        };

        Ok(CommandResult::new(cleanup_cursor(&stdout), stderr, exit_status))
    }
}

impl CommandRunner for ShellRunner {
    fn run(&self, command: &str, fixed_locale: bool) -> CommandResult {
        self.execute(command, fixed_locale).unwrap_or_else(|e| {
            warn!("{}", e);
            CommandResult::spawn_failure(&e)
        })
    }

    fn run_timed(&self, command: &str, fixed_locale: bool, timeout: Duration) -> CommandResult {
        self.execute_timed(command, fixed_locale, timeout).unwrap_or_else(|e| {
            warn!("{}", e);
            CommandResult::spawn_failure(&e)
        })
    }
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf).await;
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;
    let group = child.id().map(|pid| killpg(Pid::from_raw(pid as i32), Signal::SIGKILL));
    if !matches!(group, Some(Ok(()))) {
        let _ = child.start_kill();
    }
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) {
    let _ = child.start_kill();
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(SPAWN_FAILED)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(SPAWN_FAILED)
}
