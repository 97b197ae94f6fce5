use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use log::debug;
use shadow_scheduler::{Generation, GenerationError, Generator, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};

const SYSTEM_ARG: &str = "{system}";
const USER_ARG: &str = "{user}";

/// Runs an external program as the model and streams its stdout line by line.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandGenerator {
    pub fn new(argv: Vec<String>, timeout: Duration) -> Self {
        Self { argv, timeout }
    }

    fn uses_placeholders(&self) -> bool {
        self.argv
            .iter()
            .any(|arg| arg.contains(SYSTEM_ARG) || arg.contains(USER_ARG))
    }
}

#[async_trait]
impl Generator for CommandGenerator {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<Generation> {
        let Some((program, args)) = self.argv.split_first() else {
            return Err(GenerationError::Configuration(
                "no generator command configured (set [generator].command or SHADOW_SYNC_GENERATOR)"
                    .to_string(),
            ));
        };

        let via_args = self.uses_placeholders();
        let args: Vec<String> = args
            .iter()
            .map(|arg| substitute_prompts(arg, system_prompt, user_prompt))
            .collect();

        debug!("Spawning generator {program}");
        let mut child = Command::new(program)
            .args(&args)
            .stdin(if via_args { Stdio::null() } else { Stdio::piped() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                GenerationError::Configuration(format!("failed to start generator {program}: {err}"))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // Written concurrently so a chatty generator cannot fill stdout and stall us.
            let payload = format!("{system_prompt}\n\n{user_prompt}");
            tokio::spawn(async move {
                if let Err(err) = stdin.write_all(payload.as_bytes()).await {
                    debug!("Generator closed stdin early: {err}");
                }
            });
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| GenerationError::Transient("generator stdout unavailable".into()))?;
        let stderr = child.stderr.take().map(|mut pipe| {
            tokio::spawn(async move {
                let mut text = String::new();
                let _ = pipe.read_to_string(&mut text).await;
                text
            })
        });

        let state = OutputState {
            child,
            stdout: BufReader::new(stdout),
            stderr,
            deadline: Instant::now() + self.timeout,
            timeout: self.timeout,
            done: false,
        };
        Ok(Generation::Stream(
            stream::unfold(state, |mut state| async move {
                let item = state.next_fragment().await?;
                Some((item, state))
            })
            .boxed(),
        ))
    }
}

/// Replaces `{system}` and `{user}` in one left-to-right pass, so placeholder text
/// inside a prompt is never expanded again.
fn substitute_prompts(arg: &str, system_prompt: &str, user_prompt: &str) -> String {
    let mut out = String::with_capacity(arg.len());
    let mut rest = arg;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        if let Some(after) = tail.strip_prefix(SYSTEM_ARG) {
            out.push_str(system_prompt);
            rest = after;
        } else if let Some(after) = tail.strip_prefix(USER_ARG) {
            out.push_str(user_prompt);
            rest = after;
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

struct OutputState {
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr: Option<JoinHandle<String>>,
    deadline: Instant,
    timeout: Duration,
    done: bool,
}

impl OutputState {
    async fn next_fragment(&mut self) -> Option<Result<String>> {
        if self.done {
            return None;
        }
        let mut line = String::new();
        let read = match timeout_at(self.deadline, self.stdout.read_line(&mut line)).await {
            Ok(read) => read,
            Err(_) => return Some(Err(self.fail(self.timed_out()))),
        };
        match read {
            Ok(0) => self.exit_status().await.map(Err),
            Ok(_) => Some(Ok(line)),
            Err(err) => Some(Err(self.fail(GenerationError::Transient(format!(
                "reading generator output: {err}"
            ))))),
        }
    }

    /// `None` on a clean exit; otherwise the failure to yield.
    async fn exit_status(&mut self) -> Option<GenerationError> {
        self.done = true;
        let status = match timeout_at(self.deadline, self.child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(err)) => {
                return Some(GenerationError::Transient(format!(
                    "waiting for generator: {err}"
                )))
            }
            Err(_) => return Some(self.timed_out()),
        };
        if status.success() {
            return None;
        }
        let stderr = match self.stderr.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };
        let detail = stderr.trim();
        Some(GenerationError::Transient(if detail.is_empty() {
            format!("generator exited with {status}")
        } else {
            format!("generator exited with {status}: {detail}")
        }))
    }

    fn fail(&mut self, err: GenerationError) -> GenerationError {
        self.done = true;
        let _ = self.child.start_kill();
        err
    }

    fn timed_out(&self) -> GenerationError {
        GenerationError::Transient(format!(
            "generator timed out after {} ms",
            self.timeout.as_millis()
        ))
    }
}
