// crates/tools/src/process.rs
//! Child-process command runner

use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, instrument};

use harrow_common::{CommandError, CommandSpec, Invocation, ToolRunner};

/// One spawned member of an invocation.
struct Running {
    program: String,
    child: Child,
    stderr: JoinHandle<Vec<u8>>,
}

/// Runs invocations as real child processes.
///
/// Every child is awaited before `run` returns, including on spawn errors and
/// timeouts; `kill_on_drop` only covers a cancelled caller.
pub struct ProcessRunner {
    working_dir: Option<PathBuf>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every command from this directory.
    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    fn command(&self, spec: &CommandSpec, stdin: Stdio) -> Command {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Spawn every member, wiring stdout of one into stdin of the next.
    /// Returns the running members and a reader for the last stdout.
    async fn spawn_chain(
        &self,
        invocation: &Invocation,
    ) -> Result<(Vec<Running>, JoinHandle<io::Result<Vec<u8>>>), CommandError> {
        let count = invocation.commands.len();
        let mut running: Vec<Running> = Vec::with_capacity(count);
        let mut upstream: Option<Stdio> = None;

        for (i, spec) in invocation.commands.iter().enumerate() {
            let stdin = match upstream.take() {
                Some(pipe) => pipe,
                None if invocation.stdin.is_some() => Stdio::piped(),
                None => Stdio::null(),
            };

            let mut child = match self.command(spec, stdin).spawn() {
                Ok(child) => child,
                Err(source) => {
                    terminate(&mut running).await;
                    return Err(CommandError::Spawn {
                        program: spec.program.clone(),
                        source,
                    });
                }
            };

            if i == 0 {
                if let (Some(input), Some(mut pipe)) = (invocation.stdin.clone(), child.stdin.take()) {
                    tokio::spawn(async move {
                        // A tool may exit without draining stdin.
                        if let Err(e) = pipe.write_all(input.as_bytes()).await {
                            debug!(error = %e, "stdin write interrupted");
                        }
                    });
                }
            }

            let stderr = drain(child.stderr.take());
            let stdout = child.stdout.take();
            running.push(Running {
                program: spec.program.clone(),
                child,
                stderr,
            });

            let Some(stdout) = stdout else {
                terminate(&mut running).await;
                return Err(CommandError::Io {
                    program: spec.program.clone(),
                    source: io::Error::new(io::ErrorKind::BrokenPipe, "stdout not captured"),
                });
            };

            if i + 1 < count {
                let pipe: io::Result<Stdio> = stdout.try_into();
                match pipe {
                    Ok(pipe) => upstream = Some(pipe),
                    Err(source) => {
                        terminate(&mut running).await;
                        return Err(CommandError::Io {
                            program: spec.program.clone(),
                            source,
                        });
                    }
                }
            } else {
                let reader = tokio::spawn(async move {
                    let mut stdout = stdout;
                    let mut buf = Vec::new();
                    stdout.read_to_end(&mut buf).await?;
                    Ok(buf)
                });
                return Ok((running, reader));
            }
        }

        Err(CommandError::EmptyInvocation)
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self { working_dir: None }
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    #[instrument(skip(self, invocation), fields(label = %invocation.label))]
    async fn run(&self, invocation: &Invocation, limit: Duration) -> Result<String, CommandError> {
        if invocation.commands.is_empty() {
            return Err(CommandError::EmptyInvocation);
        }
        info!(command = %invocation, "launching external tool");

        let (mut running, stdout) = self.spawn_chain(invocation).await?;

        let statuses = match timeout(limit, wait_all(&mut running)).await {
            Ok(Ok(statuses)) => statuses,
            Ok(Err(e)) => {
                terminate(&mut running).await;
                stdout.abort();
                return Err(e);
            }
            Err(_) => {
                terminate(&mut running).await;
                stdout.abort();
                return Err(CommandError::TimedOut {
                    program: invocation.label.clone(),
                    after: limit,
                });
            }
        };

        let output = match stdout.await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(source)) => {
                return Err(CommandError::Io {
                    program: invocation.label.clone(),
                    source,
                })
            }
            Err(join) => {
                return Err(CommandError::Io {
                    program: invocation.label.clone(),
                    source: io::Error::new(io::ErrorKind::Other, join.to_string()),
                })
            }
        };

        // pipefail: the first failing member decides the error
        for (member, status) in running.into_iter().zip(statuses) {
            if !status.success() {
                let stderr = member.stderr.await.unwrap_or_default();
                return Err(CommandError::Failed {
                    program: member.program,
                    code: status.code(),
                    stderr: String::from_utf8_lossy(&stderr).into_owned(),
                });
            }
        }

        debug!(bytes = output.len(), "external tool finished");
        Ok(String::from_utf8_lossy(&output).into_owned())
    }

    fn name(&self) -> &str {
        "process"
    }
}

fn drain<R>(pipe: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    })
}

async fn wait_all(running: &mut [Running]) -> Result<Vec<ExitStatus>, CommandError> {
    let mut statuses = Vec::with_capacity(running.len());
    for member in running.iter_mut() {
        let status = member.child.wait().await.map_err(|source| CommandError::Io {
            program: member.program.clone(),
            source,
        })?;
        statuses.push(status);
    }
    Ok(statuses)
}

/// Kill and reap every member.
async fn terminate(running: &mut [Running]) {
    for member in running.iter_mut() {
        if let Err(e) = member.child.kill().await {
            debug!(program = %member.program, error = %e, "kill after exit");
        }
    }
}
