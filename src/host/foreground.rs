use super::{HandleInner, HostHandle, Outcome, SupervisorHost};
use crate::error::{LaunchError, Result};
use crate::logs::{LogSink, Stream};
use crate::plan::LaunchPlan;
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// How long to keep reading output after the child has exited. Grandchildren
/// that inherited the pipes can otherwise keep them open indefinitely.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Runs the single instance in the foreground of the calling process.
///
/// Output is copied line by line into the plan's log files. The restart
/// policy is not applied: when the child exits, the run is over.
#[derive(Debug, Default, Clone, Copy)]
pub struct ForegroundHost;

impl ForegroundHost {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SupervisorHost for ForegroundHost {
    fn kind(&self) -> &'static str {
        "foreground"
    }

    async fn launch(&self, plan: &LaunchPlan) -> Result<HostHandle> {
        if plan.restart.autorestart {
            tracing::debug!(
                "Foreground host does not restart {}; autorestart is left to a supervising host",
                plan.name
            );
        }

        // Open logs before spawning so a bad log path never leaves an orphan
        plan.create_log_directories()?;
        let sink = Arc::new(Mutex::new(LogSink::open(&plan.logs).await?));

        let mut command = Command::new(&plan.program);
        command
            .args(&plan.args)
            .current_dir(&plan.cwd)
            .envs(&plan.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|e| {
            LaunchError::SpawnError(format!(
                "Failed to spawn process '{}' ({}): {}",
                plan.name,
                plan.program.display(),
                e
            ))
        })?;

        let pid = child.id().ok_or_else(|| {
            LaunchError::SpawnError(format!("Failed to get PID for process '{}'", plan.name))
        })?;

        let mut pumps = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            pumps.push(tokio::spawn(pump(stdout, Stream::Stdout, Arc::clone(&sink))));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(tokio::spawn(pump(stderr, Stream::Stderr, Arc::clone(&sink))));
        }

        tracing::info!("Started {} (PID: {})", plan.name, pid);

        Ok(HostHandle {
            name: plan.name.clone(),
            inner: HandleInner::Foreground(Running {
                child,
                pid,
                kill_timeout: plan.kill_timeout,
                pumps,
                sink,
                outcome: None,
            }),
        })
    }
}

/// A child started by [`ForegroundHost`]
#[derive(Debug)]
pub(super) struct Running {
    child: Child,
    pid: u32,
    kill_timeout: Duration,
    pumps: Vec<JoinHandle<Result<()>>>,
    sink: Arc<Mutex<LogSink>>,
    outcome: Option<Outcome>,
}

impl Running {
    pub(super) fn pid(&self) -> u32 {
        self.pid
    }

    pub(super) async fn wait(&mut self) -> Result<Outcome> {
        if let Some(outcome) = self.outcome {
            return Ok(outcome);
        }

        let status = self.child.wait().await?;
        tracing::info!("Process {} exited with status: {}", self.pid, status);
        self.finish(Outcome::Exited(status.code())).await
    }

    /// SIGTERM, then SIGKILL once the kill timeout has passed
    pub(super) async fn stop(&mut self, name: &str) -> Result<Outcome> {
        if let Some(outcome) = self.outcome {
            return Ok(outcome);
        }

        self.send_terminate(name)?;

        tracing::debug!(
            "Waiting {:?} for process {} to exit gracefully",
            self.kill_timeout,
            name
        );

        let status = match tokio::time::timeout(self.kill_timeout, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!("Process {} exited gracefully with status: {}", name, status);
                status
            }
            Ok(Err(e)) => {
                return Err(LaunchError::StopError(
                    name.to_string(),
                    format!("Wait failed: {}", e),
                ));
            }
            Err(_) => {
                tracing::warn!(
                    "Process {} did not exit within {:?}, sending SIGKILL",
                    name,
                    self.kill_timeout
                );
                self.child.kill().await.map_err(|e| {
                    LaunchError::StopError(
                        name.to_string(),
                        format!("Failed to send SIGKILL after timeout: {}", e),
                    )
                })?;
                self.child.wait().await?
            }
        };

        self.finish(Outcome::Exited(status.code())).await
    }

    #[cfg(unix)]
    fn send_terminate(&mut self, name: &str) -> Result<()> {
        use nix::errno::Errno;
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        tracing::info!("Gracefully stopping process {} (PID: {}) with SIGTERM", name, self.pid);

        match signal::kill(Pid::from_raw(self.pid as i32), Signal::SIGTERM) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(LaunchError::StopError(
                name.to_string(),
                format!("Failed to send SIGTERM: {}", e),
            )),
        }
    }

    #[cfg(not(unix))]
    fn send_terminate(&mut self, name: &str) -> Result<()> {
        tracing::info!("Stopping process {} (PID: {})", name, self.pid);
        self.child.start_kill().map_err(|e| {
            LaunchError::StopError(name.to_string(), format!("Failed to kill: {}", e))
        })
    }

    async fn finish(&mut self, outcome: Outcome) -> Result<Outcome> {
        for mut pump in self.pumps.drain(..) {
            match tokio::time::timeout(DRAIN_TIMEOUT, &mut pump).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => tracing::warn!("Log capture for PID {} failed: {}", self.pid, e),
                Ok(Err(e)) => tracing::warn!("Log capture task for PID {} ended abnormally: {}", self.pid, e),
                Err(_) => {
                    tracing::warn!("Output of PID {} still open after exit; detaching", self.pid);
                    pump.abort();
                }
            }
        }

        self.sink.lock().await.flush().await?;
        self.outcome = Some(outcome);
        Ok(outcome)
    }
}

/// Copy one output stream into the sink, line by line
async fn pump<R>(reader: R, stream: Stream, sink: Arc<Mutex<LogSink>>) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();

    loop {
        line.clear();
        let read = reader.read_until(b'\n', &mut line).await?;
        if read == 0 {
            return Ok(());
        }
        sink.lock().await.write_line(stream, &line).await?;
    }
}
