//! Child process transport for console engines
//!
//! The child is spawned lazily on the first write or read. A single
//! background reader task owns the `Child`, drains its stdout and stderr
//! into a [`BufferedChannel`], and is the only place that observes the
//! process exiting. `kill` hands the termination request to that task and
//! joins it, so no reader outlives its transport.

use crate::channel::BufferedChannel;
use async_trait::async_trait;
use relay_core::{EngineConfig, RelayError, Result};
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Source of engine output batches for the expect matcher
#[async_trait]
pub trait LineSource: Send + Sync {
    /// Next non-empty batch of lines, `None` once the producer is gone
    async fn next_batch(&self) -> Option<Vec<String>>;
}

#[async_trait]
impl LineSource for BufferedChannel {
    async fn next_batch(&self) -> Option<Vec<String>> {
        self.drain().await
    }
}

struct Running {
    stdin: ChildStdin,
    kill_tx: oneshot::Sender<()>,
    reader: JoinHandle<()>,
}

enum State {
    Idle,
    Running(Running),
    Ended,
}

/// One engine child process and its background pipe reader
pub struct ProcessTransport {
    config: EngineConfig,
    startup: Vec<String>,
    channel: Arc<BufferedChannel>,
    alive: Arc<AtomicBool>,
    /// Set by the reader task right before it closes the channel
    reader_done: Arc<AtomicBool>,
    state: Mutex<State>,
}

impl ProcessTransport {
    /// Create a transport; nothing is spawned until the first IO request
    pub fn new(config: EngineConfig) -> Self {
        Self::with_startup(config, Vec::new())
    }

    /// Create a transport that sends `startup` commands right after spawning
    pub fn with_startup(config: EngineConfig, startup: Vec<String>) -> Self {
        Self {
            config,
            startup,
            channel: Arc::new(BufferedChannel::new()),
            alive: Arc::new(AtomicBool::new(false)),
            reader_done: Arc::new(AtomicBool::new(false)),
            state: Mutex::new(State::Idle),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// True iff the process has been started and has not exited
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Whether the background reader task has been started and not exited
    pub async fn is_reader_running(&self) -> bool {
        match &*self.state.lock().await {
            State::Idle => false,
            _ => !self.reader_done.load(Ordering::SeqCst),
        }
    }

    /// Send one line to the engine
    pub async fn write(&self, text: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let running = self.ensure_started(&mut state).await?;
        send_line(&mut running.stdin, text).await
    }

    /// Wait for output collected since the last read.
    /// `Ok(None)` means the process is gone and its output consumed.
    pub async fn read(&self) -> Result<Option<Vec<String>>> {
        {
            let mut state = self.state.lock().await;
            if matches!(*state, State::Idle) {
                self.ensure_started(&mut state).await?;
            }
        }
        Ok(self.channel.drain().await)
    }

    /// Discard unread output. Bytes still in the OS pipe will surface on
    /// the next reader wake-up.
    pub fn reset(&self) {
        self.channel.reset();
    }

    /// Terminate the process and wait for the reader task to exit
    pub async fn kill(&self) {
        let previous = std::mem::replace(&mut *self.state.lock().await, State::Ended);
        let State::Running(running) = previous else {
            return;
        };

        let Running {
            stdin,
            kill_tx,
            reader,
        } = running;
        drop(stdin);
        // The reader may already have seen the process exit.
        let _ = kill_tx.send(());
        if let Err(e) = reader.await {
            error!("Pipe reader for {} panicked: {}", self.program(), e);
        }
        info!("Engine {} terminated", self.program());
    }

    fn program(&self) -> std::path::Display<'_> {
        self.config.program.display()
    }

    async fn ensure_started<'a>(&self, state: &'a mut State) -> Result<&'a mut Running> {
        if matches!(*state, State::Idle) {
            *state = State::Running(self.spawn().await?);
        }
        match state {
            State::Running(running) => Ok(running),
            _ => Err(RelayError::ProcessTerminated),
        }
    }

    async fn spawn(&self) -> Result<Running> {
        let mut child = Command::new(&self.config.program)
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                error!("Failed to spawn {}: {}", self.program(), e);
                RelayError::Spawn(format!("{}: {}", self.program(), e))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| RelayError::Spawn("No stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RelayError::Spawn("No stdout".into()))?;
        let stderr = child.stderr.take();

        info!(
            "Started engine {} (pid {:?})",
            self.program(),
            child.id()
        );

        self.alive.store(true, Ordering::SeqCst);
        let (kill_tx, kill_rx) = oneshot::channel();
        let reader = tokio::spawn(pipe_reader(
            child,
            PipeLines::new(stdout),
            stderr.map(PipeLines::new),
            self.channel.clone(),
            self.alive.clone(),
            self.reader_done.clone(),
            kill_rx,
            self.config.partial_line_flush(),
        ));

        for command in &self.startup {
            send_line(&mut stdin, command).await?;
        }

        Ok(Running {
            stdin,
            kill_tx,
            reader,
        })
    }
}

#[async_trait]
impl LineSource for ProcessTransport {
    async fn next_batch(&self) -> Option<Vec<String>> {
        match self.read().await {
            Ok(batch) => batch,
            Err(e) => {
                warn!("Engine output unavailable: {}", e);
                None
            }
        }
    }
}

async fn send_line(stdin: &mut ChildStdin, text: &str) -> Result<()> {
    debug!("[relay→engine] {}", text);
    stdin.write_all(text.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await?;
    Ok(())
}

/// Splits raw pipe bytes into lines, keeping an unterminated tail
#[derive(Debug, Default)]
struct LineSplitter {
    partial: Vec<u8>,
}

impl LineSplitter {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in bytes {
            if byte == b'\n' {
                let line = std::mem::take(&mut self.partial);
                lines.push(decode(&line));
            } else {
                self.partial.push(byte);
            }
        }
        lines
    }

    fn has_partial(&self) -> bool {
        !self.partial.is_empty()
    }

    fn take_partial(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.partial);
        Some(decode(&line))
    }
}

fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\r')
        .to_string()
}

/// One output pipe of the child
struct PipeLines<R> {
    pipe: R,
    buf: Vec<u8>,
    splitter: LineSplitter,
    done: bool,
}

impl<R: AsyncRead + Unpin> PipeLines<R> {
    fn new(pipe: R) -> Self {
        Self {
            pipe,
            buf: vec![0; 4096],
            splitter: LineSplitter::default(),
            done: false,
        }
    }

    /// Read whatever is available; pipe closure ends the stream
    async fn next_lines(&mut self) -> Vec<String> {
        match self.pipe.read(&mut self.buf).await {
            Ok(0) => {
                self.done = true;
                Vec::new()
            }
            Ok(n) => self.splitter.push(&self.buf[..n]),
            Err(e) => {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    warn!("Engine pipe read failed: {}", e);
                }
                self.done = true;
                Vec::new()
            }
        }
    }

    /// Collect output written before the process exited
    async fn drain_remaining(&mut self, quiet: Duration) -> Vec<String> {
        let mut lines = Vec::new();
        while !self.done {
            match tokio::time::timeout(quiet, self.next_lines()).await {
                Ok(batch) => lines.extend(batch),
                Err(_) => break,
            }
        }
        lines.extend(self.splitter.take_partial());
        lines
    }
}

async fn next_from<R: AsyncRead + Unpin>(pipe: &mut Option<PipeLines<R>>) -> Vec<String> {
    match pipe {
        Some(pipe) if !pipe.done => pipe.next_lines().await,
        _ => std::future::pending().await,
    }
}

fn publish(channel: &BufferedChannel, lines: Vec<String>) {
    if !lines.is_empty() {
        debug!("[engine→relay] {:?}", lines);
        channel.append(lines);
    }
}

async fn pipe_reader<O, E>(
    mut child: Child,
    mut stdout: PipeLines<O>,
    mut stderr: Option<PipeLines<E>>,
    channel: Arc<BufferedChannel>,
    alive: Arc<AtomicBool>,
    done: Arc<AtomicBool>,
    mut kill_rx: oneshot::Receiver<()>,
    partial_flush: Duration,
) where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut killed = false;

    loop {
        let stderr_open = stderr.as_ref().is_some_and(|p| !p.done);
        let has_partial = stdout.splitter.has_partial()
            || stderr.as_ref().is_some_and(|p| p.splitter.has_partial());

        tokio::select! {
            // Kill request, or the transport was dropped
            _ = &mut kill_rx => {
                killed = true;
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill engine: {}", e);
                }
                break;
            }

            status = child.wait() => {
                match status {
                    Ok(status) => info!("Engine exited: {}", status),
                    Err(e) => warn!("Failed to wait for engine: {}", e),
                }
                break;
            }

            lines = stdout.next_lines(), if !stdout.done => {
                publish(&channel, lines);
            }

            lines = next_from(&mut stderr), if stderr_open => {
                publish(&channel, lines);
            }

            // Prompts are printed without a newline
            _ = tokio::time::sleep(partial_flush), if has_partial => {
                let mut tail: Vec<String> = stdout.splitter.take_partial().into_iter().collect();
                if let Some(pipe) = stderr.as_mut() {
                    tail.extend(pipe.splitter.take_partial());
                }
                publish(&channel, tail);
            }
        }
    }

    alive.store(false, Ordering::SeqCst);

    if !killed {
        let mut rest = stdout.drain_remaining(partial_flush).await;
        if let Some(pipe) = stderr.as_mut() {
            rest.extend(pipe.drain_remaining(partial_flush).await);
        }
        publish(&channel, rest);
    }

    done.store(true, Ordering::SeqCst);
    channel.close();
    debug!("Pipe reader exiting");
}
