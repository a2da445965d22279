//! Command buffers and streams.
//!
//! Commands are closures tagged with a [`CommandKind`]. A [`CommandBuffer`]
//! queues them; nothing becomes observable until [`CommandBuffer::commit`]
//! executes the queue in enqueue order. A stream can optionally record every
//! executed command and commit point for inspection.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

use super::Device;
use crate::util::Result;

/// What a command does, for logging and statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    BufferUpload { buffer: u64, bytes: usize },
    TextureUpload { texture: u64, texels: usize },
    MeshBuild { mesh: u64, triangles: usize },
    AccelBuild { accel: u64, instances: usize },
    AccelUpdate { accel: u64 },
    BindlessUpdate { buffers: usize, textures: usize, volumes: usize },
}

/// A deferred device operation.
pub struct Command {
    kind: CommandKind,
    action: Box<dyn FnOnce() -> Result<()> + Send>,
}

impl Command {
    pub(crate) fn new(kind: CommandKind, action: impl FnOnce() -> Result<()> + Send + 'static) -> Self {
        Self {
            kind,
            action: Box::new(action),
        }
    }

    /// Kind of this command.
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// Execute immediately, bypassing any stream.
    pub(crate) fn run(self) -> Result<()> {
        (self.action)()
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Command").field(&self.kind).finish()
    }
}

/// Entry of a stream's execution log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEvent {
    Executed(CommandKind),
    Commit,
}

struct StreamInner {
    device: Device,
    recording: Mutex<Option<Vec<StreamEvent>>>,
}

/// In-order command queue of a device.
#[derive(Clone)]
pub struct Stream {
    inner: Arc<StreamInner>,
}

impl Stream {
    pub(crate) fn new(device: Device) -> Self {
        Self {
            inner: Arc::new(StreamInner {
                device,
                recording: Mutex::new(None),
            }),
        }
    }

    /// Device this stream submits to.
    pub fn device(&self) -> &Device {
        &self.inner.device
    }

    /// New empty command buffer bound to this stream.
    pub fn command_buffer(&self) -> CommandBuffer {
        CommandBuffer {
            stream: self.clone(),
            pending: Vec::new(),
        }
    }

    /// Start or stop recording executed commands.
    pub fn set_recording(&self, enabled: bool) {
        let mut recording = self.inner.recording.lock();
        match (enabled, recording.is_some()) {
            (true, false) => *recording = Some(Vec::new()),
            (false, true) => *recording = None,
            _ => {}
        }
    }

    /// Events recorded so far (empty when not recording).
    pub fn events(&self) -> Vec<StreamEvent> {
        self.inner.recording.lock().clone().unwrap_or_default()
    }

    /// Drop recorded events, keep recording.
    pub fn clear_events(&self) {
        if let Some(events) = self.inner.recording.lock().as_mut() {
            events.clear();
        }
    }

    fn record(&self, event: StreamEvent) {
        if let Some(events) = self.inner.recording.lock().as_mut() {
            events.push(event);
        }
    }

    fn execute(&self, commands: Vec<Command>) -> Result<()> {
        let stats = self.inner.device.stats_counters();
        for command in commands {
            let kind = command.kind;
            command.run()?;
            stats.count(kind);
            self.record(StreamEvent::Executed(kind));
        }
        stats.count_commit();
        self.record(StreamEvent::Commit);
        Ok(())
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream").finish_non_exhaustive()
    }
}

/// Commands queued for one submission.
pub struct CommandBuffer {
    stream: Stream,
    pending: Vec<Command>,
}

impl CommandBuffer {
    /// Queue a command.
    pub fn push(&mut self, command: Command) -> &mut Self {
        self.pending.push(command);
        self
    }

    /// Number of queued, not yet executed commands.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Stream this buffer submits to.
    pub fn stream(&self) -> &Stream {
        &self.stream
    }

    /// Execute everything queued so far, in order.
    ///
    /// On error the remaining commands of this batch are discarded.
    pub fn commit(&mut self) -> Result<()> {
        let commands = std::mem::take(&mut self.pending);
        self.stream.execute(commands)
    }
}

impl Drop for CommandBuffer {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            if let Err(err) = self.commit() {
                tracing::error!("implicit commit of dropped command buffer failed: {err}");
            }
        }
    }
}

impl fmt::Debug for CommandBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandBuffer")
            .field("pending", &self.pending.len())
            .finish()
    }
}
