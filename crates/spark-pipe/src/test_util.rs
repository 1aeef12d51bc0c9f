//! 内存版写入后端，供测试与基准复用。
//!
//! # 教案式说明
//! - **意图 (Why)**：引擎的顺序、背压与停机契约都需要在不依赖真实子进程的情况下被确定性地观测。
//! - **逻辑 (How)**：
//!   - [`RecordingBackend`]：按目的地录制字节与每次写调用的分块长度；
//!   - [`GatedBackend`]：写调用在闸门关闭时阻塞，测试可据此“冻结”写线程，观察提交方的阻塞行为；
//!   - [`FailingBackend`]：每个目的地接受前 `limit` 个字节，随后返回 `BrokenPipe`；
//!   - [`PanickingBackend`]：每次写调用都 panic，验证写线程在后端失控时仍能完成任务；
//!   - [`DiscardBackend`]：只计数不保存，用于基准。
//! - **契约 (What)**：全部实现满足 [`WriteBackend`] 的阻塞语义，可在多个写线程间共享。

use std::{
    collections::HashMap,
    io,
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};

use crate::{backend::WriteBackend, key::Destination};

#[derive(Default)]
struct Recording {
    bytes: HashMap<Destination, Vec<u8>>,
    chunks: HashMap<Destination, Vec<usize>>,
}

/// 录制全部写入的后端。
#[derive(Default)]
pub struct RecordingBackend {
    recording: Mutex<Recording>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// 目的地收到的全部字节（按写入顺序拼接）。
    pub fn bytes(&self, destination: Destination) -> Vec<u8> {
        self.recording
            .lock()
            .bytes
            .get(&destination)
            .cloned()
            .unwrap_or_default()
    }

    /// 目的地上每次写调用的分块长度。
    pub fn chunk_sizes(&self, destination: Destination) -> Vec<usize> {
        self.recording
            .lock()
            .chunks
            .get(&destination)
            .cloned()
            .unwrap_or_default()
    }

    fn record(&self, destination: Destination, chunk: &[u8]) {
        let mut recording = self.recording.lock();
        recording
            .bytes
            .entry(destination)
            .or_default()
            .extend_from_slice(chunk);
        recording
            .chunks
            .entry(destination)
            .or_default()
            .push(chunk.len());
    }
}

impl WriteBackend for RecordingBackend {
    fn write(&self, destination: Destination, chunk: &[u8]) -> io::Result<usize> {
        self.record(destination, chunk);
        Ok(chunk.len())
    }
}

#[derive(Default)]
struct GateState {
    open: bool,
    blocked: usize,
}

/// 闸门后端：闸门关闭时写调用阻塞，打开后把数据交给内部的 [`RecordingBackend`]。
pub struct GatedBackend {
    inner: RecordingBackend,
    gate: Mutex<GateState>,
    changed: Condvar,
}

impl GatedBackend {
    /// 以关闭状态创建。
    pub fn closed() -> Self {
        Self {
            inner: RecordingBackend::new(),
            gate: Mutex::new(GateState::default()),
            changed: Condvar::new(),
        }
    }

    pub fn open(&self) {
        self.gate.lock().open = true;
        self.changed.notify_all();
    }

    /// 等待至少 `count` 个写调用阻塞在闸门上；超时返回 `false`。
    pub fn wait_blocked(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut gate = self.gate.lock();
        while gate.blocked < count {
            if self.changed.wait_until(&mut gate, deadline).timed_out() {
                return gate.blocked >= count;
            }
        }
        true
    }

    pub fn recording(&self) -> &RecordingBackend {
        &self.inner
    }
}

impl WriteBackend for GatedBackend {
    fn write(&self, destination: Destination, chunk: &[u8]) -> io::Result<usize> {
        {
            let mut gate = self.gate.lock();
            if !gate.open {
                gate.blocked += 1;
                self.changed.notify_all();
                self.changed.wait_while(&mut gate, |gate| !gate.open);
                gate.blocked -= 1;
            }
        }
        self.inner.write(destination, chunk)
    }
}

/// 每个目的地写满 `limit` 字节后返回 `BrokenPipe`，模拟下游进程关闭读端。
pub struct FailingBackend {
    inner: RecordingBackend,
    limit: usize,
}

impl FailingBackend {
    pub fn after(limit: usize) -> Self {
        Self {
            inner: RecordingBackend::new(),
            limit,
        }
    }

    pub fn recording(&self) -> &RecordingBackend {
        &self.inner
    }
}

impl WriteBackend for FailingBackend {
    fn write(&self, destination: Destination, chunk: &[u8]) -> io::Result<usize> {
        let accepted = self.inner.bytes(destination).len();
        let room = self.limit.saturating_sub(accepted);
        if room == 0 {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        let take = room.min(chunk.len());
        self.inner.write(destination, &chunk[..take])
    }
}

/// 每次写调用都 panic 的后端。
#[derive(Default)]
pub struct PanickingBackend {
    calls: AtomicU64,
}

impl PanickingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl WriteBackend for PanickingBackend {
    fn write(&self, destination: Destination, _chunk: &[u8]) -> io::Result<usize> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        panic!("backend for {destination} panicked mid-write");
    }
}

/// 丢弃全部字节、只累计计数的后端。
#[derive(Default)]
pub struct DiscardBackend {
    written: AtomicU64,
}

impl DiscardBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }
}

impl WriteBackend for DiscardBackend {
    fn write(&self, _destination: Destination, chunk: &[u8]) -> io::Result<usize> {
        self.written
            .fetch_add(chunk.len() as u64, Ordering::Relaxed);
        Ok(chunk.len())
    }
}
