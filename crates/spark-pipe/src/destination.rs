//! 单个目的地的共享状态：提交队列、在途集合与写线程句柄。
//!
//! # 教案式说明
//! - **意图 (Why)**：每个目的地的全部可变状态都收敛在一把锁之后，不同目的地之间不共享任何锁，
//!   从而 `submit`/`sync` 在不同目的地上天然互不阻塞。
//! - **逻辑 (How)**：
//!   - `work_ready`：写线程在队列为空时等待，新提交或停机时被唤醒；
//!   - `progress`：任务完成、停止接收时广播，唤醒被去重阻塞的提交方、`sync` 等待方与 [`crate::Ticket`]；
//!   - 在途集合与队列同锁更新，保证“地址在集合中 ⇔ 存在尚未写完的任务”。
//! - **契约 (What)**：
//!   - 同一地址在同一目的地上至多一个在途任务；
//!   - 写线程仅在 `running == false` 且队列为空时退出；
//!   - `accepting == false` 之后的提交一律被拒绝，且不产生任何副作用。

use std::{
    collections::{HashSet, VecDeque},
    thread::JoinHandle,
};

use tracing::{debug, warn};

use crate::{
    backend::WriteOutcome,
    error::PipeError,
    key::{BufferAddr, Destination, Job},
    sync::{Condvar, Mutex},
};

/// 目的地统计快照。
///
/// 字段均为累计值（`queued`/`in_flight` 除外，它们是取快照瞬间的即时值）。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DestinationStats {
    pub destination: Destination,
    pub jobs_submitted: u64,
    pub jobs_completed: u64,
    /// 因写错误提前终止的任务数（仍计入 `jobs_completed`）。
    pub jobs_failed: u64,
    pub bytes_written: u64,
    /// 写错误后被放弃的字节数。
    pub bytes_dropped: u64,
    pub queued: usize,
    pub in_flight: usize,
}

#[derive(Default)]
struct Counters {
    jobs_submitted: u64,
    jobs_completed: u64,
    jobs_failed: u64,
    bytes_written: u64,
    bytes_dropped: u64,
}

struct DestinationState {
    queue: VecDeque<Job>,
    in_flight: HashSet<BufferAddr>,
    /// 停机切换点：置为 `false` 后拒绝新提交。
    accepting: bool,
    /// 写线程存活标记：置为 `false` 且队列为空时写线程退出。
    running: bool,
    next_seq: u64,
    /// 最近一个完成任务的序号；序号从 1 开始，0 表示尚无完成。
    completed_seq: u64,
    counters: Counters,
}

/// 单个目的地的槽位；常规构建中仅在 crate 内可见，模型检查构建下导出供 Loom 测试驱动。
pub struct DestinationSlot {
    destination: Destination,
    state: Mutex<DestinationState>,
    work_ready: Condvar,
    progress: Condvar,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DestinationSlot {
    pub fn new(destination: Destination) -> Self {
        Self {
            destination,
            state: Mutex::new(DestinationState {
                queue: VecDeque::new(),
                in_flight: HashSet::new(),
                accepting: true,
                running: true,
                next_seq: 1,
                completed_seq: 0,
                counters: Counters::default(),
            }),
            work_ready: Condvar::new(),
            progress: Condvar::new(),
            worker: Mutex::new(None),
        }
    }

    pub(crate) fn destination(&self) -> Destination {
        self.destination
    }

    pub(crate) fn attach_worker(&self, handle: JoinHandle<()>) {
        *self.worker.lock() = Some(handle);
    }

    /// 入队一个任务，返回其序号。
    ///
    /// 若 `address` 已在途，则在本目的地的锁上等待其完成；等待期间不持有任何其它目的地的锁。
    /// 等待结束后若目的地已停止接收，返回 [`PipeError::EngineStopped`]。
    pub fn enqueue(&self, address: BufferAddr, len: usize) -> Result<u64, PipeError> {
        let mut state = self.state.lock();

        if state.accepting && state.in_flight.contains(&address) {
            debug!(
                destination = %self.destination,
                %address,
                "buffer still in flight, submitter waiting"
            );
            state = self.progress.wait_while(state, |state| {
                state.accepting && state.in_flight.contains(&address)
            });
        }

        if !state.accepting {
            return Err(PipeError::EngineStopped {
                destination: self.destination,
            });
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.queue.push_back(Job { address, len, seq });
        state.in_flight.insert(address);
        state.counters.jobs_submitted += 1;
        drop(state);

        self.work_ready.notify_one();
        Ok(seq)
    }

    /// 写线程取下一个任务；停机且队列为空时返回 `None`。
    pub fn next_job(&self) -> Option<Job> {
        let mut state = self.state.lock();
        loop {
            if let Some(job) = state.queue.pop_front() {
                return Some(job);
            }
            if !state.running {
                return None;
            }
            state = self.work_ready.wait(state);
        }
    }

    /// 写线程在任务结束（无论成功与否）后调用，释放在途标识并唤醒全部等待方。
    pub fn complete(&self, job: &Job, outcome: &WriteOutcome) {
        let mut state = self.state.lock();
        state.in_flight.remove(&job.address);
        state.completed_seq = job.seq;

        let written = outcome.written as u64;
        state.counters.jobs_completed += 1;
        state.counters.bytes_written += written;
        if outcome.error.is_some() {
            state.counters.jobs_failed += 1;
            state.counters.bytes_dropped += (job.len as u64).saturating_sub(written);
        }
        drop(state);

        self.progress.notify_all();
    }

    /// 等待在途集合清空。
    pub fn wait_idle(&self) {
        let state = self.state.lock();
        let _idle = self
            .progress
            .wait_while(state, |state| !state.in_flight.is_empty());
    }

    /// 等待指定地址离开在途集合；地址从未提交时立即返回。
    pub(crate) fn wait_released(&self, address: BufferAddr) {
        let state = self.state.lock();
        let _released = self
            .progress
            .wait_while(state, |state| state.in_flight.contains(&address));
    }

    /// 等待序号为 `seq` 的任务完成。
    pub fn wait_seq(&self, seq: u64) {
        let state = self.state.lock();
        let _done = self
            .progress
            .wait_while(state, |state| state.completed_seq < seq);
    }

    pub fn is_seq_complete(&self, seq: u64) -> bool {
        self.state.lock().completed_seq >= seq
    }

    /// 停机切换点：此后提交全部被拒绝，已被去重阻塞的提交方也会醒来并得到拒绝。
    pub fn close_intake(&self) {
        self.state.lock().accepting = false;
        self.progress.notify_all();
    }

    /// 通知写线程在排空队列后退出，并等待其结束。
    pub fn stop_writer(&self) {
        self.state.lock().running = false;
        self.work_ready.notify_all();

        let handle = self.worker.lock().take();
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            warn!(destination = %self.destination, "writer thread panicked");
        }
    }

    pub fn snapshot(&self) -> DestinationStats {
        let state = self.state.lock();
        DestinationStats {
            destination: self.destination,
            jobs_submitted: state.counters.jobs_submitted,
            jobs_completed: state.counters.jobs_completed,
            jobs_failed: state.counters.jobs_failed,
            bytes_written: state.counters.bytes_written,
            bytes_dropped: state.counters.bytes_dropped,
            queued: state.queue.len(),
            in_flight: state.in_flight.len(),
        }
    }
}
