//! 每目的地一条的写线程。
//!
//! 状态机：`Idle`（等待队列）→ `Writing`（写一个任务）→ `Idle` | `Stopped`。
//! 取任务时持锁，真正写出时不持锁，因此同一目的地的新提交不会被进行中的写阻塞。
//! 后端在写调用中 panic 时，该任务按写失败处理：无论如何都会执行 `complete`，
//! 否则其地址会永久留在在途集合中，`sync` 与停机随之挂起。

use std::{
    io,
    panic::{self, AssertUnwindSafe},
    slice,
    sync::Arc,
    thread,
};

use tracing::{debug, info_span, warn};

use crate::{
    backend::{WriteBackend, WriteOutcome, write_chunked},
    config::PipeConfig,
    destination::DestinationSlot,
    key::Job,
};

/// 为 `slot` 创建写线程。
pub(crate) fn spawn(
    slot: Arc<DestinationSlot>,
    backend: Arc<dyn WriteBackend>,
    config: &PipeConfig,
) -> io::Result<thread::JoinHandle<()>> {
    let chunk_size = config.chunk_size();
    thread::Builder::new()
        .name(config.thread_name(slot.destination().as_raw()))
        .spawn(move || run(&slot, backend.as_ref(), chunk_size))
}

fn run(slot: &DestinationSlot, backend: &dyn WriteBackend, chunk_size: usize) {
    let destination = slot.destination();
    let span = info_span!("spark_pipe.writer", %destination);
    let _entered = span.enter();
    debug!("writer started");

    while let Some(job) = slot.next_job() {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            write_job(backend, slot, &job, chunk_size)
        }))
        .unwrap_or_else(|_| panicked_outcome());
        if let Some(err) = &outcome.error {
            warn!(
                address = %job.address,
                len = job.len,
                written = outcome.written,
                error = %err,
                "write aborted, dropping remaining bytes"
            );
        } else {
            debug!(address = %job.address, len = job.len, "job written");
        }
        slot.complete(&job, &outcome);
    }

    debug!("writer stopped");
}

/// 后端 panic 时无法得知已交付的字节数，整个任务按丢弃计。
fn panicked_outcome() -> WriteOutcome {
    WriteOutcome {
        written: 0,
        error: Some(io::Error::other("write backend panicked")),
    }
}

fn write_job(
    backend: &dyn WriteBackend,
    slot: &DestinationSlot,
    job: &Job,
    chunk_size: usize,
) -> WriteOutcome {
    if job.len == 0 {
        return WriteOutcome {
            written: 0,
            error: None,
        };
    }

    // SAFETY: `Engine::submit` 的调用方保证 `[address, address + len)` 在任务完成被观测前
    // 一直有效且不被修改；任务只有在 `complete` 之后才会被视为完成。
    let bytes = unsafe { slice::from_raw_parts(job.address.as_ptr(), job.len) };
    write_chunked(backend, slot.destination(), bytes, chunk_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        key::{BufferAddr, Destination},
        test_util::{FailingBackend, PanickingBackend, RecordingBackend},
    };

    const FD: Destination = Destination::from_raw(21);
    const FRAME: &[u8; 20] = b"0123456789abcdefghij";

    /// 在当前线程上运行写循环：先入队，再令写线程进入停止态，`run` 排空后返回。
    fn drain_inline(backend: &dyn WriteBackend, slot: &DestinationSlot, chunk_size: usize) {
        slot.stop_writer();
        run(slot, backend, chunk_size);
    }

    #[test]
    fn writer_streams_job_in_chunks() {
        let backend = RecordingBackend::new();
        let slot = DestinationSlot::new(FD);
        slot.enqueue(BufferAddr::from(FRAME), FRAME.len())
            .expect("提交");

        drain_inline(&backend, &slot, 8);

        assert_eq!(backend.bytes(FD), FRAME);
        assert_eq!(backend.chunk_sizes(FD), [8, 8, 4]);
        assert_eq!(slot.snapshot().bytes_written, 20);
    }

    #[tracing_test::traced_test]
    #[test]
    fn aborted_write_is_logged_and_counted() {
        let backend = FailingBackend::after(5);
        let slot = DestinationSlot::new(FD);
        slot.enqueue(BufferAddr::from(FRAME), FRAME.len())
            .expect("提交");

        drain_inline(&backend, &slot, 4096);

        let stats = slot.snapshot();
        assert_eq!(stats.jobs_completed, 1);
        assert_eq!(stats.jobs_failed, 1);
        assert_eq!(stats.bytes_written, 5);
        assert_eq!(stats.bytes_dropped, 15);
        assert_eq!(stats.in_flight, 0);
        assert_eq!(backend.recording().bytes(FD), b"01234");
        assert!(logs_contain("write aborted, dropping remaining bytes"));
    }

    #[tracing_test::traced_test]
    #[test]
    fn panicking_backend_still_completes_the_job() {
        let backend = PanickingBackend::new();
        let slot = DestinationSlot::new(FD);
        let seq = slot
            .enqueue(BufferAddr::from(FRAME), FRAME.len())
            .expect("提交");

        drain_inline(&backend, &slot, 4096);

        assert!(slot.is_seq_complete(seq), "后端 panic 后任务仍须完成");
        let stats = slot.snapshot();
        assert_eq!(stats.jobs_failed, 1);
        assert_eq!(stats.bytes_written, 0);
        assert_eq!(stats.bytes_dropped, 20);
        assert_eq!(stats.in_flight, 0);
        assert!(logs_contain("write backend panicked"));
    }
}
