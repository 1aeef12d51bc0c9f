//! `backpressure` 集成测试：同一内存区域在途时的去重阻塞。
//!
//! # 测试目标（Why）
//! - 同一地址向同一目的地的第二次提交，必须等第一次写入完全落地才能返回；
//! - 阻塞只针对“同一目的地上的同一地址”，其它地址、其它目的地不受影响。
//!
//! # 步骤说明（How）
//! - 以关闭的 [`GatedBackend`] 冻结写线程，使第一次写入确定性地停留在途；
//! - 通过 `mpsc` 通道观察提交线程是否在观察窗口内返回。

mod support;

use std::{
    sync::{Arc, mpsc},
    thread,
};

use spark_pipe::{BufferAddr, BufferKey, Destination, Engine, test_util::GatedBackend};
use support::{BLOCK_WINDOW, PATIENCE, leak_pattern};

const FD1: Destination = Destination::from_raw(201);
const FD2: Destination = Destination::from_raw(202);

/// 再次提交 A 会阻塞，直到第一次 A 的字节全部写出。
#[test]
fn resubmitting_in_flight_buffer_blocks_until_written() {
    let backend = Arc::new(GatedBackend::closed());
    let engine = Engine::new(Arc::clone(&backend));
    let frame = leak_pattern(0x33, 64);

    let first = engine.submit_slice(frame, FD1).expect("首次提交");
    assert!(backend.wait_blocked(1, PATIENCE), "写线程应阻塞在首个任务上");

    let (returned_tx, returned_rx) = mpsc::channel();
    let resubmit = {
        let engine = engine.clone();
        let backend = Arc::clone(&backend);
        thread::spawn(move || {
            let ticket = engine.submit_slice(frame, FD1).expect("第二次提交");
            // 返回瞬间首个任务的字节必须已经完整落地。
            let delivered = backend.recording().bytes(FD1).len();
            let _ = returned_tx.send(());
            (ticket, delivered)
        })
    };

    assert!(
        returned_rx.recv_timeout(BLOCK_WINDOW).is_err(),
        "首个任务仍在途时第二次提交不得返回"
    );
    assert!(!first.is_complete());
    assert_eq!(
        engine.stats(FD1).expect("目的地已注册").jobs_submitted,
        1,
        "被阻塞的提交尚未入队"
    );

    backend.open();
    let (second, delivered) = resubmit.join().expect("提交线程不应 panic");
    assert!(first.is_complete(), "第二次提交返回时首个任务必须已完成");
    assert_eq!(delivered, frame.len());
    assert!(second.sequence() > first.sequence());

    engine.sync(None);
    assert_eq!(backend.recording().bytes(FD1), [frame, frame].concat());
}

/// 不同地址、不同目的地上的同一地址都不会被阻塞。
#[test]
fn unrelated_submissions_do_not_wait() {
    let backend = Arc::new(GatedBackend::closed());
    let engine = Engine::new(Arc::clone(&backend));
    let a = leak_pattern(0x01, 32);
    let b = leak_pattern(0x02, 32);

    engine.submit_slice(a, FD1).expect("提交 A");
    assert!(backend.wait_blocked(1, PATIENCE));

    let (done_tx, done_rx) = mpsc::channel();
    let submitter = {
        let engine = engine.clone();
        thread::spawn(move || {
            engine.submit_slice(b, FD1).expect("同目的地不同地址");
            engine.submit_slice(a, FD2).expect("不同目的地同一地址");
            let _ = done_tx.send(());
        })
    };

    assert!(
        done_rx.recv_timeout(PATIENCE).is_ok(),
        "无冲突的提交必须立即返回"
    );
    submitter.join().expect("提交线程不应 panic");

    let stats = engine.stats(FD1).expect("目的地已注册");
    assert_eq!(stats.jobs_submitted, 2);
    assert_eq!(stats.in_flight, 2);

    backend.open();
    engine.sync(None);
    assert_eq!(backend.recording().bytes(FD1), [a, b].concat());
    assert_eq!(backend.recording().bytes(FD2), a);
}

/// 被阻塞的提交方只会在自己的目的地上等待，期间其它目的地的提交与排空照常进行。
#[test]
fn blocked_submitter_does_not_stall_other_destinations() {
    let backend = Arc::new(GatedBackend::closed());
    let engine = Engine::new(Arc::clone(&backend));
    let frame = leak_pattern(0x77, 16);

    engine.submit_slice(frame, FD1).expect("首次提交");
    assert!(backend.wait_blocked(1, PATIENCE));

    let blocked = {
        let engine = engine.clone();
        thread::spawn(move || engine.submit_slice(frame, FD1).map(|ticket| ticket.key()))
    };

    // 目的地 FD2 完全独立：提交立即返回，且只要闸门打开即可排空。
    let other = leak_pattern(0x88, 8);
    let ticket = engine.submit_slice(other, FD2).expect("FD2 提交");
    assert_eq!(
        ticket.key(),
        BufferKey::new(FD2, BufferAddr::from(other)),
        "凭据应携带复合键"
    );

    backend.open();
    ticket.wait();
    let key = blocked
        .join()
        .expect("提交线程不应 panic")
        .expect("首个任务完成后应入队成功");
    assert_eq!(key, BufferKey::new(FD1, BufferAddr::from(frame)));

    engine.sync(None);
    assert_eq!(backend.recording().bytes(FD1), [frame, frame].concat());
    assert_eq!(backend.recording().bytes(FD2), other);
}
