//! `fd_backend` 集成测试：通过真实文件描述符（Unix 域套接字对）验证写出结果。
#![cfg(unix)]

use std::{
    io::{self, Read},
    os::unix::net::UnixStream,
    thread,
};

use spark_pipe::{Destination, Engine, FdBackend, PipeConfig, WriteBackend};

#[test]
fn bytes_reach_the_descriptor_in_order() {
    let (writer, mut reader) = UnixStream::pair().expect("创建套接字对");
    let engine = Engine::new(FdBackend);
    let destination = Destination::of(&writer);

    let frames: Vec<Vec<u8>> = (0..3u8).map(|i| vec![i + 1; 5000]).collect();
    for frame in &frames {
        // SAFETY: `frames` 在下方 `sync` 之前保持存活且不被修改。
        unsafe { engine.submit(frame.as_ptr(), frame.len(), destination) }.expect("提交");
    }
    engine.sync(None);

    let mut received = vec![0u8; 15_000];
    reader.read_exact(&mut received).expect("读取写出的字节");
    assert_eq!(received, frames.concat());
    drop(writer);
}

/// 超过套接字缓冲容量的大帧：写线程分块阻塞写出，读端并发消费。
#[test]
fn large_frame_is_streamed_in_chunks() {
    const FRAME_LEN: usize = 1920 * 1080 * 3;

    let (writer, mut reader) = UnixStream::pair().expect("创建套接字对");
    let consumer = thread::spawn(move || {
        let mut received = Vec::with_capacity(FRAME_LEN);
        reader.read_to_end(&mut received).expect("读取到 EOF");
        received
    });

    let engine = Engine::with_config(PipeConfig::new().with_chunk_size(64 * 1024), FdBackend)
        .expect("合法配置");
    let frame: Vec<u8> = (0..FRAME_LEN).map(|i| (i % 251) as u8).collect();
    let destination = Destination::of(&writer);

    // SAFETY: `frame` 在 `sync` 返回前保持存活且不被修改。
    let ticket = unsafe { engine.submit(frame.as_ptr(), frame.len(), destination) }.expect("提交");
    engine.sync(None);
    assert!(ticket.is_complete());

    let stats = engine.stats(destination).expect("目的地已注册");
    assert_eq!(stats.bytes_written, FRAME_LEN as u64);
    assert_eq!(stats.jobs_failed, 0);

    engine.shutdown();
    // 引擎不关闭句柄：由调用方关闭写端，读端随后读到 EOF。
    drop(writer);
    let received = consumer.join().expect("读线程不应 panic");
    assert_eq!(received, frame);
}

/// 读端关闭后写入失败：剩余字节被丢弃，任务仍视为完成，`sync` 正常返回。
#[test]
fn broken_destination_drops_bytes_silently() {
    let (writer, reader) = UnixStream::pair().expect("创建套接字对");
    drop(reader);

    let engine = Engine::new(FdBackend);
    let destination = Destination::of(&writer);
    let frame = vec![7u8; 10_000];

    // SAFETY: `frame` 在 `sync` 返回前保持存活且不被修改。
    let ticket = unsafe { engine.submit(frame.as_ptr(), frame.len(), destination) }.expect("提交");
    engine.sync(None);

    assert!(ticket.is_complete());
    let stats = engine.stats(destination).expect("目的地已注册");
    assert_eq!(stats.jobs_failed, 1);
    assert_eq!(stats.jobs_completed, 1);
    assert_eq!(stats.bytes_written + stats.bytes_dropped, 10_000);
    assert_eq!(stats.in_flight, 0);
    drop(writer);
}

/// Rust 测试进程忽略 `SIGPIPE`：读端关闭后的写调用以 `BrokenPipe` 返回，而不是终止进程。
#[test]
fn closed_reader_surfaces_broken_pipe() {
    let (writer, reader) = UnixStream::pair().expect("创建套接字对");
    drop(reader);

    let err = FdBackend
        .write(Destination::of(&writer), b"orphaned")
        .expect_err("读端已关闭");
    assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    drop(writer);
}
