//! 进程级引擎实例，供宿主语言绑定层在进程边界直接调用。
//!
//! # 教案式说明
//! - **意图 (Why)**：宿主语言的扩展模块通常只能暴露无状态函数；这里提供唯一的一个进程级实例，
//!   其余代码（包括测试）应当显式构造 [`Engine`]。
//! - **逻辑 (How)**：首次调用 [`engine`] 时以 [`PipeConfig::from_env`] 与 [`FdBackend`] 构造实例，
//!   并通过 `atexit` 注册退出钩子，保证调用方忘记 `shutdown` 时进程退出前仍会排空。
//! - **契约 (What)**：停机后实例不会被重建，后续 [`submit`] 返回 [`PipeError::EngineStopped`]；
//!   [`sync`]/[`shutdown`] 在实例尚未创建时直接返回，不会为此创建实例。
//!
//! # 风险与考量（Trade-offs）
//! - 退出钩子执行完整停机，会等待全部在途任务写完。若某个下游进程停止读取（管道写满且无人消费），
//!   写线程阻塞在 `write` 上，进程退出随之无限期挂起；宿主应在退出前先关闭或回收下游进程，
//!   或显式调用 [`shutdown`] 并自行处理超时。

#![cfg(unix)]

use std::sync::OnceLock;

use tracing::warn;

use crate::{
    Engine, PipeError, Ticket,
    backend::FdBackend,
    config::PipeConfig,
    key::{BufferAddr, Destination},
};

static ENGINE: OnceLock<Engine> = OnceLock::new();

/// 获取（必要时创建）进程级引擎。
pub fn engine() -> &'static Engine {
    ENGINE.get_or_init(|| {
        let engine = PipeConfig::from_env()
            .and_then(|config| Engine::with_config(config, FdBackend))
            .unwrap_or_else(|err| {
                warn!(error = %err, "invalid environment configuration, using defaults");
                Engine::new(FdBackend)
            });
        register_exit_hook();
        engine
    })
}

/// 经由进程级实例提交写入。
///
/// # Safety
/// 与 [`Engine::submit`] 相同：内存区域在写入完成被观测到之前必须保持有效且不被修改。
pub unsafe fn submit(
    address: *const u8,
    len: usize,
    destination: impl Into<Destination>,
) -> Result<Ticket, PipeError> {
    // SAFETY: 内存契约由调用方按本函数文档承担。
    unsafe { engine().submit(address, len, destination.into()) }
}

pub fn sync(address: Option<BufferAddr>) {
    if let Some(engine) = ENGINE.get() {
        engine.sync(address);
    }
}

pub fn shutdown() {
    if let Some(engine) = ENGINE.get() {
        engine.shutdown();
    }
}

extern "C" fn shutdown_at_exit() {
    shutdown();
}

fn register_exit_hook() {
    // SAFETY: `shutdown_at_exit` 是不会展开穿越 FFI 边界的 `extern "C"` 函数；
    // `shutdown` 本身不会 panic：锁不会中毒，后端 panic 在写线程内被捕获并按写失败完成任务。
    let rc = unsafe { libc::atexit(shutdown_at_exit) };
    if rc != 0 {
        warn!("failed to register atexit hook; call spark_pipe::global::shutdown explicitly");
    }
}
