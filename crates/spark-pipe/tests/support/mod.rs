//! 集成测试共享的小工具。
#![allow(dead_code)]

use std::{
    thread,
    time::{Duration, Instant},
};

use spark_pipe::{Engine, EnginePhase};

/// 测试中等待异步状态收敛的上限；正常路径远小于该值。
pub const PATIENCE: Duration = Duration::from_secs(5);

/// 用于断言“仍在阻塞”的观察窗口。
pub const BLOCK_WINDOW: Duration = Duration::from_millis(100);

/// 生成内容可区分的 `'static` 缓冲，测试进程结束时由操作系统回收。
pub fn leak_pattern(tag: u8, len: usize) -> &'static [u8] {
    let bytes: Vec<u8> = (0..len).map(|i| tag.wrapping_add(i as u8)).collect();
    Box::leak(bytes.into_boxed_slice())
}

/// 轮询等待引擎进入指定阶段。
pub fn wait_for_phase(engine: &Engine, phase: EnginePhase) -> bool {
    let deadline = Instant::now() + PATIENCE;
    while Instant::now() < deadline {
        if engine.phase() == phase {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    engine.phase() == phase
}
