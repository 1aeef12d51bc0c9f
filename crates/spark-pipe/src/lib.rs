#![doc = r#"
# spark-pipe

## 设计动机（Why）
- **定位**：把频繁产出的大块内存（例如逐帧渲染结果）零拷贝地写入阻塞、有序的字节流句柄
  （通常是喂给编码子进程的管道 fd），让生产者在上一帧仍在落盘时继续计算下一帧。
- **架构角色**：本 crate 只负责“写回引擎”本身：按目的地串行调度、同一内存区域的去重背压、
  以及让调用方安全复用缓冲的同步原语；内存映射获取与运行时绑定均由外部协作方完成。

## 核心契约（What）
- [`Engine::submit`] 将 `(地址, 长度, 目的地)` 入队后立即返回；若同一地址在该目的地仍在途，
  调用线程阻塞至上一次写入完成；
- [`Engine::sync`] 等待指定地址或全部在途任务排空；
- [`Engine::shutdown`] 幂等：先全量排空，再停止并回收全部写线程；此后提交一律拒绝；
- 同一目的地的写出顺序严格等于入队顺序，不同目的地之间互不耦合。

## 实现策略（How）
- 每个目的地拥有独立的 [`parking_lot::Mutex`] 保护队列与在途集合，配合两个条件变量分别
  唤醒写线程与等待方；任何路径都不会同时持有两个目的地的锁；
- 每个目的地一条长期存活的写线程，按页大小分块调用注入的 [`WriteBackend`]；
- 写失败属于“尽力而为”语义：剩余字节被丢弃、任务仍视为完成，仅通过 `tracing` 告警与
  [`DestinationStats`] 计数体现。

## 风险与考量（Trade-offs）
- 引擎借用而非拥有缓冲内存，[`Engine::submit`] 因此是 `unsafe`；调用方必须在观测到完成前
  保持内存有效且不被修改；
- 没有超时：若下游进程停止读取，`sync` 会无限期等待，这是刻意接受的限制。
"#]
#![deny(unsafe_op_in_unsafe_fn)]

mod backend;
mod config;
mod destination;
mod engine;
mod error;
pub mod global;
mod key;
mod sync;
mod ticket;
mod writer;

#[cfg(any(test, feature = "test-util"))]
pub mod test_util;

#[cfg(unix)]
pub use backend::FdBackend;
pub use backend::{WriteBackend, WriteOutcome, write_chunked};
pub use config::{DEFAULT_CHUNK_SIZE, PipeConfig};
pub use destination::DestinationStats;
pub use engine::{Engine, EnginePhase};
pub use error::PipeError;
pub use key::{BufferAddr, BufferKey, Destination};
pub use ticket::Ticket;

// 模型检查构建直接驱动目的地槽位的真实协议。
#[cfg(any(loom, spark_loom))]
pub use destination::DestinationSlot;
