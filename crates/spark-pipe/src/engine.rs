//! 引擎门面：`submit` / `sync` / `shutdown`。
//!
//! # 教案式说明
//! - **意图 (Why)**：把目的地注册表、生命周期与各目的地状态串联起来，对外只暴露三类操作。
//!   引擎是显式构造的对象，测试可以并行创建互不干扰的实例；进程级单例见 [`crate::global`]。
//! - **逻辑 (How)**：
//!   - 注册表锁只在查找/创建目的地时短暂持有，取到 `Arc<DestinationSlot>` 后立即释放；
//!   - `sync` 先对注册表做快照，再逐个目的地在各自锁上等待，任何时刻至多持有一把目的地锁；
//!   - `shutdown` 依次：切换到 `Draining` → 关闭所有目的地的接收 → 等待全部在途清空 →
//!     停止并 join 写线程 → 清空注册表 → 切换到 `Stopped`。
//! - **契约 (What)**：
//!   - 停机切换点：`Draining` 一旦生效，新目的地不再创建；目的地的 `close_intake` 之后提交一律返回
//!     [`PipeError::EngineStopped`]，被拒绝的提交没有任何副作用；
//!   - 停机后引擎不会被“复活”，重复 `shutdown` 为空操作；
//!   - 最后一个 `Engine` 句柄被丢弃时自动执行停机，不会遗留写线程。

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::{
    backend::WriteBackend,
    config::PipeConfig,
    destination::{DestinationSlot, DestinationStats},
    error::PipeError,
    key::{BufferAddr, BufferKey, Destination},
    ticket::Ticket,
    writer,
};

/// 引擎生命周期阶段。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnginePhase {
    Running,
    /// 停机进行中：拒绝新提交，等待在途任务排空。
    Draining,
    Stopped,
}

impl EnginePhase {
    const RUNNING: u8 = 0;
    const DRAINING: u8 = 1;
    const STOPPED: u8 = 2;

    fn from_u8(raw: u8) -> Self {
        match raw {
            Self::RUNNING => EnginePhase::Running,
            Self::DRAINING => EnginePhase::Draining,
            _ => EnginePhase::Stopped,
        }
    }
}

/// 异步写回引擎。
///
/// 句柄可廉价克隆，所有克隆共享同一组目的地与写线程。
#[derive(Clone)]
pub struct Engine {
    shared: Arc<Shared>,
}

struct Shared {
    config: PipeConfig,
    backend: Arc<dyn WriteBackend>,
    phase: AtomicU8,
    registry: Mutex<HashMap<Destination, Arc<DestinationSlot>>>,
    /// 串行化并发的 `shutdown` 调用，后来者等待前者完成后直接返回。
    shutdown_gate: Mutex<()>,
}

impl Engine {
    /// 以默认配置构造引擎。
    pub fn new<B: WriteBackend>(backend: B) -> Self {
        Self::build(PipeConfig::default(), Arc::new(backend))
    }

    /// 以自定义配置构造引擎，配置非法时返回 [`PipeError::InvalidConfig`]。
    pub fn with_config<B: WriteBackend>(config: PipeConfig, backend: B) -> Result<Self, PipeError> {
        config.validate()?;
        Ok(Self::build(config, Arc::new(backend)))
    }

    fn build(config: PipeConfig, backend: Arc<dyn WriteBackend>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                backend,
                phase: AtomicU8::new(EnginePhase::RUNNING),
                registry: Mutex::new(HashMap::new()),
                shutdown_gate: Mutex::new(()),
            }),
        }
    }

    pub fn config(&self) -> &PipeConfig {
        &self.shared.config
    }

    pub fn phase(&self) -> EnginePhase {
        self.shared.phase()
    }

    pub fn is_running(&self) -> bool {
        self.phase() == EnginePhase::Running
    }

    /// 提交一次写入：把 `[address, address + len)` 原样写往 `destination`。
    ///
    /// - 若同一地址在该目的地仍在途，调用线程阻塞至上一次写入结束（背压）；
    /// - 首次提交到某目的地时惰性创建其写线程；
    /// - 入队后立即返回，不等待写出。
    ///
    /// # Safety
    /// 调用方必须保证该内存区域在写入完成被观测到之前（[`Ticket::wait`]、[`Engine::sync`]，
    /// 或同一地址的下一次 `submit` 返回）始终有效且不被修改。`len > 0` 时 `address` 不得为空。
    ///
    /// # Errors
    /// - 停机已开始：[`PipeError::EngineStopped`]；
    /// - 首次提交到该目的地且无法创建写线程：[`PipeError::WriterSpawn`]。
    pub unsafe fn submit(
        &self,
        address: *const u8,
        len: usize,
        destination: Destination,
    ) -> Result<Ticket, PipeError> {
        let address = BufferAddr::from_ptr(address);
        let slot = self.shared.slot_for(destination)?;
        let seq = slot.enqueue(address, len).inspect_err(|_| {
            warn!(%destination, %address, "submission rejected after shutdown began");
        })?;
        Ok(Ticket::new(slot, BufferKey::new(destination, address), seq))
    }

    /// 提交一段 `'static` 字节切片；切片本身保证了 [`Engine::submit`] 要求的有效性与不可变性。
    pub fn submit_slice(
        &self,
        bytes: &'static [u8],
        destination: Destination,
    ) -> Result<Ticket, PipeError> {
        // SAFETY: `'static` 共享切片在进程生命周期内有效且不可变。
        unsafe { self.submit(bytes.as_ptr(), bytes.len(), destination) }
    }

    /// 等待排空。
    ///
    /// - `Some(address)`：等待该地址不再出现在任何目的地的在途集合中，从未提交过则立即返回；
    /// - `None`：等待所有目的地的在途集合全部清空。
    ///
    /// 各目的地独立检查，不要求跨目的地的原子性。
    pub fn sync(&self, address: Option<BufferAddr>) {
        for slot in self.shared.snapshot_slots() {
            match address {
                Some(address) => slot.wait_released(address),
                None => slot.wait_idle(),
            }
        }
    }

    /// 等待指定 `{目的地, 地址}` 的写入结束。
    pub fn sync_key(&self, key: BufferKey) {
        if let Some(slot) = self.shared.lookup(key.destination) {
            slot.wait_released(key.address);
        }
    }

    /// 只等待单个目的地排空。
    pub fn sync_destination(&self, destination: Destination) {
        if let Some(slot) = self.shared.lookup(destination) {
            slot.wait_idle();
        }
    }

    /// 幂等停机：全量排空后停止并回收全部写线程，之后拒绝所有提交。
    pub fn shutdown(&self) {
        self.shared.shutdown();
    }

    /// 单个目的地的统计快照；目的地未注册（或已停机清理）时返回 `None`。
    pub fn stats(&self, destination: Destination) -> Option<DestinationStats> {
        self.shared.lookup(destination).map(|slot| slot.snapshot())
    }

    /// 全部已注册目的地的统计快照，按目的地排序。
    pub fn destinations(&self) -> Vec<DestinationStats> {
        let mut stats: Vec<_> = self
            .shared
            .snapshot_slots()
            .iter()
            .map(|slot| slot.snapshot())
            .collect();
        stats.sort_by_key(|entry| entry.destination);
        stats
    }
}

impl core::fmt::Debug for Engine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Engine")
            .field("phase", &self.phase())
            .field("destinations", &self.shared.registry.lock().len())
            .field("config", &self.shared.config)
            .finish()
    }
}

impl Shared {
    fn phase(&self) -> EnginePhase {
        EnginePhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    fn lookup(&self, destination: Destination) -> Option<Arc<DestinationSlot>> {
        self.registry.lock().get(&destination).cloned()
    }

    fn snapshot_slots(&self) -> Vec<Arc<DestinationSlot>> {
        self.registry.lock().values().cloned().collect()
    }

    /// 取得目的地状态，首次使用时创建并启动写线程。
    ///
    /// 阶段检查在注册表锁内重做一次：停机流程在同一把锁下做快照，
    /// 因而快照之后不会再出现遗漏的目的地。
    fn slot_for(&self, destination: Destination) -> Result<Arc<DestinationSlot>, PipeError> {
        if self.phase() != EnginePhase::Running {
            return Err(PipeError::EngineStopped { destination });
        }

        let mut registry = self.registry.lock();
        if self.phase() != EnginePhase::Running {
            return Err(PipeError::EngineStopped { destination });
        }
        if let Some(slot) = registry.get(&destination) {
            return Ok(Arc::clone(slot));
        }

        let slot = Arc::new(DestinationSlot::new(destination));
        let handle = writer::spawn(Arc::clone(&slot), Arc::clone(&self.backend), &self.config)
            .map_err(|source| PipeError::WriterSpawn {
                destination,
                source,
            })?;
        slot.attach_worker(handle);
        registry.insert(destination, Arc::clone(&slot));
        debug!(%destination, "destination registered");
        Ok(slot)
    }

    fn shutdown(&self) {
        let _gate = self.shutdown_gate.lock();
        if self.phase() == EnginePhase::Stopped {
            return;
        }

        let slots = {
            let registry = self.registry.lock();
            self.phase.store(EnginePhase::DRAINING, Ordering::Release);
            registry.values().cloned().collect::<Vec<_>>()
        };
        info!(destinations = slots.len(), "write-back shutdown initiated");

        for slot in &slots {
            slot.close_intake();
        }
        for slot in &slots {
            slot.wait_idle();
        }
        for slot in &slots {
            slot.stop_writer();
        }

        self.registry.lock().clear();
        self.phase.store(EnginePhase::STOPPED, Ordering::Release);
        info!(destinations = slots.len(), "write-back shutdown complete");
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.shutdown();
    }
}
