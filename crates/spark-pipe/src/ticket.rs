use core::fmt;
use std::sync::Arc;

use crate::{destination::DestinationSlot, key::BufferKey};

/// 单次提交的完成凭据。
///
/// # 教案式说明
/// - **意图 (Why)**：仅凭地址判断“缓冲是否仍被引擎读取”在地址被重复提交时会产生歧义；
///   凭据记录目的地内的入队序号，能精确对应到这一次提交。
/// - **逻辑 (How)**：写线程严格按序完成任务，目的地只需维护“最近完成序号”，
///   `completed_seq >= seq` 即表示本次写入已结束（全部写出，或因写错误被放弃）。
/// - **契约 (What)**：丢弃凭据不会取消写入；凭据可跨线程移动，也可在引擎停机后继续查询。
pub struct Ticket {
    slot: Arc<DestinationSlot>,
    key: BufferKey,
    seq: u64,
}

impl Ticket {
    pub(crate) fn new(slot: Arc<DestinationSlot>, key: BufferKey, seq: u64) -> Self {
        Self { slot, key, seq }
    }

    pub fn key(&self) -> BufferKey {
        self.key
    }

    /// 目的地内的入队序号，从 1 开始；同一目的地上序号顺序即写出顺序。
    pub fn sequence(&self) -> u64 {
        self.seq
    }

    pub fn is_complete(&self) -> bool {
        self.slot.is_seq_complete(self.seq)
    }

    /// 阻塞直到本次写入结束。
    pub fn wait(&self) {
        self.slot.wait_seq(self.seq);
    }
}

impl fmt::Debug for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ticket")
            .field("key", &self.key)
            .field("sequence", &self.seq)
            .finish()
    }
}
