//! 目的地与缓冲标识。
//!
//! # 教案式说明
//! - **意图 (Why)**：在途去重以“哪块内存写往哪个目的地”为单位；把 fd 与指针压缩成一个窄整数
//!   会让不同组合发生碰撞，因此使用显式的复合键 [`BufferKey`]，不做任何哈希压缩。
//! - **契约 (What)**：标识只取缓冲起始地址，与内容无关；同一地址在不同目的地上互不冲突。

use core::fmt;

#[cfg(unix)]
use std::os::fd::{AsRawFd, RawFd};

/// 写入目的地：操作系统层面的可写字节流句柄（Unix 下即文件描述符）。
///
/// 引擎从不打开、关闭或校验该句柄，所有权始终在调用方。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Destination(i32);

impl Destination {
    /// 以原始句柄值构造目的地。
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> i32 {
        self.0
    }

    /// 借用任意持有 fd 的对象（管道、子进程 stdin、文件）生成目的地。
    ///
    /// 仅复制句柄数值，调用方仍需保证对象在写入完成前不被关闭。
    #[cfg(unix)]
    pub fn of<F: AsRawFd + ?Sized>(handle: &F) -> Self {
        Self(handle.as_raw_fd())
    }
}

#[cfg(unix)]
impl From<RawFd> for Destination {
    fn from(raw: RawFd) -> Self {
        Self(raw)
    }
}

#[cfg(not(unix))]
impl From<i32> for Destination {
    fn from(raw: i32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fd:{}", self.0)
    }
}

/// 缓冲标识：缓冲起始地址。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferAddr(usize);

impl BufferAddr {
    pub fn from_ptr(ptr: *const u8) -> Self {
        Self(ptr as usize)
    }

    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> usize {
        self.0
    }

    pub(crate) fn as_ptr(self) -> *const u8 {
        self.0 as *const u8
    }
}

impl<T> From<&T> for BufferAddr
where
    T: AsRef<[u8]> + ?Sized,
{
    fn from(buffer: &T) -> Self {
        Self::from_ptr(buffer.as_ref().as_ptr())
    }
}

impl fmt::Display for BufferAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// 在途去重使用的复合键 `{目的地, 地址}`。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferKey {
    pub destination: Destination,
    pub address: BufferAddr,
}

impl BufferKey {
    pub const fn new(destination: Destination, address: BufferAddr) -> Self {
        Self {
            destination,
            address,
        }
    }
}

impl fmt::Display for BufferKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.address, self.destination)
    }
}

/// 单次写入请求，创建后不可变。
///
/// `seq` 为目的地内单调递增的入队序号；由于写线程严格 FIFO，完成序号同样单调，
/// [`crate::Ticket`] 借此精确判断完成，即便同一地址随后被再次提交。
#[derive(Clone, Copy, Debug)]
pub struct Job {
    pub(crate) address: BufferAddr,
    pub(crate) len: usize,
    pub(crate) seq: u64,
}
