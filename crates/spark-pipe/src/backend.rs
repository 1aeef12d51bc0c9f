//! 底层阻塞写原语与分块写循环。
//!
//! # 教案式说明
//! - **意图 (Why)**：引擎本身不关心字节去往何处，只依赖“对句柄做一次阻塞写，返回写入字节数或错误”
//!   这一原语；把它抽象为 [`WriteBackend`]，生产环境使用 [`FdBackend`]，测试注入内存实现。
//! - **逻辑 (How)**：[`write_chunked`] 按 `chunk_size` 切片循环调用后端，直至写满或遇到不可恢复错误；
//!   `Interrupted` 视为可恢复并原地重试，写入 0 字节视为对端不再接收。
//! - **契约 (What)**：返回的 [`WriteOutcome`] 总是报告已写入字节数；出错时剩余字节直接放弃，
//!   由调用方（写线程）决定如何记录。

use std::io;

use crate::key::Destination;

/// 面向单个目的地的阻塞写原语。
///
/// 实现必须是阻塞语义：返回 `Ok(n)` 表示前 `n` 个字节已交给目的地，`n` 可以小于 `chunk.len()`。
/// 同一目的地在任一时刻只会被一个写线程调用。
pub trait WriteBackend: Send + Sync + 'static {
    fn write(&self, destination: Destination, chunk: &[u8]) -> io::Result<usize>;
}

impl<B> WriteBackend for std::sync::Arc<B>
where
    B: WriteBackend + ?Sized,
{
    fn write(&self, destination: Destination, chunk: &[u8]) -> io::Result<usize> {
        (**self).write(destination, chunk)
    }
}

/// 一次分块写的结果。
#[derive(Debug)]
pub struct WriteOutcome {
    /// 实际交付的字节数。
    pub written: usize,
    /// 导致循环提前终止的错误；`None` 表示全部写完。
    pub error: Option<io::Error>,
}

impl WriteOutcome {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// 以不超过 `chunk_size` 的连续、不重叠分块把 `bytes` 写往 `destination`。
///
/// `chunk_size` 为 0 时按 1 处理，保证循环总能推进。
pub fn write_chunked<B>(
    backend: &B,
    destination: Destination,
    bytes: &[u8],
    chunk_size: usize,
) -> WriteOutcome
where
    B: WriteBackend + ?Sized,
{
    let chunk_size = chunk_size.max(1);
    let mut written = 0;

    while written < bytes.len() {
        let end = bytes.len().min(written + chunk_size);
        match backend.write(destination, &bytes[written..end]) {
            Ok(0) => {
                return WriteOutcome {
                    written,
                    error: Some(io::Error::from(io::ErrorKind::WriteZero)),
                };
            }
            Ok(n) => written += n.min(end - written),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                return WriteOutcome {
                    written,
                    error: Some(err),
                };
            }
        }
    }

    WriteOutcome {
        written,
        error: None,
    }
}

/// 基于 `write(2)` 的文件描述符后端。
///
/// 不持有也不关闭 fd；句柄生命周期完全由调用方管理。
///
/// 读端已关闭的管道在 `write(2)` 时会触发 `SIGPIPE`。只有宿主进程忽略该信号时
/// （Rust 可执行文件与 CPython 默认如此），写入才会以 `EPIPE` 失败并按“静默丢弃”处理；
/// 保留默认处置的 C 宿主会被信号直接终止，嵌入方需自行设置 `SIGPIPE` 为 `SIG_IGN`。
#[cfg(unix)]
#[derive(Clone, Copy, Debug, Default)]
pub struct FdBackend;

#[cfg(unix)]
impl WriteBackend for FdBackend {
    fn write(&self, destination: Destination, chunk: &[u8]) -> io::Result<usize> {
        // SAFETY: `chunk` 在调用期间有效，长度与指针来自同一切片；fd 的有效性由调用方保证，
        // 无效 fd 只会得到 EBADF。
        let rc = unsafe {
            libc::write(
                destination.as_raw(),
                chunk.as_ptr().cast::<libc::c_void>(),
                chunk.len(),
            )
        };
        if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(rc as usize)
        }
    }
}
