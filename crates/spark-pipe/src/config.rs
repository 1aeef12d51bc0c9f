//! 引擎配置。
//!
//! # 教案式说明
//! - **意图 (Why)**：分块大小与写线程命名是唯二需要按部署环境调整的参数；其余行为（FIFO、去重、停机）
//!   属于契约，不开放配置。
//! - **逻辑 (How)**：[`PipeConfig::from_env`] 读取 `SPARK_PIPE_CHUNK_SIZE` 与 `SPARK_PIPE_THREAD_PREFIX`，
//!   缺省时回落到默认值；解析经由可注入的查找函数完成，测试无需修改进程环境。
//! - **契约 (What)**：任何生效的配置都必须通过 [`PipeConfig::validate`]。

use std::{borrow::Cow, env};

use crate::error::PipeError;

/// 默认分块大小：一个内存页。
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

const DEFAULT_THREAD_PREFIX: &str = "spark-pipe";

pub(crate) const ENV_CHUNK_SIZE: &str = "SPARK_PIPE_CHUNK_SIZE";
pub(crate) const ENV_THREAD_PREFIX: &str = "SPARK_PIPE_THREAD_PREFIX";

/// 写回引擎配置。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipeConfig {
    chunk_size: usize,
    thread_name_prefix: Cow<'static, str>,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            thread_name_prefix: Cow::Borrowed(DEFAULT_THREAD_PREFIX),
        }
    }
}

impl PipeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 单次底层写调用的最大字节数。
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// 写线程名前缀，实际线程名为 `{prefix}-fd{n}`。
    pub fn thread_name_prefix(&self) -> &str {
        &self.thread_name_prefix
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_thread_name_prefix(mut self, prefix: impl Into<Cow<'static, str>>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// 校验配置。
    ///
    /// - `chunk_size` 必须大于 0，否则写循环无法推进；
    /// - 线程名前缀不得为空，也不得包含 NUL（`std::thread::Builder` 会因此 panic）。
    pub fn validate(&self) -> Result<(), PipeError> {
        if self.chunk_size == 0 {
            return Err(PipeError::InvalidConfig {
                field: "chunk_size",
                reason: Cow::Borrowed("must be greater than zero"),
            });
        }
        if self.thread_name_prefix.is_empty() {
            return Err(PipeError::InvalidConfig {
                field: "thread_name_prefix",
                reason: Cow::Borrowed("must not be empty"),
            });
        }
        if self.thread_name_prefix.contains('\0') {
            return Err(PipeError::InvalidConfig {
                field: "thread_name_prefix",
                reason: Cow::Borrowed("must not contain NUL bytes"),
            });
        }
        Ok(())
    }

    /// 从进程环境变量构建配置。
    pub fn from_env() -> Result<Self, PipeError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 以任意键值查找函数构建配置，未设置的键保留默认值。
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PipeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_CHUNK_SIZE) {
            let chunk_size =
                raw.trim()
                    .parse::<usize>()
                    .map_err(|err| PipeError::InvalidConfig {
                        field: "chunk_size",
                        reason: Cow::Owned(format!("{ENV_CHUNK_SIZE}={raw:?}: {err}")),
                    })?;
            config = config.with_chunk_size(chunk_size);
        }

        if let Some(prefix) = lookup(ENV_THREAD_PREFIX) {
            config = config.with_thread_name_prefix(prefix);
        }

        config.validate()?;
        Ok(config)
    }

    pub(crate) fn thread_name(&self, raw_destination: i32) -> String {
        format!("{}-fd{}", self.thread_name_prefix, raw_destination)
    }
}
