//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 写回引擎对外只在两处返回错误：配置解析与提交（停机后拒绝、写线程创建失败）；
//! - 写入目的地失败不经由此处传播，而是在写线程内部记录日志与统计，保持“发出即忘”的交付契约。
//!
//! ## 设计要求（What）
//! - 错误类型派生 `thiserror::Error`，可安全跨线程传播（`Send + Sync + 'static`）；
//! - 变体携带目的地或配置项上下文，方便绑定层直接转成宿主语言异常。

use std::{borrow::Cow, io};

use thiserror::Error;

use crate::key::Destination;

/// 写回引擎错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：把停机切换点、线程资源耗尽与配置错误区分开，调用方可以据此决定是否重试。
/// - **契约 (What)**：
///   - [`PipeError::EngineStopped`] 表示引擎已进入停机流程，本次提交没有任何可观测副作用；
///   - [`PipeError::WriterSpawn`] 表示首次提交到某目的地时无法创建写线程，目的地不会被注册；
///   - [`PipeError::InvalidConfig`] 仅由 [`crate::PipeConfig`] 的校验与环境变量解析产生。
#[derive(Debug, Error)]
pub enum PipeError {
    /// 停机已开始或已完成，提交被拒绝。
    #[error("write-back engine is shutting down; submission to {destination} rejected")]
    EngineStopped { destination: Destination },

    /// 操作系统拒绝创建写线程。
    #[error("failed to spawn writer thread for {destination}")]
    WriterSpawn {
        destination: Destination,
        #[source]
        source: io::Error,
    },

    /// 配置项取值非法。
    #[error("invalid configuration `{field}`: {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: Cow<'static, str>,
    },
}

impl PipeError {
    /// 是否为停机切换点导致的拒绝。
    pub fn is_stopped(&self) -> bool {
        matches!(self, PipeError::EngineStopped { .. })
    }
}
