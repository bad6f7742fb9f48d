//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 桥接层存在两个互不相干的失败域：配置重建失败与 Sink 发送失败；
//!   前者在重建边界被吸收并上报到故障通道，后者由内部错误钩子决定吞掉还是向调用方传播。
//! - 本模块集中定义这两条路径上流转的错误类型，统一派生 `thiserror::Error`。
//!
//! ## 设计要求（What）
//! - [`SinkError`] 对外部 Sink 保持不透明：只携带可读描述与可选的底层错误；
//! - [`SettingsError`] 描述配置存储读取失败；
//! - [`BridgeError`] 是所有公开操作的错误出口，变体按失败域划分。

use std::borrow::Cow;
use std::error::Error as StdError;

use thiserror::Error;

use crate::severity::{MessageKind, ScopeDirection};

/// 可跨线程传递的装箱错误。
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// 下游 Sink 报告的失败。
///
/// # 教案式说明
/// - **意图 (Why)**：Sink 的传输与持久化对桥接层不透明，错误只需保留描述与原因链，
///   以便交给内部错误钩子或向调用方传播。
/// - **契约 (What)**：`message` 为人类可读描述；`source` 为可选的底层错误，经由
///   [`std::error::Error::source`] 暴露。
#[derive(Debug, Error)]
#[error("{message}")]
pub struct SinkError {
    message: Cow<'static, str>,
    #[source]
    source: Option<BoxError>,
}

impl SinkError {
    /// 仅以描述构造错误。
    pub fn new(message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// 携带底层原因构造错误。
    pub fn with_source(message: impl Into<Cow<'static, str>>, source: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 错误描述。
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// 配置存储读取失败。
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    /// 指定属性无法读取（存储不可用、权限不足等）。
    #[error("settings attribute `{key}` is unavailable: {reason}")]
    Unavailable { key: String, reason: String },
}

/// 桥接层错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：把“配置重建”与“消息发送”两类失败放进同一个枚举，调用方只需处理一种 `Result`；
/// - **契约 (What)**：
///   - `Settings` / `SinkResolution` 只出现在配置重建路径，由 [`crate::ConfigState`] 吸收并上报；
///   - `Send` 表示 Sink 发送失败且内部错误钩子未处理，属于需要调用方感知的致命失败；
///   - `Scope` 表示进入/退出作用域的调用被 Sink 拒绝。
#[derive(Debug, Error)]
pub enum BridgeError {
    /// 读取配置存储失败。
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// 按实例名解析 Sink 时，注册表报告了错误。
    #[error("failed to resolve sink instance `{instance}`")]
    SinkResolution {
        instance: String,
        #[source]
        source: SinkError,
    },

    /// Sink 发送失败，且内部错误钩子未接管该失败。
    #[error("sink failed to accept {kind} message and the internal-error hook declined it")]
    Send {
        kind: MessageKind,
        #[source]
        source: SinkError,
    },

    /// Sink 拒绝了作用域进入/退出调用。
    #[error("sink failed to {direction} scope `{label}`")]
    Scope {
        direction: ScopeDirection,
        label: String,
        #[source]
        source: SinkError,
    },
}

impl BridgeError {
    /// 若错误来自 Sink（发送或作用域调用），返回底层 [`SinkError`]。
    pub fn sink_error(&self) -> Option<&SinkError> {
        match self {
            Self::Send { source, .. } | Self::Scope { source, .. } => Some(source),
            Self::SinkResolution { source, .. } => Some(source),
            Self::Settings(_) => None,
        }
    }
}
