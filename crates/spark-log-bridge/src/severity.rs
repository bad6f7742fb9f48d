//! 严重级别映射：把上游埋点的日志级别归类为下游 Sink 的消息种类。
//!
//! # 教案式说明
//! - **意图（Why）**：上游框架的级别集合远多于 Sink 接受的消息种类（多个级别共享同一种类），
//!   映射必须是全函数，未知级别也不能导致失败。
//! - **逻辑（How）**：[`kind_for_level`] 是纯查表；[`classify`] 在其上叠加作用域标记识别：
//!   `Info` 级别且正文以 [`ENTER_MARKER`]/[`EXIT_MARKER`] 开头时，事件被改判为作用域信号。
//! - **契约（What）**：本模块无状态、无副作用，可在任意线程直接调用。

use std::borrow::Cow;
use std::fmt;

/// 进入作用域的保留前缀。
pub const ENTER_MARKER: &str = "[Enter]";
/// 退出作用域的保留前缀。
pub const EXIT_MARKER: &str = "[Exit]";

/// 上游埋点框架给出的日志级别。
///
/// 集合是开放的：框架自定义的级别通过 [`SourceLevel::Custom`] 传入，映射时回落为
/// [`MessageKind::Information`]。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SourceLevel {
    Trace,
    Debug,
    /// 框架自身的内部调试级别。
    FrameworkDebug,
    Verbose,
    Info,
    Notice,
    Warn,
    Error,
    Severe,
    Critical,
    Alert,
    Fatal,
    Emergency,
    /// 未登记的自定义级别，携带其显示名称。
    Custom(Cow<'static, str>),
}

impl SourceLevel {
    /// 级别的显示名称，用于详情块中的 `Level` 字段。
    pub fn display_name(&self) -> &str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::FrameworkDebug => "FRAMEWORK_DEBUG",
            Self::Verbose => "VERBOSE",
            Self::Info => "INFO",
            Self::Notice => "NOTICE",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Severe => "SEVERE",
            Self::Critical => "CRITICAL",
            Self::Alert => "ALERT",
            Self::Fatal => "FATAL",
            Self::Emergency => "EMERGENCY",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for SourceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// 下游 Sink 接受的消息种类。
///
/// 前八种由级别映射产生；[`MessageKind::Sql`] 仅用于分片写入路径合并后的消息。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Trace,
    Debug,
    Information,
    Warning,
    Error,
    Fatal,
    Note,
    Verbose,
    Sql,
}

impl MessageKind {
    /// 稳定的小写名称，适合作为日志字段或指标标签。
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Information => "information",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Fatal => "fatal",
            Self::Note => "note",
            Self::Verbose => "verbose",
            Self::Sql => "sql",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 作用域信号的方向。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScopeDirection {
    Enter,
    Exit,
}

impl ScopeDirection {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Enter => "enter",
            Self::Exit => "exit",
        }
    }
}

impl fmt::Display for ScopeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// [`classify`] 的结果。
///
/// - `Message`：普通消息，按种类交给分发器；
/// - `Scope`：作用域信号，`label` 为去掉保留前缀后的正文，借用自原始文本。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Classification<'a> {
    Message(MessageKind),
    Scope {
        direction: ScopeDirection,
        label: &'a str,
    },
}

impl Classification<'_> {
    /// 是否为作用域信号。
    pub const fn is_scope_marker(&self) -> bool {
        matches!(self, Self::Scope { .. })
    }
}

/// 级别到消息种类的全映射。
pub fn kind_for_level(level: &SourceLevel) -> MessageKind {
    match level {
        SourceLevel::Trace => MessageKind::Trace,
        SourceLevel::Debug | SourceLevel::FrameworkDebug => MessageKind::Debug,
        SourceLevel::Info => MessageKind::Information,
        SourceLevel::Warn => MessageKind::Warning,
        SourceLevel::Error | SourceLevel::Alert | SourceLevel::Emergency | SourceLevel::Severe => {
            MessageKind::Error
        }
        SourceLevel::Fatal | SourceLevel::Critical => MessageKind::Fatal,
        SourceLevel::Notice => MessageKind::Note,
        SourceLevel::Verbose => MessageKind::Verbose,
        SourceLevel::Custom(_) => MessageKind::Information,
    }
}

/// 对一条已渲染的事件分类。
///
/// # 契约（What）
/// - 仅 `Info` 级别会识别作用域标记，且只剥离开头的一个前缀；
/// - 其余情况返回 [`Classification::Message`]，种类由 [`kind_for_level`] 决定。
pub fn classify<'a>(level: &SourceLevel, text: &'a str) -> Classification<'a> {
    if matches!(level, SourceLevel::Info) {
        if let Some(label) = text.strip_prefix(ENTER_MARKER) {
            return Classification::Scope {
                direction: ScopeDirection::Enter,
                label,
            };
        }
        if let Some(label) = text.strip_prefix(EXIT_MARKER) {
            return Classification::Scope {
                direction: ScopeDirection::Exit,
                label,
            };
        }
    }
    Classification::Message(kind_for_level(level))
}
