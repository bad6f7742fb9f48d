//! # 分发器
//!
//! ## 设计动机（Why）
//! - 把“已完成的消息”交给当前快照绑定的 Sink，是两个前端共用的最后一步；
//! - Sink 失败的处理规则只有一条：先交给 Sink 自己的内部错误钩子，钩子未接管才向调用方传播。
//!
//! ## 核心契约（What）
//! - 详情块：异常文本（若有）后接一个空行；任一显示开关打开时追加 `Source Details:` 标题、
//!   40 个 `-` 组成的分隔线，以及按开关逐项输出、名称右对齐到 10 列的字段行；
//! - 缺失的位置字段输出 `?`；
//! - 所有函数都是无状态的，调用方传入本次操作读取到的快照。

use std::fmt::Write as _;

use tracing::warn;

use crate::config::ConfigSnapshot;
use crate::error::{BridgeError, SinkError};
use crate::severity::{MessageKind, ScopeDirection, SourceLevel};
use crate::sink::LogSink;

/// 详情块标题。
pub const DETAILS_HEADER: &str = "Source Details:";
const DETAILS_RULE_WIDTH: usize = 40;
const UNKNOWN_FIELD: &str = "?";

/// 事件的来源位置。未知字段保持 `None`。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LocationInfo {
    pub class_name: Option<String>,
    pub method_name: Option<String>,
    pub file_name: Option<String>,
    pub line_number: Option<u32>,
    pub full_info: Option<String>,
}

/// 上游已渲染好的异常文本。桥接层不做任何格式化。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExceptionPayload(String);

impl ExceptionPayload {
    pub fn new(rendered: impl Into<String>) -> Self {
        Self(rendered.into())
    }

    pub fn rendered(&self) -> &str {
        &self.0
    }
}

/// 一条分级日志事件。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEvent {
    level: SourceLevel,
    message: String,
    exception: Option<ExceptionPayload>,
    location: Option<LocationInfo>,
}

impl LogEvent {
    pub fn new(level: SourceLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            exception: None,
            location: None,
        }
    }

    pub fn with_exception(mut self, exception: ExceptionPayload) -> Self {
        self.exception = Some(exception);
        self
    }

    pub fn with_location(mut self, location: LocationInfo) -> Self {
        self.location = Some(location);
        self
    }

    pub fn level(&self) -> &SourceLevel {
        &self.level
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn exception(&self) -> Option<&ExceptionPayload> {
        self.exception.as_ref()
    }

    pub fn location(&self) -> Option<&LocationInfo> {
        self.location.as_ref()
    }
}

/// 交给 Sink 的完整消息。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinishedMessage {
    pub kind: MessageKind,
    pub text: String,
    pub details: Option<String>,
}

/// 依据快照的显示开关为事件组装消息。
pub fn compose(snapshot: &ConfigSnapshot, kind: MessageKind, event: &LogEvent) -> FinishedMessage {
    FinishedMessage {
        kind,
        text: event.message.clone(),
        details: compose_details(snapshot, event),
    }
}

/// 组装详情块；既无异常也未打开任何显示开关时返回 `None`。
pub fn compose_details(snapshot: &ConfigSnapshot, event: &LogEvent) -> Option<String> {
    let show_level = snapshot.display_level();
    let show_location = snapshot.display_location();
    if event.exception.is_none() && !show_level && !show_location {
        return None;
    }

    let mut block = String::new();
    if let Some(exception) = &event.exception {
        block.push_str(exception.rendered());
        block.push_str("\n\n");
    }

    if show_level || show_location {
        block.push_str(DETAILS_HEADER);
        block.push('\n');
        block.push_str(&"-".repeat(DETAILS_RULE_WIDTH));
        block.push('\n');

        if show_level {
            push_field(&mut block, "Level", event.level.display_name());
        }
        if show_location {
            let location = event.location.clone().unwrap_or_default();
            let line = location.line_number.map(|line| line.to_string());
            push_field(&mut block, "ClassName", or_unknown(location.class_name.as_deref()));
            push_field(&mut block, "MethodName", or_unknown(location.method_name.as_deref()));
            push_field(&mut block, "FileName", or_unknown(location.file_name.as_deref()));
            push_field(&mut block, "LineNumber", or_unknown(line.as_deref()));
            push_field(&mut block, "FullInfo", or_unknown(location.full_info.as_deref()));
        }
    }
    Some(block)
}

fn or_unknown(value: Option<&str>) -> &str {
    value.unwrap_or(UNKNOWN_FIELD)
}

fn push_field(block: &mut String, name: &str, value: &str) {
    // 写入 String 不会失败。
    let _ = writeln!(block, "{name:>10}: {value}");
}

/// 组装并发送一条分级事件。
pub fn send(
    snapshot: &ConfigSnapshot,
    kind: MessageKind,
    event: &LogEvent,
) -> Result<(), BridgeError> {
    deliver(snapshot, &compose(snapshot, kind, event))
}

/// 发送已组装好的消息。
///
/// # 教案式注释
/// - **契约 (What)**：Sink 失败时调用 [`LogSink::report_internal_error`]；
///   返回 `true` 则吞掉失败并返回 `Ok(())`，否则返回 [`BridgeError::Send`]；
/// - **风险 (Trade-offs)**：Sink 的 `send` 可能阻塞，这里不设超时。
pub fn deliver(snapshot: &ConfigSnapshot, message: &FinishedMessage) -> Result<(), BridgeError> {
    let sink = snapshot.sink();
    let outcome = sink.send(message.kind, &message.text, message.details.as_deref());
    settle(sink.as_ref(), message.kind, outcome)
}

/// 发送由片段合并而来的语句文本，失败语义与 [`deliver`] 相同。
pub fn send_sql(snapshot: &ConfigSnapshot, label: &str, text: &str) -> Result<(), BridgeError> {
    let sink = snapshot.sink();
    settle(sink.as_ref(), MessageKind::Sql, sink.send_sql(label, text))
}

/// 转发作用域信号。作用域调用不经过内部错误钩子。
pub fn scope(
    snapshot: &ConfigSnapshot,
    direction: ScopeDirection,
    label: &str,
) -> Result<(), BridgeError> {
    let sink = snapshot.sink();
    let outcome = match direction {
        ScopeDirection::Enter => sink.enter_scope(label),
        ScopeDirection::Exit => sink.exit_scope(label),
    };
    outcome.map_err(|source| BridgeError::Scope {
        direction,
        label: label.to_owned(),
        source,
    })
}

pub fn enter_scope(snapshot: &ConfigSnapshot, label: &str) -> Result<(), BridgeError> {
    scope(snapshot, ScopeDirection::Enter, label)
}

pub fn exit_scope(snapshot: &ConfigSnapshot, label: &str) -> Result<(), BridgeError> {
    scope(snapshot, ScopeDirection::Exit, label)
}

fn settle(
    sink: &dyn LogSink,
    kind: MessageKind,
    outcome: Result<(), SinkError>,
) -> Result<(), BridgeError> {
    match outcome {
        Ok(()) => Ok(()),
        Err(err) if sink.report_internal_error(kind, &err) => {
            warn!(
                kind = %kind,
                error = %err,
                "sink send failed, internal-error hook handled it"
            );
            Ok(())
        }
        Err(source) => Err(BridgeError::Send { kind, source }),
    }
}
