//! 记录型测试桩集合。
//!
//! # 设计定位（Why）
//! - 单元测试、集成测试与基准都需要满足 [`LogSink`]、[`SinkRegistry`]、[`FaultReporter`] 契约的对象，
//!   并对“发生了哪些调用”做断言；集中提供可避免各测试文件重复定义。
//!
//! # 使用方式（How）
//! - `RecordingSink::new` 直接返回 `Arc`，可同时作为 [`SharedSink`] 注入与断言句柄使用；
//! - `fail_with` 让后续调用失败，`handle_internal_errors(true)` 让内部错误钩子接管失败。
//!
//! # 风险与权衡（Trade-offs）
//! - 失败的调用不会被记录进 `calls()`，只会体现在返回值与 `internal_errors()` 中；
//! - 模块随 crate 公开，属于稳定测试 API。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::error::{BridgeError, SinkError};
use crate::fault::FaultReporter;
use crate::severity::MessageKind;
use crate::sink::{LogSink, MemorySinkRegistry, SharedSink, SinkRegistry};

/// `RecordingSink` 记录到的一次成功调用。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkCall {
    Send {
        kind: MessageKind,
        message: String,
        details: Option<String>,
    },
    Sql {
        label: String,
        sql: String,
    },
    EnterScope(String),
    ExitScope(String),
    Close,
}

/// 记录全部调用的 Sink。
#[derive(Debug)]
pub struct RecordingSink {
    name: String,
    calls: Mutex<Vec<SinkCall>>,
    failure: Mutex<Option<String>>,
    handles_internal_errors: AtomicBool,
    internal_errors: Mutex<Vec<MessageKind>>,
}

impl RecordingSink {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            calls: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
            handles_internal_errors: AtomicBool::new(false),
            internal_errors: Mutex::new(Vec::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 到目前为止记录的全部成功调用。
    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().clone()
    }

    /// 只保留 `send` 调用的 `(kind, message)`。
    pub fn sends(&self) -> Vec<(MessageKind, String)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                SinkCall::Send { kind, message, .. } => Some((*kind, message.clone())),
                _ => None,
            })
            .collect()
    }

    /// 只保留 `send_sql` 调用的 `(label, sql)`。
    pub fn sql(&self) -> Vec<(String, String)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                SinkCall::Sql { label, sql } => Some((label.clone(), sql.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.calls.lock().contains(&SinkCall::Close)
    }

    /// 之后的发送与作用域调用都以给定描述失败。
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.failure.lock() = Some(message.into());
    }

    pub fn recover(&self) {
        *self.failure.lock() = None;
    }

    /// 设置内部错误钩子是否接管失败。
    pub fn handle_internal_errors(&self, handled: bool) {
        self.handles_internal_errors.store(handled, Ordering::SeqCst);
    }

    /// 内部错误钩子收到的消息种类，按调用顺序排列。
    pub fn internal_errors(&self) -> Vec<MessageKind> {
        self.internal_errors.lock().clone()
    }

    fn record(&self, call: SinkCall) -> Result<(), SinkError> {
        if let Some(message) = self.failure.lock().clone() {
            return Err(SinkError::new(message));
        }
        self.calls.lock().push(call);
        Ok(())
    }
}

impl LogSink for RecordingSink {
    fn send(
        &self,
        kind: MessageKind,
        message: &str,
        details: Option<&str>,
    ) -> Result<(), SinkError> {
        self.record(SinkCall::Send {
            kind,
            message: message.to_owned(),
            details: details.map(str::to_owned),
        })
    }

    fn send_sql(&self, label: &str, sql: &str) -> Result<(), SinkError> {
        self.record(SinkCall::Sql {
            label: label.to_owned(),
            sql: sql.to_owned(),
        })
    }

    fn enter_scope(&self, label: &str) -> Result<(), SinkError> {
        self.record(SinkCall::EnterScope(label.to_owned()))
    }

    fn exit_scope(&self, label: &str) -> Result<(), SinkError> {
        self.record(SinkCall::ExitScope(label.to_owned()))
    }

    fn report_internal_error(&self, kind: MessageKind, _error: &SinkError) -> bool {
        self.internal_errors.lock().push(kind);
        self.handles_internal_errors.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.calls.lock().push(SinkCall::Close);
    }
}

/// 一次故障上报的文本快照。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FaultRecord {
    pub context: String,
    pub error: String,
}

/// 记录全部故障上报的通道。
#[derive(Debug, Default)]
pub struct RecordingFaultReporter {
    faults: Mutex<Vec<FaultRecord>>,
}

impl RecordingFaultReporter {
    pub fn faults(&self) -> Vec<FaultRecord> {
        self.faults.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.faults.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.faults.lock().is_empty()
    }
}

impl FaultReporter for RecordingFaultReporter {
    fn publish(&self, error: &BridgeError, context: &str) {
        self.faults.lock().push(FaultRecord {
            context: context.to_owned(),
            error: error.to_string(),
        });
    }
}

/// 可切换为“解析必定失败”的注册表，用于演练重建失败路径。
#[derive(Debug)]
pub struct FlakyRegistry {
    inner: MemorySinkRegistry,
    failing: AtomicBool,
}

impl FlakyRegistry {
    pub fn new(default: SharedSink) -> Self {
        Self {
            inner: MemorySinkRegistry::new(default),
            failing: AtomicBool::new(false),
        }
    }

    pub fn register(&self, instance: impl Into<String>, sink: SharedSink) -> Option<SharedSink> {
        self.inner.register(instance, sink)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl SinkRegistry for FlakyRegistry {
    fn get(&self, instance: &str) -> Result<Option<SharedSink>, SinkError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SinkError::new(format!("registry lookup for `{instance}` failed")));
        }
        self.inner.get(instance)
    }

    fn default_sink(&self) -> SharedSink {
        self.inner.default_sink()
    }
}
