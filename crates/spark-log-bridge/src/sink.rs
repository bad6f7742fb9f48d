//! # 下游 Sink 契约
//!
//! ## 核心意图（Why）
//! - 桥接层只负责归一化与分发，消息的传输、格式化与持久化全部由下游 Sink 承担；
//! - Sink 的内部错误上报能力以 [`LogSink::report_internal_error`] 的形式显式暴露，
//!   分发器据此决定吞掉失败还是向调用方传播。
//!
//! ## 行为契约（What）
//! - 所有方法都可能被多个线程并发调用，实现必须 `Send + Sync`；
//! - `send` 可能是慢调用，桥接层不为其设置超时；
//! - [`SinkRegistry`] 负责“实例名 → Sink”的解析，并提供进程级默认 Sink。

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::SinkError;
use crate::severity::MessageKind;

/// 共享的 Sink 句柄。
pub type SharedSink = Arc<dyn LogSink>;

/// 下游日志 Sink。
///
/// # 教案式注释
/// - **意图 (Why)**：为每种消息种类提供统一的类型化发送入口，并补齐作用域信号与内部错误钩子；
/// - **契约 (What)**：
///   - `send`：发送一条消息，`details` 为可选详情块；
///   - `send_sql`：发送由分片合并而来的语句文本，`label` 为展示标题；
///   - `enter_scope` / `exit_scope`：作用域信号；
///   - `report_internal_error`：返回 `true` 表示 Sink 已接管该失败；默认实现返回 `false`，
///     等价于“钩子不可用”；
///   - `close`：释放 Sink 持有的资源，仅由拥有该 Sink 的桥接组件调用。
pub trait LogSink: Send + Sync + 'static {
    fn send(&self, kind: MessageKind, message: &str, details: Option<&str>)
    -> Result<(), SinkError>;

    fn send_sql(&self, label: &str, sql: &str) -> Result<(), SinkError>;

    fn enter_scope(&self, label: &str) -> Result<(), SinkError>;

    fn exit_scope(&self, label: &str) -> Result<(), SinkError>;

    fn report_internal_error(&self, kind: MessageKind, error: &SinkError) -> bool {
        let _ = (kind, error);
        false
    }

    fn close(&self) {}
}

/// 实例名到 Sink 的解析器。
///
/// - `get` 返回 `Ok(None)` 表示实例未登记，调用方回落到 [`SinkRegistry::default_sink`]；
/// - `get` 返回 `Err` 表示解析过程本身失败，由配置重建边界处理。
pub trait SinkRegistry: Send + Sync + 'static {
    fn get(&self, instance: &str) -> Result<Option<SharedSink>, SinkError>;

    fn default_sink(&self) -> SharedSink;
}

/// 基于 `DashMap` 的内存注册表。
///
/// # 教案式注释
/// - **意图 (Why)**：嵌入式场景与测试无需外部 Sink 管理器即可完成实例解析；
/// - **风险 (Trade-offs)**：空实例名不会特殊处理，未登记即回落默认 Sink。
pub struct MemorySinkRegistry {
    instances: DashMap<String, SharedSink>,
    default: SharedSink,
}

impl MemorySinkRegistry {
    /// 以给定默认 Sink 构造空注册表。
    pub fn new(default: SharedSink) -> Self {
        Self {
            instances: DashMap::new(),
            default,
        }
    }

    /// 登记实例，返回被替换的旧 Sink。
    pub fn register(&self, instance: impl Into<String>, sink: SharedSink) -> Option<SharedSink> {
        self.instances.insert(instance.into(), sink)
    }

    /// 注销实例。
    pub fn unregister(&self, instance: &str) -> Option<SharedSink> {
        self.instances.remove(instance).map(|(_, sink)| sink)
    }

    /// 已登记实例数量。
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

impl SinkRegistry for MemorySinkRegistry {
    fn get(&self, instance: &str) -> Result<Option<SharedSink>, SinkError> {
        Ok(self
            .instances
            .get(instance)
            .map(|entry| Arc::clone(entry.value())))
    }

    fn default_sink(&self) -> SharedSink {
        Arc::clone(&self.default)
    }
}

impl fmt::Debug for MemorySinkRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySinkRegistry")
            .field("instances", &self.instances.len())
            .finish_non_exhaustive()
    }
}
