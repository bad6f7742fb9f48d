//! `spark-log-bridge` 把上游埋点产生的分级日志与分片文本归一化后转发给单一下游 Sink。
//!
//! # 教案背景（Why）
//! - 上游框架只会“按级别记录一条已渲染的消息”或“往文本流里写片段”，下游 Sink 却需要
//!   明确的消息种类、作用域信号与完整语句；桥接层负责两者之间的翻译；
//! - Sink 绑定与显示开关随外部配置实时变化，多个生产者线程同时写入，桥接层既不能在重建时阻塞生产者，
//!   也不能因为永不收尾的请求而无限占用内存。
//!
//! # 使用概览（How）
//! - [`LogAppender`]：分级事件入口，经 [`classify`] 分类后由分发器发送；
//! - [`FragmentWriter`]：片段入口，经 [`RequestCorrelator`] 按关联键归拢，空白片段收尾后发送语句；
//! - 两者都建立在 [`ConfigState`] 之上：快照放在 `ArcSwap` 中，读无锁，重建失败保留旧快照；
//! - 外部协作者（Sink 注册表、配置存储、变更通知、故障通道、时钟）统一经 [`BridgeEnvironment`] 注入。
//!
//! # 合约说明（What）
//! - 配置路径的失败只上报故障通道，不会传播给生产者；
//! - 发送路径的失败先交给 Sink 的内部错误钩子，钩子未接管才以 [`BridgeError::Send`] 返回；
//! - 未收尾的关联上下文在闲置超过存活时长后被淘汰，内容不会补发。
//!
//! # 风险提示（Trade-offs）
//! - Sink 的发送可能阻塞，桥接层不为其设置超时；
//! - 以线程标识派生的关联键在线程复用时可能串联两个请求，依赖 TTL 限定影响范围，
//!   需要精确关联的调用方应使用 [`CorrelationScope`] 或 [`FragmentWriter::write_for`]。

mod appender;
mod clock;
mod config;
mod correlator;
pub mod dispatch;
mod env;
mod error;
mod fault;
mod notify;
mod settings;
mod severity;
mod sink;
mod writer;

/// 记录型测试桩，供集成测试、基准与下游 crate 的测试复用。
pub mod test_stubs;

pub use crate::appender::{AppenderOptions, LogAppender};
pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::config::{
    BridgeOptions, ConfigSnapshot, ConfigState, OptionsSource, ReloadHook, SinkSelector,
};
pub use crate::correlator::{CorrelationKey, CorrelationScope, Fragment, RequestCorrelator};
pub use crate::dispatch::{ExceptionPayload, FinishedMessage, LocationInfo, LogEvent};
pub use crate::env::BridgeEnvironment;
pub use crate::error::{BoxError, BridgeError, SettingsError, SinkError};
pub use crate::fault::{FaultReporter, TracingFaultReporter};
pub use crate::notify::{ConfigChangeNotifier, ConfigObserver, Subscription};
pub use crate::settings::{
    DEFAULT_REQUEST_LIFESPAN, DEFAULT_REQUEST_LIFESPAN_SECS, MemorySettings,
    REQUEST_LIFESPAN_ATTRIBUTE, SettingsStore, parse_flag, request_lifespan,
};
pub use crate::severity::{
    Classification, ENTER_MARKER, EXIT_MARKER, MessageKind, ScopeDirection, SourceLevel, classify,
    kind_for_level,
};
pub use crate::sink::{LogSink, MemorySinkRegistry, SharedSink, SinkRegistry};
pub use crate::writer::{EXTENSION_NAME, FragmentWriter, INSTANCE_ATTRIBUTE};
