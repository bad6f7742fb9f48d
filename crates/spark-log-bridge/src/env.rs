//! 桥接组件运行所需的外部协作者集合。

use std::fmt;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::fault::{FaultReporter, TracingFaultReporter};
use crate::notify::ConfigChangeNotifier;
use crate::settings::{MemorySettings, SettingsStore};
use crate::sink::SinkRegistry;

/// 外部协作者的共享句柄。
///
/// # 教案式注释
/// - **意图 (Why)**：Sink 注册表、配置存储、变更通知、故障通道与时钟都是“固定契约的外部系统”，
///   集中到一处便于在激活组件时一次性注入，也便于测试整体替换；
/// - **契约 (What)**：除注册表外均有默认值：空的 [`MemorySettings`]、进程级
///   [`ConfigChangeNotifier::global`]、[`TracingFaultReporter`] 与 [`SystemClock`]；
/// - **风险 (Trade-offs)**：克隆只增加引用计数，多个组件共享同一组协作者。
#[derive(Clone)]
pub struct BridgeEnvironment {
    registry: Arc<dyn SinkRegistry>,
    settings: Arc<dyn SettingsStore>,
    notifier: ConfigChangeNotifier,
    faults: Arc<dyn FaultReporter>,
    clock: Arc<dyn Clock>,
}

impl BridgeEnvironment {
    pub fn new(registry: Arc<dyn SinkRegistry>) -> Self {
        Self {
            registry,
            settings: Arc::new(MemorySettings::default()),
            notifier: ConfigChangeNotifier::global().clone(),
            faults: Arc::new(TracingFaultReporter),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_settings(mut self, settings: Arc<dyn SettingsStore>) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_notifier(mut self, notifier: ConfigChangeNotifier) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_fault_reporter(mut self, faults: Arc<dyn FaultReporter>) -> Self {
        self.faults = faults;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn registry(&self) -> &dyn SinkRegistry {
        self.registry.as_ref()
    }

    pub fn settings(&self) -> &dyn SettingsStore {
        self.settings.as_ref()
    }

    pub fn notifier(&self) -> &ConfigChangeNotifier {
        &self.notifier
    }

    pub fn faults(&self) -> &dyn FaultReporter {
        self.faults.as_ref()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }
}

impl fmt::Debug for BridgeEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeEnvironment")
            .field("notifier", &self.notifier)
            .finish_non_exhaustive()
    }
}
