//! 分级事件前端。
//!
//! # 教案式说明
//! - **意图（Why）**：上游框架以“级别 + 已渲染文本”的形式调用桥接层，`LogAppender` 负责分类并交给分发器；
//! - **契约（What）**：每次 `append` 只读取一次快照，分类、组装与发送都基于这一份快照；
//!   选项变化经 [`LogAppender::set_options`] 或全局变更通知触发重建；
//! - **风险（Trade-offs）**：`set_options` 与通知可能并发触发重建，二者由 [`ConfigState`] 串行化，
//!   最后完成的一次决定最终快照。

use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::{BridgeOptions, ConfigState, OptionsSource, SinkSelector};
use crate::dispatch::{self, LogEvent};
use crate::env::BridgeEnvironment;
use crate::error::BridgeError;
use crate::settings::SettingsStore;
use crate::severity::{Classification, classify};

/// 分级事件前端的可变选项。三个字段都以原始字符串保存，由重建统一解析。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AppenderOptions {
    /// 绑定的 Sink 实例名；未登记时使用注册表默认 Sink。
    pub instance_name: String,
    pub display_level: String,
    pub display_location: String,
}

impl AppenderOptions {
    pub fn new(instance_name: impl Into<String>) -> Self {
        Self {
            instance_name: instance_name.into(),
            ..Self::default()
        }
    }

    pub fn with_display_level(mut self, value: impl Into<String>) -> Self {
        self.display_level = value.into();
        self
    }

    pub fn with_display_location(mut self, value: impl Into<String>) -> Self {
        self.display_location = value.into();
        self
    }
}

struct AppenderOptionsSource(Arc<RwLock<AppenderOptions>>);

impl OptionsSource for AppenderOptionsSource {
    fn load(&self, _settings: &dyn SettingsStore) -> Result<BridgeOptions, BridgeError> {
        let options = self.0.read();
        Ok(BridgeOptions {
            sink: SinkSelector::Instance(options.instance_name.clone()),
            display_level: options.display_level.clone(),
            display_location: options.display_location.clone(),
            request_lifespan: None,
        })
    }
}

/// 分级事件前端。
#[derive(Debug)]
pub struct LogAppender {
    options: Arc<RwLock<AppenderOptions>>,
    config: Arc<ConfigState>,
}

impl LogAppender {
    /// 故障上报中使用的组件名。
    pub const COMPONENT: &'static str = "LogAppender";

    pub fn activate(options: AppenderOptions, env: BridgeEnvironment) -> Self {
        let options = Arc::new(RwLock::new(options));
        let config = ConfigState::activate(
            Self::COMPONENT,
            AppenderOptionsSource(Arc::clone(&options)),
            env,
            None,
        );
        Self { options, config }
    }

    pub fn options(&self) -> AppenderOptions {
        self.options.read().clone()
    }

    /// 替换选项并立即重建，返回重建是否成功。失败时保留旧快照。
    pub fn set_options(&self, options: AppenderOptions) -> bool {
        *self.options.write() = options;
        self.config.rebuild()
    }

    pub fn config(&self) -> &Arc<ConfigState> {
        &self.config
    }

    /// 处理一条分级事件。
    ///
    /// `Info` 级别且以作用域标记开头的事件转为作用域信号，其余按级别映射后发送。
    pub fn append(&self, event: &LogEvent) -> Result<(), BridgeError> {
        let snapshot = self.config.current();
        match classify(event.level(), event.message()) {
            Classification::Scope { direction, label } => {
                dispatch::scope(&snapshot, direction, label)
            }
            Classification::Message(kind) => dispatch::send(&snapshot, kind, event),
        }
    }

    /// 退订变更通知。之后仍可发送，但快照不再随通知更新。
    pub fn close(&self) {
        self.config.teardown();
    }
}
