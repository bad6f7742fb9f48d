//! # 热更新配置状态
//!
//! ## 设计动机（Why）
//! - 多个生产者线程并发发送日志，而 Sink 绑定与显示开关可能随时被外部改写；
//!   发送路径不能因为配置重建而被阻塞，也不能读到“新 Sink + 旧开关”这类撕裂状态。
//! - 采用 RCU 式布局：不可变的 [`ConfigSnapshot`] 放在 `ArcSwap` 中，写者“重建后整体替换”，
//!   读者每次操作只读取一次引用。
//!
//! ## 核心契约（What）
//! - `current()` 无锁，返回某一时刻完整的快照；在途发送继续使用它读到的旧快照，属于可接受的短暂陈旧；
//! - 重建之间由互斥锁串行化，但从不阻塞读者；
//! - 重建失败时上报故障通道并保留旧快照，系统始终有可用快照；
//! - 激活时同步构建首个快照并订阅变更通知，`teardown`/析构时退订。
//!
//! ## 风险提示（Trade-offs）
//! - 高频重建会短暂保留多份旧快照，直到在途发送释放引用。

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::debug;

use crate::env::BridgeEnvironment;
use crate::error::BridgeError;
use crate::notify::{ConfigObserver, Subscription};
use crate::settings::{self, DEFAULT_REQUEST_LIFESPAN_SECS, SettingsStore};
use crate::sink::SharedSink;

/// 当前生效配置的不可变快照。
#[derive(Clone)]
pub struct ConfigSnapshot {
    sink: SharedSink,
    display_level: bool,
    display_location: bool,
    request_lifespan: Duration,
}

impl ConfigSnapshot {
    pub fn new(
        sink: SharedSink,
        display_level: bool,
        display_location: bool,
        request_lifespan: Duration,
    ) -> Self {
        Self {
            sink,
            display_level,
            display_location,
            request_lifespan,
        }
    }

    /// 只绑定 Sink、其余取默认值的兜底快照。
    pub fn fallback(sink: SharedSink) -> Self {
        Self::new(
            sink,
            false,
            false,
            Duration::from_secs(DEFAULT_REQUEST_LIFESPAN_SECS),
        )
    }

    pub fn sink(&self) -> &SharedSink {
        &self.sink
    }

    pub fn display_level(&self) -> bool {
        self.display_level
    }

    pub fn display_location(&self) -> bool {
        self.display_location
    }

    /// 关联上下文的存活时长。
    pub fn request_lifespan(&self) -> Duration {
        self.request_lifespan
    }
}

impl fmt::Debug for ConfigSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigSnapshot")
            .field("display_level", &self.display_level)
            .field("display_location", &self.display_location)
            .field("request_lifespan", &self.request_lifespan)
            .finish_non_exhaustive()
    }
}

/// Sink 的选择方式。
#[derive(Clone)]
pub enum SinkSelector {
    /// 按实例名经注册表解析；未登记时回落到默认 Sink。
    Instance(String),
    /// 调用方持有的固定 Sink，重建时不再解析。
    Owned(SharedSink),
}

impl fmt::Debug for SinkSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instance(name) => f.debug_tuple("Instance").field(name).finish(),
            Self::Owned(_) => f.write_str("Owned(..)"),
        }
    }
}

/// 一次重建读到的原始选项。显示开关保持字符串形态，由重建统一解析。
///
/// `request_lifespan` 只由持有关联器的组件读取；`None` 时快照使用默认存活时长。
#[derive(Clone, Debug)]
pub struct BridgeOptions {
    pub sink: SinkSelector,
    pub display_level: String,
    pub display_location: String,
    pub request_lifespan: Option<Duration>,
}

/// 重建时的选项来源。
///
/// - **契约 (What)**：`load` 可能访问外部配置存储，失败以 [`BridgeError`] 返回；
///   `fallback_sink` 给出首次构建失败时应使用的 Sink，`None` 表示使用注册表默认 Sink。
pub trait OptionsSource: Send + Sync + 'static {
    fn load(&self, settings: &dyn SettingsStore) -> Result<BridgeOptions, BridgeError>;

    fn fallback_sink(&self) -> Option<SharedSink> {
        None
    }
}

/// 每次成功换入快照后调用的钩子。
pub type ReloadHook = Box<dyn Fn(&ConfigSnapshot) + Send + Sync>;

/// 热更新配置容器。
///
/// # 教案式注释
/// - **意图 (Why)**：把“读无锁、写串行、失败保留旧值”三条规则封装在一处，前端组件只需读快照；
/// - **契约 (What)**：`config_epoch()` 从 0 开始，每次成功换入递增 1；
/// - **实现 (How)**：`ArcSwap::load_full` 读、`ArcSwap::store` 写；重建由 `rebuild_gate` 串行化。
pub struct ConfigState {
    component: &'static str,
    snapshot: ArcSwap<ConfigSnapshot>,
    epoch: AtomicU64,
    rebuild_gate: Mutex<()>,
    source: Box<dyn OptionsSource>,
    env: BridgeEnvironment,
    on_reload: Option<ReloadHook>,
    subscription: Mutex<Option<Subscription>>,
}

impl ConfigState {
    /// 同步构建首个快照并订阅变更通知。
    ///
    /// 首次构建失败不会让组件处于未配置状态：故障被上报，快照回落为
    /// [`OptionsSource::fallback_sink`] 或注册表默认 Sink 的 [`ConfigSnapshot::fallback`]。
    pub fn activate(
        component: &'static str,
        source: impl OptionsSource,
        env: BridgeEnvironment,
        on_reload: Option<ReloadHook>,
    ) -> Arc<Self> {
        let initial = match build_snapshot(&source, &env) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                env.faults().publish(&err, &fault_context(component));
                let sink = source
                    .fallback_sink()
                    .unwrap_or_else(|| env.registry().default_sink());
                ConfigSnapshot::fallback(sink)
            }
        };
        if let Some(hook) = &on_reload {
            hook(&initial);
        }

        Arc::new_cyclic(|weak: &Weak<ConfigState>| {
            let observer: Weak<dyn ConfigObserver> = weak.clone();
            let subscription = env.notifier().subscribe(observer);
            Self {
                component,
                snapshot: ArcSwap::from_pointee(initial),
                epoch: AtomicU64::new(0),
                rebuild_gate: Mutex::new(()),
                source: Box::new(source),
                env,
                on_reload,
                subscription: Mutex::new(Some(subscription)),
            }
        })
    }

    /// 当前快照。
    pub fn current(&self) -> Arc<ConfigSnapshot> {
        self.snapshot.load_full()
    }

    pub fn config_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    pub fn component(&self) -> &'static str {
        self.component
    }

    /// 重建并换入新快照，返回是否成功。失败时旧快照保持不变。
    pub fn rebuild(&self) -> bool {
        let _gate = self.rebuild_gate.lock();
        match build_snapshot(self.source.as_ref(), &self.env) {
            Ok(next) => {
                let next = Arc::new(next);
                self.snapshot.store(Arc::clone(&next));
                let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some(hook) = &self.on_reload {
                    hook(&next);
                }
                debug!(
                    component = self.component,
                    epoch,
                    display_level = next.display_level(),
                    display_location = next.display_location(),
                    "configuration snapshot swapped"
                );
                true
            }
            Err(err) => {
                self.env
                    .faults()
                    .publish(&err, &fault_context(self.component));
                false
            }
        }
    }

    /// 退订变更通知，返回本次调用是否真正释放了订阅。
    pub fn teardown(&self) -> bool {
        self.subscription.lock().take().is_some()
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.lock().is_some()
    }
}

impl ConfigObserver for ConfigState {
    fn on_config_changed(&self) {
        self.rebuild();
    }
}

impl fmt::Debug for ConfigState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigState")
            .field("component", &self.component)
            .field("epoch", &self.config_epoch())
            .field("snapshot", &self.current())
            .finish_non_exhaustive()
    }
}

fn fault_context(component: &str) -> String {
    format!("failed during: {component}::on_config_changed")
}

fn build_snapshot(
    source: &dyn OptionsSource,
    env: &BridgeEnvironment,
) -> Result<ConfigSnapshot, BridgeError> {
    let options = source.load(env.settings())?;
    let sink = match options.sink {
        SinkSelector::Owned(sink) => sink,
        SinkSelector::Instance(instance) => env
            .registry()
            .get(&instance)
            .map_err(|source| BridgeError::SinkResolution {
                instance: instance.clone(),
                source,
            })?
            .unwrap_or_else(|| env.registry().default_sink()),
    };
    Ok(ConfigSnapshot::new(
        sink,
        settings::parse_flag(&options.display_level),
        settings::parse_flag(&options.display_location),
        options
            .request_lifespan
            .unwrap_or(Duration::from_secs(DEFAULT_REQUEST_LIFESPAN_SECS)),
    ))
}
