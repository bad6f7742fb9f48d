//! # 配置变更通知
//!
//! ## 核心意图（Why）
//! - 组件需要在外部配置变化时自行重建，而不是轮询；
//! - 订阅关系以 RAII 守卫 [`Subscription`] 表达：守卫析构即退订，任何退出路径（包括错误路径）
//!   都不会遗留悬挂的观察者。
//!
//! ## 行为契约（What）
//! - 通知器只持有观察者的 `Weak` 引用，不延长观察者生命周期；
//! - `notify_changed` 在释放内部锁之后才回调观察者，观察者可以在回调中安全地退订；
//! - 进程级实例通过 [`ConfigChangeNotifier::global`] 获取。

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;

/// 配置变更观察者。
pub trait ConfigObserver: Send + Sync {
    fn on_config_changed(&self);
}

type ObserverSlot = (u64, Weak<dyn ConfigObserver>);

#[derive(Default)]
struct NotifierInner {
    next_id: AtomicU64,
    observers: Mutex<Vec<ObserverSlot>>,
}

/// 配置变更通知器。克隆体共享同一观察者列表。
#[derive(Clone, Default)]
pub struct ConfigChangeNotifier {
    inner: Arc<NotifierInner>,
}

static GLOBAL_NOTIFIER: OnceLock<ConfigChangeNotifier> = OnceLock::new();

impl ConfigChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// 进程级通知器。
    pub fn global() -> &'static ConfigChangeNotifier {
        GLOBAL_NOTIFIER.get_or_init(Self::new)
    }

    /// 登记观察者，返回的守卫析构时自动退订。
    pub fn subscribe(&self, observer: Weak<dyn ConfigObserver>) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.observers.lock().push((id, observer));
        Subscription {
            id,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// 通知所有仍存活的观察者，返回被回调的观察者数量。
    pub fn notify_changed(&self) -> usize {
        let live: Vec<Arc<dyn ConfigObserver>> = {
            let mut observers = self.inner.observers.lock();
            observers.retain(|(_, observer)| observer.strong_count() > 0);
            observers
                .iter()
                .filter_map(|(_, observer)| observer.upgrade())
                .collect()
        };
        for observer in &live {
            observer.on_config_changed();
        }
        live.len()
    }

    /// 当前登记的订阅数量（含尚未清理的失效观察者）。
    pub fn subscriber_count(&self) -> usize {
        self.inner.observers.lock().len()
    }
}

impl fmt::Debug for ConfigChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigChangeNotifier")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// 订阅守卫。析构时从通知器中移除对应观察者；通知器已释放时析构为空操作。
#[must_use = "dropping the subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    registry: Weak<NotifierInner>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.registry.upgrade() {
            inner.observers.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
