//! # 请求关联器
//!
//! ## 设计动机（Why）
//! - 上游把一条逻辑消息拆成多次片段写入，最后以一个空白片段表示结束；
//!   多个请求并发写入时，必须按请求把片段归拢，不能互相污染。
//! - 未正常结束的请求会遗留缓冲区，因此每个上下文都带“最近触达时间”，闲置超过存活时长即被淘汰。
//!
//! ## 核心契约（What）
//! - 状态机：`Absent → Accumulating → Removed`。`finalize` 返回文本并移除；过期淘汰丢弃文本；
//! - 已过期但尚未清扫的上下文视同已移除：新的追加从空缓冲开始，`finalize` 返回空串；
//! - 同一键的追加与结束经 `DashMap` 条目锁串行化，不同键之间没有全局锁；
//! - 惰性清扫在 `append` 中触发，每个存活时长内至多一次，也可显式调用 [`RequestCorrelator::sweep_expired`]。
//!
//! ## 风险提示（Trade-offs）
//! - 惰性清扫由恰好触发它的生产者线程承担，耗时与存量上下文数量成正比；
//! - 以线程标识派生的键在线程复用时可能串联两个请求，依赖 TTL 限定影响范围。

use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::settings::DEFAULT_REQUEST_LIFESPAN_SECS;

/// 关联上下文的不透明键。
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationKey(Arc<str>);

impl CorrelationKey {
    pub fn new(key: impl Into<Arc<str>>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 调用线程上最内层 [`CorrelationScope`] 的键；没有活动作用域时回落到线程键。
    pub fn current() -> Self {
        ACTIVE_SCOPES
            .with(|scopes| scopes.borrow().last().cloned())
            .unwrap_or_else(Self::for_current_thread)
    }

    /// 由当前线程标识派生的键。
    pub fn for_current_thread() -> Self {
        Self::new(format!("thread:{:?}", std::thread::current().id()))
    }
}

impl fmt::Debug for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CorrelationKey").field(&&*self.0).finish()
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CorrelationKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for CorrelationKey {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl std::borrow::Borrow<str> for CorrelationKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

thread_local! {
    static ACTIVE_SCOPES: RefCell<Vec<CorrelationKey>> = const { RefCell::new(Vec::new()) };
}

/// 线程内的关联作用域守卫。
///
/// # 教案式注释
/// - **意图 (Why)**：让只能写“当前请求”的上游无需显式传键；
/// - **契约 (What)**：作用域可嵌套，最内层生效；守卫析构即弹出，且不可跨线程移动；
/// - **风险 (Trade-offs)**：守卫必须按进入的逆序析构，否则弹出的会是更内层的键。
#[must_use = "the scope ends as soon as the guard is dropped"]
pub struct CorrelationScope {
    key: CorrelationKey,
    _not_send: PhantomData<Rc<()>>,
}

impl CorrelationScope {
    pub fn enter(key: impl Into<CorrelationKey>) -> Self {
        let key = key.into();
        ACTIVE_SCOPES.with(|scopes| scopes.borrow_mut().push(key.clone()));
        Self {
            key,
            _not_send: PhantomData,
        }
    }

    pub fn key(&self) -> &CorrelationKey {
        &self.key
    }
}

impl Drop for CorrelationScope {
    fn drop(&mut self) {
        ACTIVE_SCOPES.with(|scopes| {
            scopes.borrow_mut().pop();
        });
    }
}

impl fmt::Debug for CorrelationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrelationScope")
            .field("key", &self.key)
            .finish()
    }
}

/// 一次追加的结果。
#[must_use]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fragment {
    /// 片段已并入缓冲，消息尚未结束。
    Buffered,
    /// 空白片段结束了消息，携带合并后的文本（可能为空）。
    Finished(String),
}

#[derive(Debug)]
struct CorrelationContext {
    buffer: String,
    last_touched: Instant,
}

impl CorrelationContext {
    fn is_expired(&self, now: Instant, lifespan: Duration) -> bool {
        now.saturating_duration_since(self.last_touched) > lifespan
    }
}

/// 按关联键累积片段的存储。
pub struct RequestCorrelator {
    contexts: DashMap<CorrelationKey, CorrelationContext>,
    lifespan_ms: AtomicU64,
    last_sweep: Mutex<Instant>,
    clock: Arc<dyn Clock>,
}

impl RequestCorrelator {
    pub fn new(lifespan: Duration) -> Self {
        Self::with_clock(lifespan, Arc::new(SystemClock))
    }

    pub fn with_clock(lifespan: Duration, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            contexts: DashMap::new(),
            lifespan_ms: AtomicU64::new(duration_to_millis(lifespan)),
            last_sweep: Mutex::new(now),
            clock,
        }
    }

    /// 追加一个片段。
    ///
    /// 去除首尾空白后为空的片段结束消息，等价于 [`RequestCorrelator::finalize`]；
    /// 其余片段原样并入该键的缓冲。
    pub fn append(&self, key: &CorrelationKey, text: &str) -> Fragment {
        if text.trim().is_empty() {
            return Fragment::Finished(self.finalize(key));
        }

        let now = self.clock.now();
        let lifespan = self.lifespan();
        // 清扫需要遍历全部分片，必须在持有条目锁之前完成。
        self.maybe_sweep(now, lifespan);

        let mut context = self
            .contexts
            .entry(key.clone())
            .or_insert_with(|| CorrelationContext {
                buffer: String::new(),
                last_touched: now,
            });
        if context.is_expired(now, lifespan) {
            context.buffer.clear();
        }
        context.buffer.push_str(text);
        context.last_touched = now;
        Fragment::Buffered
    }

    /// 移除并返回该键累积的文本；键不存在或上下文已过期时返回空串。
    pub fn finalize(&self, key: &CorrelationKey) -> String {
        let now = self.clock.now();
        let lifespan = self.lifespan();
        match self.contexts.remove(key) {
            Some((_, context)) if !context.is_expired(now, lifespan) => context.buffer,
            _ => String::new(),
        }
    }

    /// 淘汰闲置超过存活时长的上下文，返回淘汰数量。被淘汰的文本不会分发。
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let lifespan = self.lifespan();
        let mut evicted = 0usize;
        self.contexts.retain(|_, context| {
            let expired = context.is_expired(now, lifespan);
            evicted += usize::from(expired);
            !expired
        });
        *self.last_sweep.lock() = now;
        if evicted > 0 {
            debug!(
                evicted,
                remaining = self.contexts.len(),
                lifespan_ms = duration_to_millis(lifespan),
                "swept idle correlation contexts"
            );
        }
        evicted
    }

    /// 丢弃全部上下文，返回丢弃数量。
    pub fn clear(&self) -> usize {
        let discarded = self.contexts.len();
        self.contexts.clear();
        discarded
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.contexts.contains_key(key)
    }

    pub fn lifespan(&self) -> Duration {
        Duration::from_millis(self.lifespan_ms.load(Ordering::Acquire))
    }

    /// 调整存活时长，对已有上下文立即生效。
    pub fn set_lifespan(&self, lifespan: Duration) {
        self.lifespan_ms
            .store(duration_to_millis(lifespan), Ordering::Release);
    }

    fn maybe_sweep(&self, now: Instant, lifespan: Duration) {
        let due = match self.last_sweep.try_lock() {
            Some(mut last) if now.saturating_duration_since(*last) >= lifespan => {
                *last = now;
                true
            }
            _ => false,
        };
        if due {
            self.sweep_expired();
        }
    }
}

impl Default for RequestCorrelator {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_REQUEST_LIFESPAN_SECS))
    }
}

impl fmt::Debug for RequestCorrelator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestCorrelator")
            .field("contexts", &self.contexts.len())
            .field("lifespan", &self.lifespan())
            .finish_non_exhaustive()
    }
}

fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
