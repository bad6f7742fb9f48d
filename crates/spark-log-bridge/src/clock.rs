//! 可注入时钟。
//!
//! # 设计背景（Why）
//! - 关联上下文的 TTL 淘汰依赖“最近触达时间”；直接调用系统时钟会让过期相关的测试依赖真实等待。
//! - 通过 trait 注入时钟：生产环境使用 [`SystemClock`]，测试使用 [`ManualClock`] 手动推进时间。
//!
//! # 接口约束（What）
//! - `now` 必须单调不减。

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// 单调时间来源。
pub trait Clock: Send + Sync + 'static {
    /// 返回当前的单调时间点。
    fn now(&self) -> Instant;
}

/// 直接委托给 [`Instant::now`] 的系统时钟。
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// 手动推进的虚拟时钟。
///
/// # 行为概览（How）
/// - 构造时记录基准 [`Instant`]，之后 `now` 返回“基准 + 累积偏移”；
/// - `advance` 只增不减，克隆体共享同一偏移。
#[derive(Clone, Debug)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Arc<Mutex<Duration>>,
}

impl ManualClock {
    /// 以当前系统时间为基准构造。
    pub fn new() -> Self {
        Self::with_start(Instant::now())
    }

    /// 以指定基准构造。
    pub fn with_start(origin: Instant) -> Self {
        Self {
            origin,
            elapsed: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// 推进虚拟时间。
    pub fn advance(&self, delta: Duration) {
        let mut elapsed = self.elapsed.lock();
        *elapsed = elapsed.saturating_add(delta);
    }

    /// 自基准起累积的虚拟时间。
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.elapsed.lock()
    }
}
