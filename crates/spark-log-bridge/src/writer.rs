//! # 片段写入前端
//!
//! ## 设计动机（Why）
//! - 部分上游只会“往一个文本流里写”，一条语句被拆成若干次写入，以一次空白写入收尾；
//! - `FragmentWriter` 用 [`RequestCorrelator`] 按关联键归拢片段，收尾时把合并文本作为语句消息发送。
//!
//! ## 核心契约（What）
//! - 非空白片段只进入缓冲，不触达 Sink；空白片段结束消息，即便缓冲为空也会发送一条空语句；
//! - 语句的展示标题为构造时给定的 `label`，未给定时使用语句文本本身；
//! - 未持有 Sink 时，实例名取自扩展属性 `("fragmentWriter", "instance")`，默认 `"fragmentWriter"`；
//!   持有 Sink 时始终使用它，且关闭时一并关闭；
//! - 存活时长随每次重建推送给关联器。
//!
//! ## 风险提示（Trade-offs）
//! - 关闭时尚未收尾的缓冲被丢弃而不是补发，避免把半条语句当成完整消息。

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::debug;

use crate::config::{
    BridgeOptions, ConfigSnapshot, ConfigState, OptionsSource, ReloadHook, SinkSelector,
};
use crate::correlator::{CorrelationKey, Fragment, RequestCorrelator};
use crate::dispatch;
use crate::env::BridgeEnvironment;
use crate::error::BridgeError;
use crate::settings::{self, DEFAULT_REQUEST_LIFESPAN_SECS, SettingsStore};
use crate::sink::SharedSink;

/// 片段写入前端在配置存储中的扩展名。
pub const EXTENSION_NAME: &str = "fragmentWriter";
/// 选择 Sink 实例的扩展属性名。
pub const INSTANCE_ATTRIBUTE: &str = "instance";

struct FragmentOptionsSource {
    owned: Option<SharedSink>,
}

impl OptionsSource for FragmentOptionsSource {
    fn load(&self, settings: &dyn SettingsStore) -> Result<BridgeOptions, BridgeError> {
        let sink = match &self.owned {
            Some(sink) => SinkSelector::Owned(Arc::clone(sink)),
            None => SinkSelector::Instance(settings.extension_attribute(
                EXTENSION_NAME,
                INSTANCE_ATTRIBUTE,
                EXTENSION_NAME,
            )?),
        };
        Ok(BridgeOptions {
            sink,
            display_level: String::new(),
            display_location: String::new(),
            request_lifespan: Some(settings::request_lifespan(settings)?),
        })
    }

    fn fallback_sink(&self) -> Option<SharedSink> {
        self.owned.clone()
    }
}

/// 片段写入前端。
///
/// # 教案式注释
/// - **意图 (Why)**：把“按请求归拢片段”与“热更新的 Sink 绑定”组合成一个可被多线程共享的写入器；
/// - **契约 (What)**：`write` 使用 [`CorrelationKey::current`]，`write_for` 使用显式键；
///   `close` 幂等，关闭后的写入被忽略；析构时自动关闭；
/// - **实现 (How)**：重建钩子持有关联器的 `Arc`，每次换入快照后同步存活时长；
///   追加后再次检查关闭标志，保证与 `close` 并发的写入不会留下缓冲。
pub struct FragmentWriter {
    label: Option<String>,
    config: Arc<ConfigState>,
    correlator: Arc<RequestCorrelator>,
    owned_sink: Option<SharedSink>,
    closed: AtomicBool,
}

impl FragmentWriter {
    /// 故障上报中使用的组件名。
    pub const COMPONENT: &'static str = "FragmentWriter";

    /// 经注册表解析 Sink 的写入器。
    pub fn activate(label: Option<String>, env: BridgeEnvironment) -> Self {
        Self::build(label, None, env)
    }

    /// 使用调用方交出的 Sink；写入器关闭时负责关闭它。
    pub fn with_owned_sink(label: Option<String>, sink: SharedSink, env: BridgeEnvironment) -> Self {
        Self::build(label, Some(sink), env)
    }

    fn build(label: Option<String>, owned_sink: Option<SharedSink>, env: BridgeEnvironment) -> Self {
        let correlator = Arc::new(RequestCorrelator::with_clock(
            Duration::from_secs(DEFAULT_REQUEST_LIFESPAN_SECS),
            env.clock(),
        ));
        let hook_target = Arc::clone(&correlator);
        let on_reload: ReloadHook = Box::new(move |snapshot: &ConfigSnapshot| {
            hook_target.set_lifespan(snapshot.request_lifespan())
        });
        let config = ConfigState::activate(
            Self::COMPONENT,
            FragmentOptionsSource {
                owned: owned_sink.clone(),
            },
            env,
            Some(on_reload),
        );
        Self {
            label,
            config,
            correlator,
            owned_sink,
            closed: AtomicBool::new(false),
        }
    }

    /// 以调用线程当前的关联键写入片段。
    pub fn write(&self, fragment: &str) -> Result<(), BridgeError> {
        self.write_for(&CorrelationKey::current(), fragment)
    }

    /// 以显式关联键写入片段。
    pub fn write_for(&self, key: &CorrelationKey, fragment: &str) -> Result<(), BridgeError> {
        if self.is_closed() {
            debug!(key = %key, "fragment writer closed, ignoring write");
            return Ok(());
        }
        match self.correlator.append(key, fragment) {
            Fragment::Buffered => {
                // `close` 可能在检查与追加之间完成清空，此时由写入方自行丢弃残留缓冲。
                if self.is_closed() {
                    self.correlator.finalize(key);
                }
                Ok(())
            }
            Fragment::Finished(_) if self.is_closed() => {
                debug!(key = %key, "fragment writer closed, dropping finished statement");
                Ok(())
            }
            Fragment::Finished(text) => {
                let snapshot = self.config.current();
                let label = self.label.as_deref().unwrap_or(&text);
                dispatch::send_sql(&snapshot, label, &text)
            }
        }
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn correlator(&self) -> &RequestCorrelator {
        &self.correlator
    }

    pub fn config(&self) -> &Arc<ConfigState> {
        &self.config
    }

    pub fn owns_sink(&self) -> bool {
        self.owned_sink.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// 退订通知、丢弃未收尾的缓冲，并关闭持有的 Sink。重复调用为空操作。
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.config.teardown();
        let discarded = self.correlator.clear();
        if discarded > 0 {
            debug!(discarded, "discarded unterminated fragment buffers on close");
        }
        if let Some(sink) = &self.owned_sink {
            sink.close();
        }
    }
}

impl Drop for FragmentWriter {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for FragmentWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FragmentWriter")
            .field("label", &self.label)
            .field("owns_sink", &self.owns_sink())
            .field("closed", &self.is_closed())
            .field("correlator", &self.correlator)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::ConfigChangeNotifier;
    use crate::settings::{MemorySettings, REQUEST_LIFESPAN_ATTRIBUTE};
    use crate::sink::MemorySinkRegistry;
    use crate::test_stubs::{RecordingSink, SinkCall};
    use tracing_test::traced_test;

    struct Fixture {
        default: Arc<RecordingSink>,
        named: Arc<RecordingSink>,
        settings: Arc<MemorySettings>,
        env: BridgeEnvironment,
    }

    fn fixture() -> Fixture {
        let default = RecordingSink::new("default");
        let named = RecordingSink::new("fragmentWriter");
        let registry = MemorySinkRegistry::new(default.clone());
        registry.register("fragmentWriter", named.clone());
        let settings = Arc::new(MemorySettings::new());
        let env = BridgeEnvironment::new(Arc::new(registry))
            .with_settings(settings.clone())
            .with_notifier(ConfigChangeNotifier::new());
        Fixture {
            default,
            named,
            settings,
            env,
        }
    }

    #[test]
    fn unlabeled_statement_uses_text_as_label() {
        let fx = fixture();
        let writer = FragmentWriter::activate(None, fx.env.clone());
        let key = CorrelationKey::from("req");
        for fragment in ["SELECT 1", "FROM t", ""] {
            writer.write_for(&key, fragment).expect("写入应成功");
        }
        assert_eq!(
            fx.named.sql(),
            vec![("SELECT 1FROM t".to_owned(), "SELECT 1FROM t".to_owned())]
        );
        assert!(fx.default.calls().is_empty());
    }

    #[test]
    fn blank_write_without_buffer_sends_empty_statement() {
        let fx = fixture();
        let writer = FragmentWriter::activate(Some("LINQ".into()), fx.env.clone());
        writer.write_for(&"k".into(), "   ").expect("写入应成功");
        assert_eq!(fx.named.sql(), vec![("LINQ".to_owned(), String::new())]);
    }

    #[test]
    fn instance_attribute_selects_sink() {
        let fx = fixture();
        fx.settings
            .set_extension_attribute(EXTENSION_NAME, INSTANCE_ATTRIBUTE, "nobody");
        let writer = FragmentWriter::activate(Some("q".into()), fx.env.clone());
        writer.write_for(&"k".into(), "x").expect("写入应成功");
        writer.write_for(&"k".into(), "").expect("写入应成功");
        assert_eq!(fx.default.sql(), vec![("q".to_owned(), "x".to_owned())]);
    }

    #[test]
    fn reload_pushes_lifespan_into_correlator() {
        let fx = fixture();
        fx.settings
            .set_request_object_attribute(REQUEST_LIFESPAN_ATTRIBUTE, "3");
        let writer = FragmentWriter::activate(None, fx.env.clone());
        assert_eq!(writer.correlator().lifespan(), Duration::from_secs(3));

        fx.settings
            .set_request_object_attribute(REQUEST_LIFESPAN_ATTRIBUTE, "20");
        assert_eq!(fx.env.notifier().notify_changed(), 1);
        assert_eq!(writer.correlator().lifespan(), Duration::from_secs(20));
    }

    #[traced_test]
    #[test]
    fn close_discards_buffers_and_closes_owned_sink() {
        let fx = fixture();
        let owned = RecordingSink::new("owned");
        let writer = FragmentWriter::with_owned_sink(None, owned.clone(), fx.env.clone());
        writer.write_for(&"k".into(), "partial").expect("写入应成功");

        writer.close();
        writer.close();
        assert!(writer.correlator().is_empty());
        assert!(!writer.config().is_subscribed());
        assert_eq!(owned.calls(), vec![SinkCall::Close]);
        assert!(logs_contain("discarded unterminated fragment buffers on close"));

        writer.write_for(&"k".into(), "").expect("关闭后写入被忽略");
        assert_eq!(owned.calls(), vec![SinkCall::Close]);
    }

    #[test]
    fn drop_closes_owned_sink_but_not_registry_sink() {
        let fx = fixture();
        let owned = RecordingSink::new("owned");
        drop(FragmentWriter::with_owned_sink(None, owned.clone(), fx.env.clone()));
        drop(FragmentWriter::activate(None, fx.env.clone()));
        assert!(owned.is_closed());
        assert!(!fx.named.is_closed());
    }

    #[test]
    fn writes_racing_close_leave_no_buffers() {
        let fx = fixture();
        let writer = Arc::new(FragmentWriter::activate(None, fx.env.clone()));
        let start = Arc::new(std::sync::Barrier::new(5));
        let producers: Vec<_> = (0..4)
            .map(|worker| {
                let writer = Arc::clone(&writer);
                let start = Arc::clone(&start);
                std::thread::spawn(move || {
                    let key = CorrelationKey::from(format!("producer-{worker}"));
                    start.wait();
                    while !writer.is_closed() {
                        writer.write_for(&key, "SELECT 1").expect("写入应成功");
                    }
                    for _ in 0..100 {
                        writer.write_for(&key, "late").expect("关闭后写入被忽略");
                    }
                })
            })
            .collect();

        start.wait();
        std::thread::sleep(Duration::from_millis(5));
        writer.close();
        for producer in producers {
            producer.join().expect("写线程不应 panic");
        }

        assert!(writer.correlator().is_empty());
        assert!(fx.named.sql().is_empty());
    }
}
