use criterion::Criterion;
use spark_log_bridge::{
    BridgeEnvironment, ConfigChangeNotifier, CorrelationKey, FragmentWriter, MemorySinkRegistry,
    RequestCorrelator,
};
use std::{env, hint::black_box, sync::Arc, time::Duration};

/// 关联器热路径基准：三段片段追加后收尾。
///
/// # 设计背景（Why）
/// - 每条语句都要经过“取或建上下文 → 追加 → 移除”，这条路径的回归会直接体现在生产者延迟上；
/// - 预先填充一批闲置上下文，模拟真实进程中并存的在途请求。
fn bench_append_finalize(c: &mut Criterion) {
    let correlator = RequestCorrelator::new(Duration::from_secs(10));
    for idle in 0..1024 {
        let _ = correlator.append(&CorrelationKey::from(format!("idle-{idle}")), "pending");
    }
    let key = CorrelationKey::from("hot");

    c.bench_function("correlator_append_finalize", |b| {
        b.iter(|| {
            let _ = correlator.append(&key, "SELECT id ");
            let _ = correlator.append(&key, "FROM orders ");
            let _ = correlator.append(&key, "WHERE id = 1");
            black_box(correlator.append(&key, ""))
        });
    });
}

/// 经写入前端的完整路径：关联键解析、快照读取与 Sink 发送。
fn bench_writer_statement(c: &mut Criterion) {
    let registry = MemorySinkRegistry::new(Arc::new(NullSink));
    let env = BridgeEnvironment::new(Arc::new(registry)).with_notifier(ConfigChangeNotifier::new());
    let writer = FragmentWriter::activate(Some("bench".into()), env);

    c.bench_function("fragment_writer_statement", |b| {
        b.iter(|| {
            writer.write("SELECT 1").ok();
            black_box(writer.write(""))
        });
    });
}

/// 基准用的空 Sink，避免记录型桩的内存增长影响测量。
struct NullSink;

impl spark_log_bridge::LogSink for NullSink {
    fn send(
        &self,
        _kind: spark_log_bridge::MessageKind,
        _message: &str,
        _details: Option<&str>,
    ) -> Result<(), spark_log_bridge::SinkError> {
        Ok(())
    }

    fn send_sql(&self, label: &str, sql: &str) -> Result<(), spark_log_bridge::SinkError> {
        black_box((label, sql));
        Ok(())
    }

    fn enter_scope(&self, _label: &str) -> Result<(), spark_log_bridge::SinkError> {
        Ok(())
    }

    fn exit_scope(&self, _label: &str) -> Result<(), spark_log_bridge::SinkError> {
        Ok(())
    }
}

fn main() {
    let mut quick_mode = false;
    for arg in env::args().skip(1) {
        if arg == "--quick" {
            quick_mode = true;
        }
    }

    let mut criterion = Criterion::default();
    if quick_mode {
        criterion = criterion
            .sample_size(10)
            .warm_up_time(Duration::from_millis(100))
            .measurement_time(Duration::from_millis(250));
    }

    bench_append_finalize(&mut criterion);
    bench_writer_statement(&mut criterion);
    criterion.final_summary();
}
