//! 片段写入前端的端到端验证：按键归拢、TTL 淘汰、作用域关联键与持有 Sink 的生命周期。

use std::{sync::Arc, thread, time::Duration};

use spark_log_bridge::{
    BridgeEnvironment, ConfigChangeNotifier, CorrelationKey, CorrelationScope, FragmentWriter,
    ManualClock, MemorySettings, MemorySinkRegistry, REQUEST_LIFESPAN_ATTRIBUTE, SharedSink,
    test_stubs::{RecordingSink, SinkCall},
};

fn environment(sink: &Arc<RecordingSink>) -> (BridgeEnvironment, Arc<MemorySettings>, ManualClock) {
    let default: SharedSink = sink.clone();
    let settings = Arc::new(MemorySettings::new());
    let clock = ManualClock::new();
    let env = BridgeEnvironment::new(Arc::new(MemorySinkRegistry::new(default)))
        .with_settings(settings.clone())
        .with_notifier(ConfigChangeNotifier::new())
        .with_clock(Arc::new(clock.clone()));
    (env, settings, clock)
}

#[test]
fn statement_is_merged_and_label_defaults_to_text() {
    let sink = RecordingSink::new("default");
    let (env, _, _) = environment(&sink);
    let writer = FragmentWriter::activate(None, env);
    let key = CorrelationKey::from("request-1");

    for fragment in ["SELECT 1", "FROM t", ""] {
        writer.write_for(&key, fragment).expect("写入应成功");
    }

    assert_eq!(
        sink.calls(),
        vec![SinkCall::Sql {
            label: "SELECT 1FROM t".into(),
            sql: "SELECT 1FROM t".into(),
        }]
    );
}

#[test]
fn interleaved_keys_never_mix() {
    let sink = RecordingSink::new("default");
    let (env, _, _) = environment(&sink);
    let writer = FragmentWriter::activate(Some("SQL".into()), env);
    let a = CorrelationKey::from("a");
    let b = CorrelationKey::from("b");

    writer.write_for(&a, "UPDATE a ").expect("写入应成功");
    writer.write_for(&b, "DELETE b ").expect("写入应成功");
    writer.write_for(&a, "SET x = 1").expect("写入应成功");
    writer.write_for(&b, "\n").expect("写入应成功");
    writer.write_for(&a, "").expect("写入应成功");

    assert_eq!(
        sink.sql(),
        vec![
            ("SQL".to_owned(), "DELETE b ".to_owned()),
            ("SQL".to_owned(), "UPDATE a SET x = 1".to_owned()),
        ]
    );
}

#[test]
fn abandoned_context_expires_without_dispatch() {
    let sink = RecordingSink::new("default");
    let (env, settings, clock) = environment(&sink);
    settings.set_request_object_attribute(REQUEST_LIFESPAN_ATTRIBUTE, "10");
    let writer = FragmentWriter::activate(None, env);
    let key = CorrelationKey::from("abandoned");

    writer.write_for(&key, "partial").expect("写入应成功");
    clock.advance(Duration::from_secs(11));
    assert_eq!(writer.correlator().sweep_expired(), 1);
    assert!(sink.calls().is_empty(), "过期内容不得被发送");

    writer.write_for(&key, "fresh").expect("写入应成功");
    writer.write_for(&key, "").expect("写入应成功");
    assert_eq!(sink.sql(), vec![("fresh".to_owned(), "fresh".to_owned())]);
}

#[test]
fn scope_key_routes_writes_across_calls() {
    let sink = RecordingSink::new("default");
    let (env, _, _) = environment(&sink);
    let writer = FragmentWriter::activate(Some("q".into()), env);

    {
        let _scope = CorrelationScope::enter("order-42");
        writer.write("SELECT *").expect("写入应成功");
    }
    writer.write("unrelated").expect("写入应成功");
    {
        let _scope = CorrelationScope::enter("order-42");
        writer.write(" FROM orders").expect("写入应成功");
        writer.write("").expect("写入应成功");
    }

    assert_eq!(
        sink.sql(),
        vec![("q".to_owned(), "SELECT * FROM orders".to_owned())]
    );
    assert!(writer.correlator().contains(CorrelationKey::for_current_thread().as_str()));
}

#[test]
fn threads_without_scope_use_their_own_keys() {
    let sink = RecordingSink::new("default");
    let (env, _, _) = environment(&sink);
    let writer = Arc::new(FragmentWriter::activate(Some("t".into()), env));

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let writer = Arc::clone(&writer);
            thread::spawn(move || {
                let id = worker.to_string();
                for part in ["w", id.as_str(), ";"] {
                    writer.write(part).expect("写入应成功");
                }
                writer.write(" ").expect("写入应成功");
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("线程不应 panic");
    }

    let mut statements: Vec<_> = sink.sql().into_iter().map(|(_, sql)| sql).collect();
    statements.sort();
    assert_eq!(statements, vec!["w0;", "w1;", "w2;", "w3;"]);
}

#[test]
fn owned_sink_is_used_and_closed_once() {
    let registry_sink = RecordingSink::new("default");
    let (env, _, _) = environment(&registry_sink);
    let owned = RecordingSink::new("owned");
    let writer = FragmentWriter::with_owned_sink(None, owned.clone(), env.clone());

    writer.write_for(&"k".into(), "SELECT 2").expect("写入应成功");
    writer.write_for(&"k".into(), "").expect("写入应成功");
    assert_eq!(env.notifier().notify_changed(), 1);
    writer.write_for(&"k".into(), "SELECT 3").expect("写入应成功");
    writer.write_for(&"k".into(), "").expect("写入应成功");
    drop(writer);

    assert_eq!(
        owned.calls(),
        vec![
            SinkCall::Sql {
                label: "SELECT 2".into(),
                sql: "SELECT 2".into(),
            },
            SinkCall::Sql {
                label: "SELECT 3".into(),
                sql: "SELECT 3".into(),
            },
            SinkCall::Close,
        ]
    );
    assert!(registry_sink.calls().is_empty());
    assert_eq!(env.notifier().subscriber_count(), 0);
}
