//! 关联器性质验证
//!
//! - **核心目标 (Why)**：对任意交错的追加、收尾、时间推进与清扫序列，关联器的可观测输出
//!   必须与一个朴素的影子模型一致：同键片段按序拼接、不同键互不污染、过期内容永不返回；
//! - **手法 (How)**：影子模型保存“缓冲 + 最近触达秒数”，并把过期条目视同不存在；
//!   惰性清扫何时发生不影响任何输出，因此模型无需模拟它；
//! - **边界 (What)**：显式清扫之后，存量上下文数量必须等于模型中未过期的条目数。

use std::{collections::HashMap, sync::Arc, time::Duration};

use proptest::prelude::*;
use spark_log_bridge::{CorrelationKey, Fragment, ManualClock, RequestCorrelator};

const LIFESPAN_SECS: u64 = 3;
const KEYS: [&str; 3] = ["alpha", "beta", "gamma"];

#[derive(Clone, Debug)]
enum Op {
    Append(usize, String),
    Finish(usize, String),
    Advance(u64),
    Sweep,
}

fn ops() -> impl Strategy<Value = Vec<Op>> {
    let op = prop_oneof![
        4 => (0..KEYS.len(), "[a-z]{1,4}").prop_map(|(key, text)| Op::Append(key, text)),
        2 => (0..KEYS.len(), "[ \t]{0,2}").prop_map(|(key, text)| Op::Finish(key, text)),
        2 => (0..=4u64).prop_map(Op::Advance),
        1 => Just(Op::Sweep),
    ];
    prop::collection::vec(op, 0..64)
}

#[derive(Default)]
struct Model {
    now: u64,
    contexts: HashMap<usize, (String, u64)>,
}

impl Model {
    fn is_live(&self, touched: u64) -> bool {
        self.now - touched <= LIFESPAN_SECS
    }

    fn append(&mut self, key: usize, text: &str) {
        let now = self.now;
        let live = self
            .contexts
            .get(&key)
            .is_some_and(|(_, touched)| self.is_live(*touched));
        let entry = self.contexts.entry(key).or_default();
        if !live {
            entry.0.clear();
        }
        entry.0.push_str(text);
        entry.1 = now;
    }

    fn finish(&mut self, key: usize) -> String {
        match self.contexts.remove(&key) {
            Some((buffer, touched)) if self.is_live(touched) => buffer,
            _ => String::new(),
        }
    }

    fn sweep(&mut self) -> usize {
        let now = self.now;
        self.contexts
            .retain(|_, (_, touched)| now - *touched <= LIFESPAN_SECS);
        self.contexts.len()
    }
}

proptest! {
    #[test]
    fn prop_correlator_matches_shadow_model(ops in ops()) {
        let clock = ManualClock::new();
        let correlator = RequestCorrelator::with_clock(
            Duration::from_secs(LIFESPAN_SECS),
            Arc::new(clock.clone()),
        );
        let keys: Vec<CorrelationKey> = KEYS.iter().map(|key| CorrelationKey::from(*key)).collect();
        let mut model = Model::default();

        for op in &ops {
            match op {
                Op::Append(key, text) => {
                    prop_assert_eq!(correlator.append(&keys[*key], text), Fragment::Buffered);
                    model.append(*key, text);
                }
                Op::Finish(key, text) => {
                    let expected = model.finish(*key);
                    prop_assert_eq!(correlator.append(&keys[*key], text), Fragment::Finished(expected));
                    prop_assert!(!correlator.contains(KEYS[*key]));
                }
                Op::Advance(secs) => {
                    clock.advance(Duration::from_secs(*secs));
                    model.now += secs;
                }
                Op::Sweep => {
                    correlator.sweep_expired();
                    prop_assert_eq!(correlator.len(), model.sweep());
                }
            }
        }
    }

    #[test]
    fn prop_finalize_returns_each_context_once(parts in prop::collection::vec("[a-z]{1,3}", 1..16)) {
        let correlator = RequestCorrelator::default();
        let key = CorrelationKey::from("single");
        for part in &parts {
            let _ = correlator.append(&key, part);
        }
        prop_assert_eq!(correlator.finalize(&key), parts.concat());
        prop_assert_eq!(correlator.finalize(&key), String::new());
        prop_assert!(correlator.is_empty());
    }
}
