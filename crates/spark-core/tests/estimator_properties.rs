//! 接收尺寸估算器的性质测试。

use proptest::prelude::*;
use spark_core::{RecvBufferConfig, RecvSizeEstimator, buffer::SIZE_TABLE};

fn config() -> impl Strategy<Value = RecvBufferConfig> {
    (0usize..SIZE_TABLE.len(), 0usize..SIZE_TABLE.len(), 0usize..SIZE_TABLE.len()).prop_map(
        |(a, b, c)| {
            let mut picks = [SIZE_TABLE[a], SIZE_TABLE[b], SIZE_TABLE[c]];
            picks.sort_unstable();
            RecvBufferConfig::new(picks[0], picks[1], picks[2])
        },
    )
}

proptest! {
    /// 任意 `record` 序列下下标始终位于 `[min_index, max_index]`。
    #[test]
    fn index_stays_within_bounds(
        config in config(),
        reads in prop::collection::vec(0usize..200_000, 0..128),
    ) {
        let mut estimator = RecvSizeEstimator::new(config).expect("表内取值的配置合法");
        for bytes in reads {
            estimator.record(bytes);
            prop_assert!(estimator.min_index() <= estimator.index());
            prop_assert!(estimator.index() <= estimator.max_index());
            prop_assert!(estimator.next_size() >= config.minimum);
            prop_assert!(estimator.next_size() <= config.maximum);
        }
    }

    /// 单次小读取不会收缩预测，连续两次才会。
    #[test]
    fn single_small_read_never_shrinks(config in config()) {
        let mut estimator = RecvSizeEstimator::new(config).expect("配置合法");
        let before = estimator.index();
        estimator.record(0);
        prop_assert_eq!(estimator.index(), before);
        estimator.record(0);
        prop_assert_eq!(estimator.index(), before.saturating_sub(1).max(estimator.min_index()));
    }

    /// 填满缓冲的读取总是增长，或停在 `max_index`。
    #[test]
    fn full_read_grows_or_saturates(config in config(), rounds in 1usize..8) {
        let mut estimator = RecvSizeEstimator::new(config).expect("配置合法");
        for _ in 0..rounds {
            let before = estimator.index();
            estimator.record(estimator.next_size());
            if before == estimator.max_index() {
                prop_assert_eq!(estimator.index(), before);
            } else {
                prop_assert!(estimator.index() > before);
            }
        }
    }
}

#[test]
fn full_read_at_table_start_grows() {
    let mut estimator =
        RecvSizeEstimator::new(RecvBufferConfig::new(16, 16, 1024)).expect("配置合法");
    assert_eq!(estimator.index(), 0);
    estimator.record(16);
    assert_eq!(estimator.index(), 4, "表首读满同样触发增长");
}

#[test]
fn config_deserializes_with_defaults() {
    let config: RecvBufferConfig = toml::from_str("maximum = 8192").expect("解析配置");
    assert_eq!(config, RecvBufferConfig::new(64, 1024, 8192));
}
