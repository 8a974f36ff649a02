use criterion::{Criterion, black_box};
use spark_core::{ByteBuf, RecvBufferConfig, RecvSizeEstimator};
use std::{env, time::Duration};

/// 缓冲读写往返与接收尺寸估算的基准。
///
/// # 逻辑解析（How）
/// - `byte_buf_numeric_roundtrip`：从 64 字节起步写入 1 KiB 混合字节序整数，触发若干次扩容，再全部读回；
/// - `byte_buf_compaction`：反复写入、读取半数后压缩，衡量 `discard_read_bytes` 的搬移成本；
/// - `estimator_record`：模拟突发流量下的 `record` 序列。
fn bench_byte_buf(c: &mut Criterion) {
    c.bench_function("byte_buf_numeric_roundtrip", |b| {
        b.iter(|| {
            let mut buf = ByteBuf::with_capacity(64).expect("非零容量");
            for i in 0..64_u64 {
                buf.write_u64(i).expect("写入大端");
                buf.write_u64_le(i).expect("写入小端");
            }
            let mut sum = 0_u64;
            while buf.readable_bytes() >= 16 {
                sum = sum.wrapping_add(buf.read_u64().expect("读取大端"));
                sum = sum.wrapping_add(buf.read_u64_le().expect("读取小端"));
            }
            black_box(sum)
        });
    });

    c.bench_function("byte_buf_compaction", |b| {
        let chunk = [7_u8; 256];
        b.iter(|| {
            let mut buf = ByteBuf::with_capacity(1024).expect("非零容量");
            let mut scratch = [0_u8; 128];
            for _ in 0..32 {
                buf.write_bytes(&chunk).expect("写入");
                buf.read_into(&mut scratch).expect("读取");
                buf.discard_read_bytes();
            }
            black_box(buf.readable_bytes())
        });
    });
}

fn bench_estimator(c: &mut Criterion) {
    c.bench_function("estimator_record", |b| {
        b.iter(|| {
            let mut estimator =
                RecvSizeEstimator::new(RecvBufferConfig::default()).expect("默认配置有效");
            for round in 0..256_usize {
                let observed = if round % 16 == 0 { 65_536 } else { 300 };
                estimator.record(observed);
            }
            black_box(estimator.next_size())
        });
    });
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

    bench_byte_buf(&mut criterion);
    bench_estimator(&mut criterion);
    criterion.final_summary();
}
