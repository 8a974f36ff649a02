use std::sync::Arc;

use proptest::prelude::*;
use spark_core::{
    ByteBuf, Capabilities, LogSeverity, Pipeline, PipelineMessage,
    error::codes,
    test_stubs::{EmbeddedChannel, RecordingLogger},
};

use super::{Journal, Recorder};

fn payload() -> PipelineMessage {
    ByteBuf::copy_from_slice(b"payload").expect("非空").into()
}

proptest! {
    /// 只有第 k 个 Handler 声明读能力时，读事件只命中它，与链长无关。
    #[test]
    fn read_reaches_only_the_declaring_handler((n, k) in (1usize..12).prop_flat_map(|n| (Just(n), 0..n))) {
        let journal = Journal::default();
        let pipeline = Pipeline::default();
        for i in 0..n {
            let caps = if i == k { Capabilities::READ } else { Capabilities::WRITE | Capabilities::ACTIVE };
            let name = format!("h{i}");
            pipeline.add_last(&name, Recorder::new(name.clone(), caps, &journal)).expect("登记 Handler");
        }
        pipeline.fire_read(payload());
        let expected = vec![format!("h{k}:read")];
        prop_assert_eq!(journal.snapshot(), expected);
    }
}

#[test]
fn inbound_runs_head_to_tail_and_outbound_tail_to_head() {
    let journal = Journal::default();
    let channel = EmbeddedChannel::new();
    for name in ["a", "b", "c"] {
        channel
            .add_handler(name, Recorder::new(name, Capabilities::ALL, &journal))
            .expect("登记 Handler");
    }
    channel.activate();
    channel.write_inbound(payload());
    channel.write_outbound(payload());

    assert_eq!(
        journal.snapshot(),
        [
            "a:active", "b:active", "c:active", "a:read", "b:read", "c:read", "c:write",
            "b:write", "a:write",
        ]
    );
    assert!(channel.read_inbound().is_some(), "读事件到达链尾");
    assert!(channel.read_outbound().is_some(), "写入经链头交给连接");
}

#[test]
fn handlers_without_capability_are_skipped() {
    let journal = Journal::default();
    let channel = EmbeddedChannel::new();
    channel
        .add_handler("reader", Recorder::new("reader", Capabilities::READ, &journal))
        .expect("登记读 Handler");
    channel
        .add_handler("writer", Recorder::new("writer", Capabilities::WRITE, &journal))
        .expect("登记写 Handler");
    channel.activate();
    channel.write_inbound(payload());
    channel.write_outbound(payload());
    assert_eq!(journal.snapshot(), ["reader:read", "writer:write"]);
}

#[test]
fn context_write_starts_before_the_calling_handler() {
    struct Echo;

    impl spark_core::ChannelHandler for Echo {
        fn capabilities(&self) -> Capabilities {
            Capabilities::READ
        }

        fn on_read(&self, ctx: &spark_core::Context<'_>, msg: PipelineMessage) -> spark_core::Result<()> {
            ctx.write(msg);
            Ok(())
        }
    }

    let journal = Journal::default();
    let channel = EmbeddedChannel::new();
    channel
        .add_handler("outer", Recorder::new("outer", Capabilities::WRITE, &journal))
        .expect("登记外层");
    channel.add_handler("echo", Arc::new(Echo)).expect("登记回显");
    channel
        .add_handler("inner", Recorder::new("inner", Capabilities::WRITE, &journal))
        .expect("登记内层");

    channel.write_inbound(payload());
    assert_eq!(journal.snapshot(), ["outer:write"], "内层位于回显之后，不参与其写出");
    assert!(channel.read_outbound().is_some());
}

#[test]
fn unconsumed_read_is_reported_as_diagnostic() {
    let logger = Arc::new(RecordingLogger::new());
    let pipeline = Pipeline::detached(logger.clone());
    pipeline.fire_read(payload());
    assert!(logger.contains(LogSeverity::Warn, "dropped"));
}

#[test]
fn write_without_channel_surfaces_write_unconsumed() {
    let logger = Arc::new(RecordingLogger::new());
    let pipeline = Pipeline::detached(logger.clone());
    pipeline.write(payload());
    assert!(logger.contains(LogSeverity::Warn, codes::PIPELINE_WRITE_UNCONSUMED));
}
