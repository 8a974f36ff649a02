use std::sync::Arc;

use spark_core::{
    ByteBuf, Capabilities, ChannelHandler, Context, LogSeverity, Pipeline, PipelineMessage,
    Result,
    error::codes,
    test_stubs::{EmbeddedChannel, RecordingLogger},
};

use super::{Journal, Recorder};

fn payload() -> PipelineMessage {
    ByteBuf::copy_from_slice(b"m").expect("非空").into()
}

fn names(pipeline: &Pipeline) -> Vec<String> {
    pipeline.names()
}

#[test]
fn insertion_points_follow_base_names() {
    let journal = Journal::default();
    let pipeline = Pipeline::default();
    pipeline
        .add_last("b", Recorder::new("b", Capabilities::READ, &journal))
        .expect("add_last");
    pipeline
        .add_first("a", Recorder::new("a", Capabilities::READ, &journal))
        .expect("add_first");
    pipeline
        .add_after("b", "d", Recorder::new("d", Capabilities::READ, &journal))
        .expect("add_after");
    pipeline
        .add_before("d", "c", Recorder::new("c", Capabilities::READ, &journal))
        .expect("add_before");
    assert_eq!(names(&pipeline), ["a", "b", "c", "d"]);
    assert_eq!(pipeline.len(), 4);
    assert!(pipeline.contains("c"));
}

#[test]
fn mutation_errors_are_typed() {
    struct Inert;

    impl ChannelHandler for Inert {
        fn capabilities(&self) -> Capabilities {
            Capabilities::NONE
        }
    }

    let journal = Journal::default();
    let pipeline = Pipeline::default();
    pipeline
        .add_last("a", Recorder::new("a", Capabilities::READ, &journal))
        .expect("add_last");

    let duplicate = pipeline
        .add_last("a", Recorder::new("a", Capabilities::READ, &journal))
        .expect_err("重名");
    assert_eq!(duplicate.code(), codes::PIPELINE_DUPLICATE_NAME);

    let reserved = pipeline
        .add_last("head", Recorder::new("head", Capabilities::READ, &journal))
        .expect_err("保留名");
    assert_eq!(reserved.code(), codes::PIPELINE_DUPLICATE_NAME);

    let unknown = pipeline
        .add_before("missing", "x", Recorder::new("x", Capabilities::READ, &journal))
        .expect_err("基准不存在");
    assert_eq!(unknown.code(), codes::PIPELINE_UNKNOWN_CONTEXT);

    let inert = pipeline.add_last("inert", Arc::new(Inert)).expect_err("无能力");
    assert_eq!(inert.code(), codes::PIPELINE_INVALID_HANDLER);

    let empty = pipeline
        .add_last("", Recorder::new("", Capabilities::READ, &journal))
        .expect_err("空名称");
    assert_eq!(empty.code(), codes::CONFIG_INVALID);

    let missing = pipeline
        .remove("missing")
        .map(|_| ())
        .expect_err("移除不存在");
    assert_eq!(missing.code(), codes::PIPELINE_UNKNOWN_CONTEXT);
    assert_eq!(names(&pipeline), ["a"], "失败的变更不改变链");
    assert_eq!(pipeline.epoch(), 1, "只有成功的变更推进纪元");
}

#[test]
fn remove_and_replace_return_previous_handlers() {
    let journal = Journal::default();
    let channel = EmbeddedChannel::new();
    channel
        .add_handler("old", Recorder::new("old", Capabilities::READ, &journal))
        .expect("登记");

    let previous = channel
        .pipeline()
        .replace("old", "new", Recorder::new("new", Capabilities::READ, &journal))
        .expect("替换");
    assert_eq!(previous.capabilities(), Capabilities::READ);
    assert!(!channel.pipeline().contains("old"));

    channel.write_inbound(payload());
    assert_eq!(journal.snapshot(), ["new:read"]);

    channel.pipeline().remove("new").expect("移除");
    channel.write_inbound(payload());
    assert_eq!(journal.snapshot(), ["new:read"], "移除后不再收到事件");
    assert_eq!(
        channel.pipeline().names(),
        [EmbeddedChannel::SINK],
        "只剩捕获 Handler"
    );
}

#[test]
fn replace_keeps_position_and_may_reuse_name() {
    let journal = Journal::default();
    let pipeline = Pipeline::default();
    for name in ["a", "b", "c"] {
        pipeline
            .add_last(name, Recorder::new(name, Capabilities::READ, &journal))
            .expect("登记");
    }
    pipeline
        .replace("b", "b", Recorder::new("b2", Capabilities::READ, &journal))
        .expect("同名替换");
    let taken = pipeline
        .replace("b", "c", Recorder::new("c2", Capabilities::READ, &journal))
        .map(|_| ())
        .expect_err("新名称被占用");
    assert_eq!(taken.code(), codes::PIPELINE_DUPLICATE_NAME);

    pipeline.fire_read(payload());
    assert_eq!(journal.snapshot(), ["a:read", "b2:read", "c:read"]);
}

/// 在分发过程中移除后继 Handler：进行中的遍历使用旧快照，下一次分发使用新链。
#[test]
fn mutation_during_dispatch_applies_to_next_event() {
    struct RemoveNext {
        target: &'static str,
        journal: Journal,
    }

    impl ChannelHandler for RemoveNext {
        fn capabilities(&self) -> Capabilities {
            Capabilities::READ
        }

        fn on_read(&self, ctx: &Context<'_>, msg: PipelineMessage) -> Result<()> {
            self.journal.push("remover:read");
            if ctx.pipeline().contains(self.target) {
                ctx.pipeline().remove(self.target)?;
            }
            ctx.fire_read(msg);
            Ok(())
        }
    }

    let journal = Journal::default();
    let channel = EmbeddedChannel::new();
    channel
        .add_handler(
            "remover",
            Arc::new(RemoveNext {
                target: "victim",
                journal: journal.clone(),
            }),
        )
        .expect("登记");
    channel
        .add_handler("victim", Recorder::new("victim", Capabilities::READ, &journal))
        .expect("登记");

    channel.write_inbound(payload());
    channel.write_inbound(payload());

    assert_eq!(
        journal.snapshot(),
        ["remover:read", "victim:read", "remover:read"]
    );
    assert!(channel.read_inbound().is_some());
    assert!(channel.read_inbound().is_some(), "两条消息都到达链尾");
}

#[test]
fn concurrent_mutations_are_serialized() {
    let journal = Journal::default();
    let pipeline = Arc::new(Pipeline::default());
    let workers: Vec<_> = (0..8)
        .map(|worker| {
            let pipeline = Arc::clone(&pipeline);
            let journal = journal.clone();
            std::thread::spawn(move || {
                for i in 0..16 {
                    let name = format!("w{worker}-{i}");
                    pipeline
                        .add_last(&name, Recorder::new(name.clone(), Capabilities::READ, &journal))
                        .expect("并发登记");
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("线程结束");
    }
    assert_eq!(pipeline.len(), 128);
    assert_eq!(pipeline.epoch(), 128);
}

#[test]
fn committed_mutations_are_logged_with_epoch() {
    let logger = Arc::new(RecordingLogger::new());
    let pipeline = Pipeline::detached(logger.clone());
    let journal = Journal::default();
    pipeline
        .add_last("a", Recorder::new("a", Capabilities::READ, &journal))
        .expect("登记");
    pipeline.remove("a").expect("移除");
    assert!(logger.contains(LogSeverity::Debug, "pipeline.mutation applied epoch=1"));
    assert!(logger.contains(LogSeverity::Debug, "pipeline.mutation applied epoch=2"));
}
