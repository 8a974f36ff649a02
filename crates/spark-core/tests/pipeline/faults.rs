use std::sync::Arc;

use spark_core::{
    ByteBuf, Capabilities, ChannelHandler, Context, CoreError, LogSeverity, Pipeline,
    PipelineMessage, Result,
    error::codes,
    test_stubs::{EmbeddedChannel, RecordingLogger},
};

use super::{Failing, Journal, Recorder};

fn payload() -> PipelineMessage {
    ByteBuf::copy_from_slice(b"x").expect("非空").into()
}

#[test]
fn fault_goes_to_the_failing_handler_when_it_handles_errors() {
    struct SelfHealing(Journal);

    impl ChannelHandler for SelfHealing {
        fn capabilities(&self) -> Capabilities {
            Capabilities::READ | Capabilities::ERROR
        }

        fn on_read(&self, _ctx: &Context<'_>, _msg: PipelineMessage) -> Result<()> {
            Err(CoreError::new(codes::PROTOCOL_TOO_LONG_FRAME, "too long"))
        }

        fn on_exception_caught(&self, ctx: &Context<'_>, error: CoreError) -> Result<()> {
            self.0.push(format!(
                "self:{}@{}",
                error.code(),
                ctx.fault_origin().unwrap_or("-")
            ));
            Ok(())
        }
    }

    let journal = Journal::default();
    let channel = EmbeddedChannel::new();
    channel
        .add_handler("healing", Arc::new(SelfHealing(journal.clone())))
        .expect("登记 Handler");
    channel.write_inbound(payload());

    assert_eq!(
        journal.snapshot(),
        [format!("self:{}@healing", codes::PROTOCOL_TOO_LONG_FRAME)]
    );
    assert!(channel.take_faults().is_empty(), "自身已处理，不再向后传递");
}

#[test]
fn fault_skips_forward_to_nearest_error_handler_with_origin() {
    let journal = Journal::default();
    let channel = EmbeddedChannel::new();
    channel
        .add_handler("failing", Arc::new(Failing { caps: Capabilities::READ }))
        .expect("登记失败 Handler");
    channel
        .add_handler("reader", Recorder::new("reader", Capabilities::READ, &journal))
        .expect("登记读 Handler");
    channel
        .add_handler("guard", Recorder::new("guard", Capabilities::ERROR, &journal))
        .expect("登记错误 Handler");

    channel.write_inbound(payload());

    assert_eq!(
        journal.snapshot(),
        [format!("guard:error@failing:{}", codes::PROTOCOL_CORRUPTED_FRAME)],
        "读 Handler 未声明错误能力，不应被调用"
    );
}

#[test]
fn forwarded_fault_keeps_original_origin() {
    let channel = EmbeddedChannel::new();
    channel
        .add_handler(
            "failing",
            Arc::new(Failing {
                caps: Capabilities::READ | Capabilities::ERROR,
            }),
        )
        .expect("登记失败 Handler");

    channel.write_inbound(payload());

    let faults = channel.take_faults_with_origin();
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0].0.code(), codes::PROTOCOL_CORRUPTED_FRAME);
    assert_eq!(faults[0].1.as_deref(), Some("failing"));
}

#[test]
fn unhandled_fault_is_logged_and_not_rethrown() {
    let logger = Arc::new(RecordingLogger::new());
    let pipeline = Pipeline::detached(logger.clone());
    pipeline
        .add_last("failing", Arc::new(Failing { caps: Capabilities::READ }))
        .expect("登记失败 Handler");

    pipeline.fire_read(payload());

    assert!(logger.contains(LogSeverity::Warn, "unhandled fault raised at context `failing`"));
}

#[test]
fn fault_does_not_break_subsequent_events() {
    struct FailOnce {
        failed: std::sync::atomic::AtomicBool,
        journal: Journal,
    }

    impl ChannelHandler for FailOnce {
        fn capabilities(&self) -> Capabilities {
            Capabilities::READ
        }

        fn on_read(&self, ctx: &Context<'_>, msg: PipelineMessage) -> Result<()> {
            if !self.failed.swap(true, std::sync::atomic::Ordering::SeqCst) {
                return Err(CoreError::new(codes::PROTOCOL_CORRUPTED_FRAME, "first read"));
            }
            self.journal.push("fail-once:read");
            ctx.fire_read(msg);
            Ok(())
        }
    }

    let journal = Journal::default();
    let channel = EmbeddedChannel::new();
    channel
        .add_handler(
            "fail-once",
            Arc::new(FailOnce {
                failed: Default::default(),
                journal: journal.clone(),
            }),
        )
        .expect("登记 Handler");
    channel.activate();

    channel.write_inbound(payload());
    assert!(channel.read_inbound().is_none());
    assert_eq!(channel.take_faults().len(), 1);

    channel.write_inbound(payload());
    assert_eq!(journal.snapshot(), ["fail-once:read"]);
    assert!(channel.read_inbound().is_some(), "后续事件正常分发");
}

#[test]
fn failing_error_handler_is_only_logged() {
    struct Broken;

    impl ChannelHandler for Broken {
        fn capabilities(&self) -> Capabilities {
            Capabilities::READ | Capabilities::ERROR
        }

        fn on_read(&self, _ctx: &Context<'_>, _msg: PipelineMessage) -> Result<()> {
            Err(CoreError::new(codes::PROTOCOL_CORRUPTED_FRAME, "read"))
        }

        fn on_exception_caught(&self, _ctx: &Context<'_>, _error: CoreError) -> Result<()> {
            Err(CoreError::new(codes::CONFIG_INVALID, "handler broke"))
        }
    }

    let logger = Arc::new(RecordingLogger::new());
    let channel = EmbeddedChannel::with_logger(logger.clone());
    channel
        .add_handler("broken", Arc::new(Broken))
        .expect("登记 Handler");
    channel.write_inbound(payload());

    assert!(channel.take_faults().is_empty(), "错误处理者自身失败时不再继续路由");
    assert!(logger.contains(LogSeverity::Warn, codes::CONFIG_INVALID));
}
