//! 测试桩：内存连接 [`EmbeddedChannel`] 与记录型日志 [`RecordingLogger`]。
//!
//! # 设计定位（Why）
//! - Handler 与编解码器的行为只依赖 Pipeline 契约，不依赖真实套接字；内存连接让单元测试
//!   可以同步地注入入站字节、收集出站消息与故障，断言不受调度时序影响。
//! - 各 crate 的测试共用同一套桩，避免在每个测试文件重复定义捕获 Handler。
//!
//! # 使用方式（How）
//! - `EmbeddedChannel::new()` 创建未激活的连接，链尾预置名为 [`EmbeddedChannel::SINK`] 的捕获 Handler；
//! - [`add_handler`](EmbeddedChannel::add_handler) 把被测 Handler 插入到捕获 Handler 之前；
//! - `write_inbound` / `read_inbound` 驱动并读取入站方向，`write_outbound` / `read_outbound` 对应出站方向；
//! - 到达捕获 Handler 的故障可通过 [`take_faults`](EmbeddedChannel::take_faults) 取出。
//!
//! # 契约说明（What）
//! - 出站消息由链头交给 [`Channel::send`]，进入内存队列；连接关闭后 `send` 返回 `transport.closed`；
//! - 所有分发在调用线程同步完成。

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::buffer::PipelineMessage;
use crate::channel::{Attributes, Channel, ChannelId, ChannelLifecycle, ChannelState};
use crate::error::{CoreError, Result, codes};
use crate::observability::{LogRecord, LogSeverity, Logger, shared_noop_logger};
use crate::pipeline::{Capabilities, ChannelHandler, Context, Pipeline};

/// 记录全部日志的 [`Logger`]，供断言诊断输出。
#[derive(Debug, Default)]
pub struct RecordingLogger {
    entries: spin::Mutex<Vec<(LogSeverity, String)>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已记录的 `(级别, 消息)` 快照。
    pub fn entries(&self) -> Vec<(LogSeverity, String)> {
        self.entries.lock().clone()
    }

    /// 是否存在指定级别且包含 `needle` 的日志。
    pub fn contains(&self, severity: LogSeverity, needle: &str) -> bool {
        self.entries
            .lock()
            .iter()
            .any(|(level, message)| *level == severity && message.contains(needle))
    }
}

impl Logger for RecordingLogger {
    fn log(&self, record: &LogRecord<'_>) {
        let message = match record.error {
            Some(error) => format!("{} ({error})", record.message),
            None => record.message.to_string(),
        };
        self.entries.lock().push((record.severity, message));
    }
}

#[derive(Default)]
struct SinkState {
    inbound: spin::Mutex<VecDeque<PipelineMessage>>,
    faults: spin::Mutex<Vec<(CoreError, Option<String>)>>,
    active: AtomicBool,
    inactive: AtomicBool,
}

/// 链尾的捕获 Handler。
struct Sink(Arc<SinkState>);

impl ChannelHandler for Sink {
    fn capabilities(&self) -> Capabilities {
        Capabilities::INBOUND
    }

    fn on_channel_active(&self, _ctx: &Context<'_>) -> Result<()> {
        self.0.active.store(true, Ordering::Release);
        Ok(())
    }

    fn on_channel_inactive(&self, _ctx: &Context<'_>) -> Result<()> {
        self.0.inactive.store(true, Ordering::Release);
        Ok(())
    }

    fn on_read(&self, _ctx: &Context<'_>, msg: PipelineMessage) -> Result<()> {
        self.0.inbound.lock().push_back(msg);
        Ok(())
    }

    fn on_exception_caught(&self, ctx: &Context<'_>, error: CoreError) -> Result<()> {
        let origin = ctx.fault_origin().map(str::to_owned);
        self.0.faults.lock().push((error, origin));
        Ok(())
    }
}

struct EmbeddedCore {
    id: ChannelId,
    lifecycle: ChannelLifecycle,
    attributes: Attributes,
    pipeline: Pipeline,
    outbound: spin::Mutex<VecDeque<PipelineMessage>>,
}

impl Channel for EmbeddedCore {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn state(&self) -> ChannelState {
        self.lifecycle.state()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        None
    }

    fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    fn send(&self, msg: PipelineMessage) -> Result<()> {
        if self.lifecycle.state() == ChannelState::Closed {
            return Err(CoreError::new(
                codes::TRANSPORT_CLOSED,
                format!("embedded channel {} is closed", self.id),
            ));
        }
        self.outbound.lock().push_back(msg);
        Ok(())
    }

    fn close(&self) {
        if self.lifecycle.deactivate() {
            self.pipeline.fire_channel_inactive();
        }
        self.lifecycle.mark_closed();
    }
}

/// 内存中的连接，实现完整的 [`Channel`] 契约。
pub struct EmbeddedChannel {
    core: Arc<EmbeddedCore>,
    sink: Arc<SinkState>,
}

impl EmbeddedChannel {
    /// 预置捕获 Handler 的名称。
    pub const SINK: &'static str = "embedded-sink";

    pub fn new() -> Self {
        Self::with_logger(shared_noop_logger())
    }

    pub fn with_logger(logger: Arc<dyn Logger>) -> Self {
        let core = Arc::new_cyclic(|weak: &Weak<EmbeddedCore>| {
            let channel: Weak<dyn Channel> = weak.clone();
            EmbeddedCore {
                id: ChannelId::next(),
                lifecycle: ChannelLifecycle::new(),
                attributes: Attributes::new(),
                pipeline: Pipeline::new(channel, logger),
                outbound: spin::Mutex::new(VecDeque::new()),
            }
        });
        let sink = Arc::new(SinkState::default());
        let registered = core
            .pipeline
            .add_last(Self::SINK, Arc::new(Sink(Arc::clone(&sink))));
        debug_assert!(registered.is_ok(), "空链上登记捕获 Handler 不会失败");
        Self { core, sink }
    }

    /// 把 Handler 插入到捕获 Handler 之前。
    pub fn add_handler(&self, name: &str, handler: Arc<dyn ChannelHandler>) -> Result<()> {
        self.core.pipeline.add_before(Self::SINK, name, handler)
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.core.pipeline
    }

    pub fn channel(&self) -> Arc<dyn Channel> {
        self.core.clone()
    }

    /// 进入活跃状态并触发 `active` 事件；重复调用无效果。
    pub fn activate(&self) {
        if self.core.lifecycle.activate() {
            self.core.pipeline.fire_channel_active();
        }
    }

    pub fn write_inbound(&self, msg: impl Into<PipelineMessage>) {
        self.core.pipeline.fire_read(msg);
    }

    /// 取出最早到达链尾的入站消息。
    pub fn read_inbound(&self) -> Option<PipelineMessage> {
        self.sink.inbound.lock().pop_front()
    }

    pub fn write_outbound(&self, msg: impl Into<PipelineMessage>) {
        self.core.pipeline.write(msg);
    }

    /// 取出最早由链头交给连接的出站消息。
    pub fn read_outbound(&self) -> Option<PipelineMessage> {
        self.core.outbound.lock().pop_front()
    }

    /// 取出到达捕获 Handler 的全部故障。
    pub fn take_faults(&self) -> Vec<CoreError> {
        std::mem::take(&mut *self.sink.faults.lock())
            .into_iter()
            .map(|(error, _)| error)
            .collect()
    }

    /// 取出全部故障及其发生位置。
    pub fn take_faults_with_origin(&self) -> Vec<(CoreError, Option<String>)> {
        std::mem::take(&mut *self.sink.faults.lock())
    }

    pub fn saw_active(&self) -> bool {
        self.sink.active.load(Ordering::Acquire)
    }

    pub fn saw_inactive(&self) -> bool {
        self.sink.inactive.load(Ordering::Acquire)
    }

    pub fn state(&self) -> ChannelState {
        self.core.lifecycle.state()
    }

    pub fn close(&self) {
        self.core.close();
    }
}

impl Default for EmbeddedChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EmbeddedChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedChannel")
            .field("id", &self.core.id)
            .field("state", &self.state())
            .field("pipeline", &self.core.pipeline)
            .finish()
    }
}
