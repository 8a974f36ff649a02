use std::fmt;
use std::sync::Arc;

use crate::buffer::PipelineMessage;
use crate::channel::Channel;
use crate::error::CoreError;
use crate::observability::Logger;

use super::chain::{Chain, HEAD, NodeId};
use super::{Capabilities, Pipeline};

/// Handler 在链上的位置视图，作为每次回调的上下文参数。
///
/// # 设计背景（Why）
/// - 分发开始时 Pipeline 读取一份不可变的链快照，`Context` 借用该快照，
///   因此回调期间对 Pipeline 的增删改只影响后续分发，不会打断正在进行的遍历。
///
/// # 契约说明（What）
/// - `fire_*` 从当前位置向链尾查找下一个声明对应能力的上下文；
/// - `write` 从当前位置向链头查找下一个声明写能力的上下文，最终由链头交给连接；
/// - 所有分发方法不返回错误：故障在发生处被拦截并路由到错误处理者。
pub struct Context<'a> {
    pipeline: &'a Pipeline,
    chain: &'a Chain,
    node: NodeId,
    fault_origin: Option<NodeId>,
}

impl<'a> Context<'a> {
    pub(crate) fn new(
        pipeline: &'a Pipeline,
        chain: &'a Chain,
        node: NodeId,
        fault_origin: Option<NodeId>,
    ) -> Self {
        Self {
            pipeline,
            chain,
            node,
            fault_origin,
        }
    }

    /// 上下文名称。
    pub fn name(&self) -> &str {
        self.chain.node(self.node).map_or("", |node| &node.name)
    }

    /// 当前 Handler 声明的能力。
    pub fn capabilities(&self) -> Capabilities {
        self.chain
            .node(self.node)
            .map_or(Capabilities::NONE, |node| node.capabilities)
    }

    pub fn pipeline(&self) -> &'a Pipeline {
        self.pipeline
    }

    /// 所属连接；连接已释放或 Pipeline 未绑定连接时返回 `None`。
    pub fn channel(&self) -> Option<Arc<dyn Channel>> {
        self.pipeline.channel()
    }

    pub fn logger(&self) -> &dyn Logger {
        self.pipeline.logger()
    }

    /// 在异常回调中给出故障发生处的上下文名称。
    pub fn fault_origin(&self) -> Option<&str> {
        self.fault_origin
            .and_then(|origin| self.chain.node(origin))
            .map(|node| &*node.name)
    }

    pub fn fire_channel_active(&self) {
        dispatch_inbound(self.pipeline, self.chain, self.node, InboundEvent::Active);
    }

    pub fn fire_channel_inactive(&self) {
        dispatch_inbound(self.pipeline, self.chain, self.node, InboundEvent::Inactive);
    }

    pub fn fire_read(&self, msg: PipelineMessage) {
        dispatch_inbound(self.pipeline, self.chain, self.node, InboundEvent::Read(msg));
    }

    /// 把故障交给其后最近的错误处理者，保留最初的故障位置。
    pub fn fire_exception_caught(&self, error: CoreError) {
        let origin = self.fault_origin.unwrap_or(self.node);
        dispatch_inbound(
            self.pipeline,
            self.chain,
            self.node,
            InboundEvent::Exception(error, Some(origin)),
        );
    }

    pub fn write(&self, msg: PipelineMessage) {
        dispatch_outbound(self.pipeline, self.chain, self.node, msg);
    }

    /// 请求关闭所属连接。
    pub fn close(&self) {
        if let Some(channel) = self.channel() {
            channel.close();
        }
    }
}

impl fmt::Display for Context<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.channel() {
            Some(channel) => write!(f, "{} (channel {})", self.name(), channel.id()),
            None => write!(f, "{} (unbound)", self.name()),
        }
    }
}

impl fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("name", &self.name())
            .field("capabilities", &self.capabilities())
            .field("fault_origin", &self.fault_origin())
            .finish()
    }
}

pub(crate) enum InboundEvent {
    Active,
    Inactive,
    Read(PipelineMessage),
    Exception(CoreError, Option<NodeId>),
}

impl InboundEvent {
    fn capability(&self) -> Capabilities {
        match self {
            Self::Active => Capabilities::ACTIVE,
            Self::Inactive => Capabilities::INACTIVE,
            Self::Read(_) => Capabilities::READ,
            Self::Exception(..) => Capabilities::ERROR,
        }
    }
}

/// 入站分发：自 `from` 之后找到第一个声明对应能力的上下文并调用。
pub(crate) fn dispatch_inbound(
    pipeline: &Pipeline,
    chain: &Chain,
    from: NodeId,
    event: InboundEvent,
) {
    let target = chain
        .next_with(from, event.capability())
        .and_then(|id| chain.handler(id).map(|handler| (id, handler)));
    let Some((id, handler)) = target else {
        report_unrouted(pipeline, chain, from, event);
        return;
    };

    match event {
        InboundEvent::Active => {
            let ctx = Context::new(pipeline, chain, id, None);
            if let Err(error) = handler.on_channel_active(&ctx) {
                intercept(&ctx, error);
            }
        }
        InboundEvent::Inactive => {
            let ctx = Context::new(pipeline, chain, id, None);
            if let Err(error) = handler.on_channel_inactive(&ctx) {
                intercept(&ctx, error);
            }
        }
        InboundEvent::Read(msg) => {
            let ctx = Context::new(pipeline, chain, id, None);
            if let Err(error) = handler.on_read(&ctx, msg) {
                intercept(&ctx, error);
            }
        }
        InboundEvent::Exception(error, origin) => {
            // 错误处理者自身失败时只记录，不再路由，避免在错误链上往复。
            let ctx = Context::new(pipeline, chain, id, origin);
            if let Err(error) = handler.on_exception_caught(&ctx, error) {
                report_unhandled(&ctx, &error);
            }
        }
    }
}

/// 出站分发：自 `from` 之前找到第一个声明写能力的上下文；到达链头时交给连接。
pub(crate) fn dispatch_outbound(
    pipeline: &Pipeline,
    chain: &Chain,
    from: NodeId,
    msg: PipelineMessage,
) {
    let Some(id) = chain.prev_with(from, Capabilities::WRITE) else {
        pipeline.logger().warn(&format!(
            "outbound {} message dropped: no writer before context `{}`",
            msg.kind(),
            chain.node(from).map_or("", |node| &*node.name)
        ));
        return;
    };
    let ctx = Context::new(pipeline, chain, id, None);
    let outcome = if id == HEAD {
        pipeline.deliver(msg)
    } else {
        match chain.handler(id) {
            Some(handler) => handler.on_write(&ctx, msg),
            None => Ok(()),
        }
    };
    if let Err(error) = outcome {
        intercept(&ctx, error);
    }
}

/// 在故障发生处拦截：先看自身是否处理错误，再向后查找，最后记录。
fn intercept(ctx: &Context<'_>, error: CoreError) {
    let origin = ctx.node;
    let target = if ctx.capabilities().contains(Capabilities::ERROR) {
        Some(origin)
    } else {
        ctx.chain.next_with(origin, Capabilities::ERROR)
    };
    match target.and_then(|id| ctx.chain.handler(id).map(|handler| (id, handler))) {
        Some((id, handler)) => {
            let error_ctx = Context::new(ctx.pipeline, ctx.chain, id, Some(origin));
            if let Err(error) = handler.on_exception_caught(&error_ctx, error) {
                report_unhandled(&error_ctx, &error);
            }
        }
        None => report_unhandled(ctx, &error),
    }
}

fn report_unhandled(ctx: &Context<'_>, error: &CoreError) {
    let origin = ctx.fault_origin().unwrap_or_else(|| ctx.name());
    ctx.logger().warn_with_error(
        &format!("unhandled fault raised at context `{origin}`"),
        error,
    );
}

fn report_unrouted(pipeline: &Pipeline, chain: &Chain, from: NodeId, event: InboundEvent) {
    let from_name = chain.node(from).map_or("", |node| &*node.name);
    let logger = pipeline.logger();
    match event {
        InboundEvent::Read(msg) => logger.warn(&format!(
            "inbound {} message dropped: no context after `{from_name}` handles read",
            msg.kind()
        )),
        InboundEvent::Exception(error, origin) => {
            let origin = origin
                .and_then(|origin| chain.node(origin))
                .map_or(from_name, |node| &*node.name);
            logger.warn_with_error(
                &format!("unhandled fault raised at context `{origin}`"),
                &error,
            );
        }
        InboundEvent::Active => logger.debug(&format!(
            "channel active event not observed after `{from_name}`"
        )),
        InboundEvent::Inactive => logger.debug(&format!(
            "channel inactive event not observed after `{from_name}`"
        )),
    }
}
