use crate::buffer::PipelineMessage;
use crate::error::{CoreError, Result};

use super::{Capabilities, Context};

/// Pipeline 中的事件处理器。
///
/// # 设计背景（Why）
/// - 借鉴 Netty `ChannelHandler`：入站事件（激活、失活、读取、异常）沿链向后传播，出站写入沿链向前传播。
/// - Handler 通过 [`capabilities`](Self::capabilities) 显式声明关心的事件，Pipeline 在加入时缓存该位图，
///   分发时跳过未声明对应能力的节点。
///
/// # 契约说明（What）
/// - 所有回调以 `&self` 调用，可能来自连接的读任务或任意调用 `write` 的线程；有状态的 Handler
///   需自行使用内部可变性。
/// - 回调返回 `Err` 时，Pipeline 在当前上下文拦截故障：若当前上下文声明了 [`Capabilities::ERROR`]
///   则交给自身的 [`on_exception_caught`](Self::on_exception_caught)，否则交给其后最近的错误处理者，
///   都不存在时记录为未处理故障；故障不会中断连接的读写循环。
/// - 默认实现把事件原样转发给下一个处理者，声明了能力但未覆写的方法等价于透传。
///
/// # 风险提示（Trade-offs）
/// - 回调在分发路径上同步执行，耗时操作应移交给运行时任务，否则会阻塞该连接后续入站事件。
pub trait ChannelHandler: Send + Sync + 'static {
    /// 声明支持的事件集合；返回空集合的 Handler 会在加入时被拒绝。
    fn capabilities(&self) -> Capabilities;

    /// 连接进入活跃状态。
    fn on_channel_active(&self, ctx: &Context<'_>) -> Result<()> {
        ctx.fire_channel_active();
        Ok(())
    }

    /// 连接不再活跃。
    fn on_channel_inactive(&self, ctx: &Context<'_>) -> Result<()> {
        ctx.fire_channel_inactive();
        Ok(())
    }

    /// 处理入站消息。
    fn on_read(&self, ctx: &Context<'_>, msg: PipelineMessage) -> Result<()> {
        ctx.fire_read(msg);
        Ok(())
    }

    /// 处理出站消息。
    fn on_write(&self, ctx: &Context<'_>, msg: PipelineMessage) -> Result<()> {
        ctx.write(msg);
        Ok(())
    }

    /// 处理被拦截的故障；[`Context::fault_origin`] 给出故障发生的位置。
    fn on_exception_caught(&self, ctx: &Context<'_>, error: CoreError) -> Result<()> {
        ctx.fire_exception_caught(error);
        Ok(())
    }
}
