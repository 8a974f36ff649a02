use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;

use crate::buffer::PipelineMessage;
use crate::channel::Channel;
use crate::error::{CoreError, Result, codes};
use crate::observability::{Logger, shared_noop_logger};

use super::{Capabilities, ChannelHandler};
use super::chain::{Chain, HEAD, TAIL};
use super::context::{InboundEvent, dispatch_inbound, dispatch_outbound};

/// 单个连接上可变的 Handler 链。
///
/// # 设计背景（Why）
/// - 链以 Arena 表示，节点之间以下标相连，Pipeline 独占 Arena，上下文不会比 Pipeline 活得更久。
/// - 结构变更在互斥锁内复制当前链、修改后整体发布（Copy-on-Write），分发路径只读取快照、不加锁，
///   因此分发期间的增删改是安全的：正在进行的遍历继续使用旧快照，下一次分发看到新链。
///
/// # 逻辑解析（How）
/// - `chain` 使用 [`ArcSwap`] 存放当前快照；
/// - `mutation` 串行化所有结构变更；
/// - 每次成功提交后纪元递增，并输出 `pipeline.mutation applied epoch={n}` 调试日志。
///
/// # 契约说明（What）
/// - 名称在链内唯一，`head`/`tail` 为保留名；
/// - 入站事件自链头开始向后分发，出站写入自链尾开始向前分发；
/// - 出站消息到达链头后交给所属连接的 [`Channel::send`]；未绑定连接时报告
///   [`codes::PIPELINE_WRITE_UNCONSUMED`] 故障，而不是静默丢弃。
///
/// # 风险提示（Trade-offs）
/// - 每次结构变更复制整条链，适合“初始化时组装、运行期偶尔调整”的典型用法。
pub struct Pipeline {
    chain: ArcSwap<Chain>,
    mutation: spin::Mutex<()>,
    epoch: AtomicU64,
    channel: Option<Weak<dyn Channel>>,
    logger: Arc<dyn Logger>,
}

impl Pipeline {
    /// 创建绑定到连接的 Pipeline；连接通常以 `Arc::new_cyclic` 传入自身的弱引用。
    pub fn new(channel: Weak<dyn Channel>, logger: Arc<dyn Logger>) -> Self {
        Self::build(Some(channel), logger)
    }

    /// 创建未绑定连接的 Pipeline，出站消息到达链头时报告未消费故障。
    pub fn detached(logger: Arc<dyn Logger>) -> Self {
        Self::build(None, logger)
    }

    fn build(channel: Option<Weak<dyn Channel>>, logger: Arc<dyn Logger>) -> Self {
        Self {
            chain: ArcSwap::from_pointee(Chain::new()),
            mutation: spin::Mutex::new(()),
            epoch: AtomicU64::new(0),
            channel,
            logger,
        }
    }

    /// 在链头之后插入。
    pub fn add_first(&self, name: &str, handler: Arc<dyn ChannelHandler>) -> Result<()> {
        self.mutate("add_first", |chain| {
            let capabilities = checked_capabilities(name, handler.as_ref())?;
            chain.check_new_name(name)?;
            let next = chain.next_of(HEAD).unwrap_or(TAIL);
            chain.insert_between(HEAD, next, name, handler, capabilities);
            Ok(())
        })
    }

    /// 在链尾之前插入。
    pub fn add_last(&self, name: &str, handler: Arc<dyn ChannelHandler>) -> Result<()> {
        self.mutate("add_last", |chain| {
            let capabilities = checked_capabilities(name, handler.as_ref())?;
            chain.check_new_name(name)?;
            let prev = chain.prev_of(TAIL).unwrap_or(HEAD);
            chain.insert_between(prev, TAIL, name, handler, capabilities);
            Ok(())
        })
    }

    /// 在名为 `base` 的上下文之前插入。
    pub fn add_before(
        &self,
        base: &str,
        name: &str,
        handler: Arc<dyn ChannelHandler>,
    ) -> Result<()> {
        self.mutate("add_before", |chain| {
            let capabilities = checked_capabilities(name, handler.as_ref())?;
            let base = chain.resolve(base)?;
            chain.check_new_name(name)?;
            let prev = chain.prev_of(base).unwrap_or(HEAD);
            chain.insert_between(prev, base, name, handler, capabilities);
            Ok(())
        })
    }

    /// 在名为 `base` 的上下文之后插入。
    pub fn add_after(
        &self,
        base: &str,
        name: &str,
        handler: Arc<dyn ChannelHandler>,
    ) -> Result<()> {
        self.mutate("add_after", |chain| {
            let capabilities = checked_capabilities(name, handler.as_ref())?;
            let base = chain.resolve(base)?;
            chain.check_new_name(name)?;
            let next = chain.next_of(base).unwrap_or(TAIL);
            chain.insert_between(base, next, name, handler, capabilities);
            Ok(())
        })
    }

    /// 移除上下文并返回其 Handler。
    pub fn remove(&self, name: &str) -> Result<Arc<dyn ChannelHandler>> {
        self.mutate("remove", |chain| {
            let id = chain.resolve(name)?;
            chain
                .unlink(id)
                .and_then(|node| node.handler)
                .ok_or_else(|| unknown_context(name))
        })
    }

    /// 原地替换上下文，返回被替换的 Handler；新名称可与旧名称相同。
    pub fn replace(
        &self,
        old_name: &str,
        new_name: &str,
        handler: Arc<dyn ChannelHandler>,
    ) -> Result<Arc<dyn ChannelHandler>> {
        self.mutate("replace", |chain| {
            let capabilities = checked_capabilities(new_name, handler.as_ref())?;
            let id = chain.resolve(old_name)?;
            if new_name != old_name {
                chain.check_new_name(new_name)?;
            }
            chain
                .replace(id, new_name, handler, capabilities)
                .ok_or_else(|| unknown_context(old_name))
        })
    }

    /// 按链上顺序列出上下文名称，不含链头与链尾。
    pub fn names(&self) -> Vec<String> {
        self.chain.load().names()
    }

    /// 取得指定名称的 Handler。
    pub fn get(&self, name: &str) -> Option<Arc<dyn ChannelHandler>> {
        let chain = self.chain.load();
        let id = chain.resolve(name).ok()?;
        chain.handler(id).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.chain.load().contains(name)
    }

    pub fn len(&self) -> usize {
        self.chain.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 结构变更的逻辑时钟，每次成功提交加一。
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    pub fn logger(&self) -> &dyn Logger {
        self.logger.as_ref()
    }

    /// 所属连接；未绑定或已释放时返回 `None`。
    pub fn channel(&self) -> Option<Arc<dyn Channel>> {
        self.channel.as_ref().and_then(Weak::upgrade)
    }

    pub fn fire_channel_active(&self) {
        self.fire_inbound(InboundEvent::Active);
    }

    pub fn fire_channel_inactive(&self) {
        self.fire_inbound(InboundEvent::Inactive);
    }

    pub fn fire_read(&self, msg: impl Into<PipelineMessage>) {
        self.fire_inbound(InboundEvent::Read(msg.into()));
    }

    /// 从链头注入故障，交给第一个错误处理者。
    pub fn fire_exception_caught(&self, error: CoreError) {
        self.fire_inbound(InboundEvent::Exception(error, None));
    }

    /// 从链尾发起出站写入。
    pub fn write(&self, msg: impl Into<PipelineMessage>) {
        let chain = self.chain.load_full();
        dispatch_outbound(self, &chain, TAIL, msg.into());
    }

    fn fire_inbound(&self, event: InboundEvent) {
        let chain = self.chain.load_full();
        dispatch_inbound(self, &chain, HEAD, event);
    }

    /// 链头的出站终点。
    pub(crate) fn deliver(&self, msg: PipelineMessage) -> Result<()> {
        match self.channel() {
            Some(channel) => channel.send(msg),
            None => Err(CoreError::new(
                codes::PIPELINE_WRITE_UNCONSUMED,
                format!("outbound {} message reached head without a channel", msg.kind()),
            )),
        }
    }

    fn mutate<T>(&self, op: &str, apply: impl FnOnce(&mut Chain) -> Result<T>) -> Result<T> {
        let _guard = self.mutation.lock();
        let mut next = Chain::clone(&self.chain.load());
        let output = apply(&mut next)?;
        self.commit_chain(next, op);
        Ok(output)
    }

    fn commit_chain(&self, chain: Chain, op: &str) {
        self.chain.store(Arc::new(chain));
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        self.logger
            .debug(&format!("pipeline.mutation applied epoch={epoch} op={op}"));
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("contexts", &self.names())
            .field("epoch", &self.epoch())
            .field("bound", &self.channel.is_some())
            .finish()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::detached(shared_noop_logger())
    }
}

fn checked_capabilities(
    name: &str,
    handler: &dyn ChannelHandler,
) -> Result<Capabilities> {
    let capabilities = handler.capabilities();
    if capabilities.is_empty() {
        return Err(CoreError::new(
            codes::PIPELINE_INVALID_HANDLER,
            format!("handler `{name}` declares no event capability"),
        ));
    }
    Ok(capabilities)
}

fn unknown_context(name: &str) -> CoreError {
    CoreError::new(
        codes::PIPELINE_UNKNOWN_CONTEXT,
        format!("no context named `{name}`"),
    )
}
