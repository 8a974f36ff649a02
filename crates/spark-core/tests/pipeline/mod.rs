//! Pipeline 集成测试：分发顺序、故障拦截与运行期结构变更。

mod dispatch;
mod faults;
mod hot_swap;

use std::sync::Arc;

use spark_core::{
    Capabilities, ChannelHandler, Context, CoreError, PipelineMessage, Result, error::codes,
};

/// 共享事件日志，元素形如 `"<handler>:<event>"`。
#[derive(Clone, Default)]
pub(crate) struct Journal(Arc<std::sync::Mutex<Vec<String>>>);

impl Journal {
    pub(crate) fn push(&self, entry: impl Into<String>) {
        self.0.lock().expect("journal lock").push(entry.into());
    }

    pub(crate) fn snapshot(&self) -> Vec<String> {
        self.0.lock().expect("journal lock").clone()
    }
}

/// 记录事件并继续传播的 Handler。
pub(crate) struct Recorder {
    pub(crate) name: String,
    pub(crate) caps: Capabilities,
    pub(crate) journal: Journal,
}

impl Recorder {
    pub(crate) fn new(name: impl Into<String>, caps: Capabilities, journal: &Journal) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            caps,
            journal: journal.clone(),
        })
    }
}

impl ChannelHandler for Recorder {
    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn on_channel_active(&self, ctx: &Context<'_>) -> Result<()> {
        self.journal.push(format!("{}:active", self.name));
        ctx.fire_channel_active();
        Ok(())
    }

    fn on_channel_inactive(&self, ctx: &Context<'_>) -> Result<()> {
        self.journal.push(format!("{}:inactive", self.name));
        ctx.fire_channel_inactive();
        Ok(())
    }

    fn on_read(&self, ctx: &Context<'_>, msg: PipelineMessage) -> Result<()> {
        self.journal.push(format!("{}:read", self.name));
        ctx.fire_read(msg);
        Ok(())
    }

    fn on_write(&self, ctx: &Context<'_>, msg: PipelineMessage) -> Result<()> {
        self.journal.push(format!("{}:write", self.name));
        ctx.write(msg);
        Ok(())
    }

    fn on_exception_caught(&self, ctx: &Context<'_>, error: CoreError) -> Result<()> {
        let origin = ctx.fault_origin().unwrap_or("-").to_owned();
        self.journal
            .push(format!("{}:error@{origin}:{}", self.name, error.code()));
        Ok(())
    }
}

/// 读取时失败的 Handler。
pub(crate) struct Failing {
    pub(crate) caps: Capabilities,
}

impl ChannelHandler for Failing {
    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn on_read(&self, _ctx: &Context<'_>, _msg: PipelineMessage) -> Result<()> {
        Err(CoreError::new(codes::PROTOCOL_CORRUPTED_FRAME, "reader failed"))
    }

    fn on_exception_caught(&self, ctx: &Context<'_>, error: CoreError) -> Result<()> {
        ctx.fire_exception_caught(error);
        Ok(())
    }
}
