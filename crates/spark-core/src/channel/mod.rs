//! 连接契约：标识、生命周期状态机、属性表与初始化器。
//!
//! # 设计背景（Why）
//! - TCP 与 UDP 通道、测试用的内存通道都需要相同的生命周期语义：
//!   `Created → Active → Inactive → Closed`，且关闭请求幂等。
//! - Pipeline 链头的写处理器只依赖 [`Channel::send`]，不感知具体传输。

mod attributes;

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use crate::buffer::PipelineMessage;
use crate::error::Result;
use crate::pipeline::Pipeline;

pub use attributes::{AttributeKey, Attributes};

/// 进程内单调递增的连接标识。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u64);

impl ChannelId {
    /// 分配下一个标识。
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// 连接生命周期状态。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChannelState {
    Created = 0,
    Active = 1,
    Inactive = 2,
    Closed = 3,
}

impl ChannelState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Created,
            1 => Self::Active,
            2 => Self::Inactive,
            _ => Self::Closed,
        }
    }
}

/// 无锁生命周期状态机。
///
/// # 契约说明（What）
/// - [`activate`](Self::activate)：仅 `Created → Active` 成功；
/// - [`deactivate`](Self::deactivate)：仅 `Active → Inactive` 成功，重复调用返回 `false`，
///   关闭流程据此保证 `inactive` 事件只触发一次；
/// - [`mark_closed`](Self::mark_closed)：资源释放完成后进入终态。
#[derive(Debug)]
pub struct ChannelLifecycle {
    state: AtomicU8,
}

impl Default for ChannelLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelLifecycle {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(ChannelState::Created as u8),
        }
    }

    pub fn state(&self) -> ChannelState {
        ChannelState::from_raw(self.state.load(Ordering::Acquire))
    }

    pub fn is_active(&self) -> bool {
        self.state() == ChannelState::Active
    }

    pub fn activate(&self) -> bool {
        self.transition(ChannelState::Created, ChannelState::Active)
    }

    pub fn deactivate(&self) -> bool {
        self.transition(ChannelState::Active, ChannelState::Inactive)
    }

    pub fn mark_closed(&self) {
        self.state
            .store(ChannelState::Closed as u8, Ordering::Release);
    }

    fn transition(&self, from: ChannelState, to: ChannelState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// 单个双工网络端点。
///
/// # 契约说明（What）
/// - `send`：传输侧写入口，由 Pipeline 链头的写处理器调用；实现可排队、可阻塞以施加背压，
///   连接已关闭时返回 `transport.closed`；
/// - `close`：请求关闭，幂等，可在任意线程（包括 Handler 内部）调用，不等待关闭完成；
/// - `pipeline`：连接独占的 Handler 链。
pub trait Channel: Send + Sync + 'static {
    fn id(&self) -> ChannelId;

    fn state(&self) -> ChannelState;

    fn is_active(&self) -> bool {
        self.state() == ChannelState::Active
    }

    fn local_addr(&self) -> Option<SocketAddr>;

    fn peer_addr(&self) -> Option<SocketAddr>;

    fn attributes(&self) -> &Attributes;

    fn pipeline(&self) -> &Pipeline;

    fn send(&self, msg: PipelineMessage) -> Result<()>;

    fn close(&self);
}

/// 新连接的 Pipeline 装配器，在连接激活前调用一次。
pub trait ChannelInitializer: Send + Sync + 'static {
    fn init_channel(&self, channel: &dyn Channel) -> Result<()>;
}

impl<F> ChannelInitializer for F
where
    F: Fn(&dyn Channel) -> Result<()> + Send + Sync + 'static,
{
    fn init_channel(&self, channel: &dyn Channel) -> Result<()> {
        self(channel)
    }
}
