use std::fmt;

use crate::buffer::{ByteBuf, PipelineMessage};
use crate::error::Result;
use crate::pipeline::{Capabilities, ChannelHandler, Context};

/// 把出站消息序列化进字节缓冲的编码器。
pub trait MessageToByteEncoder: Send + 'static {
    /// 是否处理该消息；返回假时消息原样向前传递。
    fn accepts(&self, _msg: &PipelineMessage) -> bool {
        true
    }

    /// 把 `msg` 写入 `out`；未写入任何字节时不产生出站消息。
    fn encode(&mut self, msg: PipelineMessage, out: &mut ByteBuf) -> Result<()>;
}

/// 把 [`MessageToByteEncoder`] 包装为出站 Handler。
pub struct MessageToByteHandler<E> {
    encoder: spin::Mutex<E>,
    initial_capacity: usize,
}

impl<E: MessageToByteEncoder> MessageToByteHandler<E> {
    const DEFAULT_INITIAL_CAPACITY: usize = 256;

    pub fn new(encoder: E) -> Self {
        Self::with_initial_capacity(encoder, Self::DEFAULT_INITIAL_CAPACITY)
    }

    /// 指定每次编码分配的初始缓冲容量，零值按 1 处理。
    pub fn with_initial_capacity(encoder: E, initial_capacity: usize) -> Self {
        Self {
            encoder: spin::Mutex::new(encoder),
            initial_capacity: initial_capacity.max(1),
        }
    }
}

impl<E: MessageToByteEncoder> ChannelHandler for MessageToByteHandler<E> {
    fn capabilities(&self) -> Capabilities {
        Capabilities::WRITE
    }

    fn on_write(&self, ctx: &Context<'_>, msg: PipelineMessage) -> Result<()> {
        let encoded = {
            let mut encoder = self.encoder.lock();
            if !encoder.accepts(&msg) {
                drop(encoder);
                ctx.write(msg);
                return Ok(());
            }
            let mut out = ByteBuf::with_capacity(self.initial_capacity)?;
            encoder.encode(msg, &mut out)?;
            out
        };
        if encoded.is_readable() {
            ctx.write(PipelineMessage::Buffer(encoded));
        }
        Ok(())
    }
}

impl<E> fmt::Debug for MessageToByteHandler<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageToByteHandler")
            .field("initial_capacity", &self.initial_capacity)
            .finish()
    }
}
