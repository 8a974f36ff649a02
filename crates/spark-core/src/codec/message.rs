//! 消息到消息的编解码适配器。
//!
//! 编码方向要求每条被接受的消息至少产出一条输出，否则报告
//! [`codes::CODEC_MUST_PRODUCE_MESSAGE`]；解码方向允许产出为空（例如聚合中的半成品）。

use std::fmt;

use crate::buffer::PipelineMessage;
use crate::error::{CoreError, Result, codes};
use crate::pipeline::{Capabilities, ChannelHandler, Context};

/// 出站消息变换。
pub trait MessageToMessageEncoder: Send + 'static {
    fn accepts(&self, _msg: &PipelineMessage) -> bool {
        true
    }

    fn encode(&mut self, msg: PipelineMessage) -> Result<Vec<PipelineMessage>>;
}

/// 入站消息变换。
pub trait MessageToMessageDecoder: Send + 'static {
    fn accepts(&self, _msg: &PipelineMessage) -> bool {
        true
    }

    fn decode(&mut self, msg: PipelineMessage) -> Result<Vec<PipelineMessage>>;
}

/// 把 [`MessageToMessageEncoder`] 包装为出站 Handler，输出按顺序继续向前写出。
pub struct MessageToMessageEncoderHandler<E> {
    encoder: spin::Mutex<E>,
}

impl<E: MessageToMessageEncoder> MessageToMessageEncoderHandler<E> {
    pub fn new(encoder: E) -> Self {
        Self {
            encoder: spin::Mutex::new(encoder),
        }
    }
}

impl<E: MessageToMessageEncoder> ChannelHandler for MessageToMessageEncoderHandler<E> {
    fn capabilities(&self) -> Capabilities {
        Capabilities::WRITE
    }

    fn on_write(&self, ctx: &Context<'_>, msg: PipelineMessage) -> Result<()> {
        let outputs = {
            let mut encoder = self.encoder.lock();
            if !encoder.accepts(&msg) {
                drop(encoder);
                ctx.write(msg);
                return Ok(());
            }
            encoder.encode(msg)?
        };
        if outputs.is_empty() {
            return Err(CoreError::new(
                codes::CODEC_MUST_PRODUCE_MESSAGE,
                format!("encoder `{}` produced no message", ctx.name()),
            ));
        }
        for output in outputs {
            ctx.write(output);
        }
        Ok(())
    }
}

impl<E> fmt::Debug for MessageToMessageEncoderHandler<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MessageToMessageEncoderHandler")
    }
}

/// 把 [`MessageToMessageDecoder`] 包装为入站 Handler，输出按顺序作为新的读事件传播。
pub struct MessageToMessageDecoderHandler<D> {
    decoder: spin::Mutex<D>,
}

impl<D: MessageToMessageDecoder> MessageToMessageDecoderHandler<D> {
    pub fn new(decoder: D) -> Self {
        Self {
            decoder: spin::Mutex::new(decoder),
        }
    }
}

impl<D: MessageToMessageDecoder> ChannelHandler for MessageToMessageDecoderHandler<D> {
    fn capabilities(&self) -> Capabilities {
        Capabilities::READ
    }

    fn on_read(&self, ctx: &Context<'_>, msg: PipelineMessage) -> Result<()> {
        let outputs = {
            let mut decoder = self.decoder.lock();
            if !decoder.accepts(&msg) {
                drop(decoder);
                ctx.fire_read(msg);
                return Ok(());
            }
            decoder.decode(msg)?
        };
        for output in outputs {
            ctx.fire_read(output);
        }
        Ok(())
    }
}

impl<D> fmt::Debug for MessageToMessageDecoderHandler<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MessageToMessageDecoderHandler")
    }
}
