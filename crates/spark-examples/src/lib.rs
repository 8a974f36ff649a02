//! 行分帧回显示例的公共装配。
//!
//! # 教案级说明
//! - **意图 (Why)**：服务端与客户端共享同一套帧格式（以 `\n` 结尾的文本行），
//!   示例展示解码器、出站编码器与业务 Handler 如何在一条 Pipeline 上协作；
//! - **逻辑 (How)**：入站方向由 [`LineBasedFrameDecoder`] 切出去掉换行符的整行，
//!   出站方向由 [`LineTerminator`] 补回换行符；
//! - **契约 (What)**：单行超过 [`MAX_LINE_LENGTH`] 时该行被丢弃，故障沿 Pipeline 传播并由日志记录，连接继续可用。

use std::sync::Arc;

use spark_codecs::LineBasedFrameDecoder;
use spark_core::codec::{
    ByteToMessageHandler, MessageToMessageEncoder, MessageToMessageEncoderHandler,
};
use spark_core::error::codes;
use spark_core::{
    Capabilities, Channel, ChannelHandler, Context, CoreError, PipelineMessage, Result,
};
use tracing_subscriber::EnvFilter;

/// 服务端默认监听地址。
pub const DEFAULT_ADDR: &str = "127.0.0.1:9000";

/// 单行允许的最大长度（不含换行符）。
pub const MAX_LINE_LENGTH: usize = 8 * 1024;

/// 安装 `fmt` 订阅者，日志级别取自 `RUST_LOG`，缺省为 `info`。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // 重复安装时保留先前的订阅者。
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// 为每条出站缓冲补上行结束符。
#[derive(Debug, Default)]
pub struct LineTerminator;

impl MessageToMessageEncoder for LineTerminator {
    fn accepts(&self, msg: &PipelineMessage) -> bool {
        msg.as_buffer().is_some()
    }

    fn encode(&mut self, msg: PipelineMessage) -> Result<Vec<PipelineMessage>> {
        let mut buf = msg.into_buffer().map_err(|other| {
            CoreError::new(
                codes::CODEC_UNSUPPORTED_MESSAGE,
                format!("line terminator expects a buffer, got {}", other.kind()),
            )
        })?;
        buf.write_bytes(b"\n")?;
        Ok(vec![buf.into()])
    }
}

/// 行分帧编解码 Handler，按装配顺序排列。
pub fn line_codec() -> Result<Vec<(&'static str, Arc<dyn ChannelHandler>)>> {
    let decoder = LineBasedFrameDecoder::try_new(MAX_LINE_LENGTH, true)?;
    let framer: Arc<dyn ChannelHandler> = Arc::new(ByteToMessageHandler::new(decoder));
    let terminator: Arc<dyn ChannelHandler> =
        Arc::new(MessageToMessageEncoderHandler::new(LineTerminator));
    Ok(vec![("framer", framer), ("terminator", terminator)])
}

/// 记录每一行并原样写回。
#[derive(Debug, Default)]
pub struct EchoHandler;

impl ChannelHandler for EchoHandler {
    fn capabilities(&self) -> Capabilities {
        Capabilities::ACTIVE | Capabilities::INACTIVE | Capabilities::READ
    }

    fn on_channel_active(&self, ctx: &Context<'_>) -> Result<()> {
        ctx.logger().info(&format!("{ctx} active"));
        Ok(())
    }

    fn on_channel_inactive(&self, ctx: &Context<'_>) -> Result<()> {
        ctx.logger().info(&format!("{ctx} inactive"));
        Ok(())
    }

    fn on_read(&self, ctx: &Context<'_>, msg: PipelineMessage) -> Result<()> {
        match msg.as_buffer() {
            Some(line) => {
                let text = String::from_utf8_lossy(line.readable_slice());
                ctx.logger().info(&format!("received: {text}"));
                ctx.write(msg);
            }
            None => ctx
                .logger()
                .error(&format!("unexpected {} message", msg.kind())),
        }
        Ok(())
    }
}

/// 回显服务端的连接初始化器。
pub fn echo_initializer(channel: &dyn Channel) -> Result<()> {
    let pipeline = channel.pipeline();
    for (name, handler) in line_codec()? {
        pipeline.add_last(name, handler)?;
    }
    pipeline.add_last("echo", Arc::new(EchoHandler))
}
