//! 运行在 Pipeline 内的编解码适配器。
//!
//! # 设计背景（Why）
//! - 具体帧格式（分隔符、行、长度字段）只关心“如何从累积字节中切出一帧”，
//!   而累积、循环、故障上报与消息转发对所有格式都相同，因此拆为“编解码契约 + 通用 Handler 适配器”两层。
//!
//! # 模块结构（How）
//! - [`decoder`]：[`ByteToMessageDecoder`] 与累积式入站适配器 [`ByteToMessageHandler`]；
//! - [`encoder`]：[`MessageToByteEncoder`] 与出站适配器 [`MessageToByteHandler`]；
//! - [`message`]：消息到消息的编解码契约与适配器。
//!
//! # 契约说明（What）
//! - 适配器在内部锁中调用编解码器，收集全部产出后释放锁，再沿链转发，
//!   因此下游 Handler 可以安全地重入同一 Pipeline；
//! - 编解码器不认识的消息（`accepts` 返回假）原样放行。

pub mod decoder;
pub mod encoder;
pub mod message;

pub use decoder::{ByteToMessageDecoder, ByteToMessageHandler, DecodeOutcome};
pub use encoder::{MessageToByteEncoder, MessageToByteHandler};
pub use message::{
    MessageToMessageDecoder, MessageToMessageDecoderHandler, MessageToMessageEncoder,
    MessageToMessageEncoderHandler,
};
