//! # spark-codecs
//!
//! ## 教案意图（Why）
//! - **职责定位**：提供运行在 Pipeline 内的常用分帧编解码器，协议层只需声明帧格式即可复用
//!   `spark-core` 的累积、放行与故障上报逻辑。
//! - **故障语义**：帧格式违规统一映射为 `protocol.too_long_frame` 或 `protocol.corrupted_frame`，
//!   并以 [`FrameError`] 作为底层原因保留数值现场。
//!
//! ## 使用方式（How）
//! - 解码器实现 [`ByteToMessageDecoder`](spark_core::codec::ByteToMessageDecoder)，通过
//!   [`ByteToMessageHandler`](spark_core::codec::ByteToMessageHandler) 注册到 Pipeline；
//! - [`LengthFieldPrepender`] 实现消息到消息编码，通过
//!   [`MessageToMessageEncoderHandler`](spark_core::codec::MessageToMessageEncoderHandler) 注册。
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use spark_codecs::LineBasedFrameDecoder;
//! use spark_core::ByteBuf;
//! use spark_core::codec::ByteToMessageHandler;
//! use spark_core::test_stubs::EmbeddedChannel;
//!
//! let channel = EmbeddedChannel::new();
//! let decoder = LineBasedFrameDecoder::try_new(1024, true)?;
//! channel.add_handler("line", Arc::new(ByteToMessageHandler::new(decoder)))?;
//! channel.write_inbound(ByteBuf::copy_from_slice(b"ping\n")?);
//! let frame = channel.read_inbound().and_then(|msg| msg.into_buffer().ok());
//! assert_eq!(frame.map(|buf| buf.readable_slice().to_vec()), Some(b"ping".to_vec()));
//! # Ok::<(), spark_core::CoreError>(())
//! ```
//!
//! ## 契约说明（What）
//! - 所有构造函数在参数非法时返回 `config.invalid`，运行期不会 panic；
//! - 帧故障不关闭连接，解码器在下一个可识别的帧边界重新同步。

mod delimiter;
mod error;
mod length_field;
mod line;
mod prepender;

pub use delimiter::DelimiterBasedFrameDecoder;
pub use error::FrameError;
pub use length_field::{DEFAULT_MAX_FRAME_LENGTH, LengthFieldBasedFrameDecoder, LengthFieldConfig};
pub use line::LineBasedFrameDecoder;
pub use prepender::LengthFieldPrepender;
