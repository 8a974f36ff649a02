use spark_core::codec::MessageToMessageEncoder;
use spark_core::error::{codes, config_error};
use spark_core::{ByteBuf, ByteOrder, CoreError, PipelineMessage, Result};

use crate::FrameError;

/// 为出站字节帧前置长度字段的编码器。
///
/// # 逻辑解析（How）
/// - 长度 = 负载可读字节数 + `length_adjustment`，若 `includes_length_field_length` 再加上字段宽度；
/// - 负数长度上报损坏，超出字段宽度可表示范围上报超长；
/// - 产出两条消息：新分配的长度前缀缓冲，以及原样转交的负载缓冲，负载不做复制。
///
/// 只处理字节缓冲消息，其余消息由适配器原样放行。
#[derive(Debug, Clone, Copy)]
pub struct LengthFieldPrepender {
    byte_order: ByteOrder,
    length_field_length: usize,
    length_adjustment: i64,
    includes_length_field_length: bool,
}

impl LengthFieldPrepender {
    pub fn try_new(
        byte_order: ByteOrder,
        length_field_length: usize,
        length_adjustment: i64,
        includes_length_field_length: bool,
    ) -> Result<Self> {
        if !matches!(length_field_length, 1 | 2 | 4 | 8) {
            return Err(config_error(format!(
                "unsupported length_field_length {length_field_length} (expected 1, 2, 4 or 8)"
            )));
        }
        Ok(Self {
            byte_order,
            length_field_length,
            length_adjustment,
            includes_length_field_length,
        })
    }

    fn prefix_value(&self, payload: &ByteBuf) -> std::result::Result<u64, FrameError> {
        let width = self.length_field_length as i64;
        let length = i64::try_from(payload.readable_bytes())
            .ok()
            .and_then(|readable| readable.checked_add(self.length_adjustment))
            .and_then(|length| {
                if self.includes_length_field_length {
                    length.checked_add(width)
                } else {
                    Some(length)
                }
            })
            .ok_or(FrameError::LengthOverflow)?;
        if length < 0 {
            return Err(FrameError::NegativeLength(length));
        }
        let length = length as u64;
        let fits = match self.length_field_length {
            8 => true,
            width => length < 1u64 << (8 * width),
        };
        if !fits {
            return Err(FrameError::LengthDoesNotFit {
                length,
                width: self.length_field_length,
            });
        }
        Ok(length)
    }
}

impl MessageToMessageEncoder for LengthFieldPrepender {
    fn accepts(&self, msg: &PipelineMessage) -> bool {
        msg.as_buffer().is_some()
    }

    fn encode(&mut self, msg: PipelineMessage) -> Result<Vec<PipelineMessage>> {
        let payload = msg.into_buffer().map_err(|other| {
            CoreError::new(
                codes::CODEC_UNSUPPORTED_MESSAGE,
                format!("length prepender expects a buffer, got {}", other.kind()),
            )
        })?;
        let length = self
            .prefix_value(&payload)
            .map_err(|error| error.into_core("length-prepender"))?;
        let mut prefix = ByteBuf::with_capacity(self.length_field_length)?;
        prefix.write_uint(length, self.length_field_length, self.byte_order)?;
        Ok(vec![prefix.into(), payload.into()])
    }
}
