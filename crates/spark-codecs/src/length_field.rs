use serde::Deserialize;
use spark_core::codec::{ByteToMessageDecoder, DecodeOutcome};
use spark_core::error::config_error;
use spark_core::{ByteBuf, ByteOrder, Result};

use crate::FrameError;

/// 未显式配置时的帧长上限（1 MiB）。
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 1024 * 1024;

/// 长度字段分帧的参数。
///
/// # 契约说明（What）
/// - `length_field_length` 仅支持 1/2/4/8 字节；1/2/4 字节按无符号解释，8 字节按有符号解释；
/// - 完整帧长 = 长度字段值 + `length_adjustment` + `length_field_offset + length_field_length`；
/// - `initial_bytes_to_strip` 为产出消息前从帧首跳过的字节数；
/// - 须满足 `max_frame_length ≥ length_field_offset + length_field_length`。
///
/// 可从 TOML 等配置源反序列化，缺省字段取 [`Default`]。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LengthFieldConfig {
    pub byte_order: ByteOrder,
    pub max_frame_length: usize,
    pub length_field_offset: usize,
    pub length_field_length: usize,
    pub length_adjustment: i64,
    pub initial_bytes_to_strip: usize,
}

impl Default for LengthFieldConfig {
    fn default() -> Self {
        Self {
            byte_order: ByteOrder::BigEndian,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            length_field_offset: 0,
            length_field_length: 4,
            length_adjustment: 0,
            initial_bytes_to_strip: 0,
        }
    }
}

impl LengthFieldConfig {
    pub fn with_byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = byte_order;
        self
    }

    pub fn with_max_frame_length(mut self, max_frame_length: usize) -> Self {
        self.max_frame_length = max_frame_length;
        self
    }

    /// 长度字段的位置与宽度。
    pub fn with_length_field(mut self, offset: usize, length: usize) -> Self {
        self.length_field_offset = offset;
        self.length_field_length = length;
        self
    }

    pub fn with_length_adjustment(mut self, adjustment: i64) -> Self {
        self.length_adjustment = adjustment;
        self
    }

    pub fn with_initial_bytes_to_strip(mut self, strip: usize) -> Self {
        self.initial_bytes_to_strip = strip;
        self
    }

    /// 长度字段结束处相对帧首的偏移。
    pub fn length_field_end_offset(&self) -> Option<usize> {
        self.length_field_offset.checked_add(self.length_field_length)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_frame_length == 0 {
            return Err(config_error("max_frame_length must be positive"));
        }
        if !matches!(self.length_field_length, 1 | 2 | 4 | 8) {
            return Err(config_error(format!(
                "unsupported length_field_length {} (expected 1, 2, 4 or 8)",
                self.length_field_length
            )));
        }
        match self.length_field_end_offset() {
            Some(end) if end <= self.max_frame_length => Ok(()),
            _ => Err(config_error(format!(
                "max_frame_length {} must be >= length_field_offset {} + length_field_length {}",
                self.max_frame_length, self.length_field_offset, self.length_field_length
            ))),
        }
    }
}

/// 按帧首长度字段切帧的解码器。
///
/// # 逻辑解析（How）
/// 1. 上一帧超长尚有未丢弃的字节时，先跳过这部分；
/// 2. 可读字节不足长度字段区域时等待；
/// 3. 读出长度字段并计算完整帧长，负值、溢出或小于字段区域时跳过字段区域并上报损坏；
/// 4. 帧长超过上限时立即上报，跳过当前可读部分，剩余待丢弃量留给后续读取；
/// 5. 整帧到齐后跳过前缀并切出其余字节。
///
/// # 风险提示（Trade-offs）
/// - 长度字段损坏后解码器只跳过字段区域，之后的字节会被当作新的帧首重新解析；
///   需要强一致重同步的协议应在上层关闭连接。
#[derive(Debug, Clone)]
pub struct LengthFieldBasedFrameDecoder {
    config: LengthFieldConfig,
    end_offset: usize,
    bytes_to_discard: u64,
}

impl LengthFieldBasedFrameDecoder {
    pub fn try_new(config: LengthFieldConfig) -> Result<Self> {
        config.validate()?;
        let end_offset = config
            .length_field_end_offset()
            .ok_or_else(|| config_error("length field end offset overflows"))?;
        Ok(Self {
            config,
            end_offset,
            bytes_to_discard: 0,
        })
    }

    pub fn config(&self) -> &LengthFieldConfig {
        &self.config
    }

    /// 超长帧尚待丢弃的字节数。
    pub fn pending_discard(&self) -> u64 {
        self.bytes_to_discard
    }

    fn discard_pending(&mut self, input: &mut ByteBuf) -> Result<()> {
        let readable = input.readable_bytes() as u64;
        let skipped = self.bytes_to_discard.min(readable);
        input.skip(skipped as usize)?;
        self.bytes_to_discard -= skipped;
        Ok(())
    }

    fn raw_length(&self, input: &ByteBuf) -> Result<i64> {
        let index = input.reader_index() + self.config.length_field_offset;
        let raw = input.get_uint(
            index,
            self.config.length_field_length,
            self.config.byte_order,
        )?;
        // 8 字节字段按补码解释，其余宽度的值不超过 u32::MAX。
        Ok(raw as i64)
    }

    fn corrupted(&self, input: &mut ByteBuf, error: FrameError) -> Result<DecodeOutcome> {
        input.skip(self.end_offset)?;
        Ok(DecodeOutcome::Discarded(error.into_core("length-field")))
    }
}

impl ByteToMessageDecoder for LengthFieldBasedFrameDecoder {
    fn decode(&mut self, input: &mut ByteBuf) -> Result<DecodeOutcome> {
        if self.bytes_to_discard > 0 {
            self.discard_pending(input)?;
            if self.bytes_to_discard > 0 {
                return Ok(DecodeOutcome::Incomplete);
            }
        }

        if input.readable_bytes() < self.end_offset {
            return Ok(DecodeOutcome::Incomplete);
        }

        let raw = self.raw_length(input)?;
        if raw < 0 {
            return self.corrupted(input, FrameError::NegativeLength(raw));
        }
        let Some(frame_length) = raw
            .checked_add(self.config.length_adjustment)
            .and_then(|length| length.checked_add(self.end_offset as i64))
        else {
            return self.corrupted(input, FrameError::LengthOverflow);
        };
        if frame_length < self.end_offset as i64 {
            return self.corrupted(
                input,
                FrameError::AdjustedLengthTooSmall {
                    length: frame_length,
                    min: self.end_offset,
                },
            );
        }

        let frame_length = frame_length as u64;
        if frame_length > self.config.max_frame_length as u64 {
            let skipped = frame_length.min(input.readable_bytes() as u64);
            input.skip(skipped as usize)?;
            self.bytes_to_discard = frame_length - skipped;
            return Ok(DecodeOutcome::Discarded(
                FrameError::TooLong {
                    length: frame_length,
                    max: self.config.max_frame_length,
                }
                .into_core("length-field"),
            ));
        }

        let frame_length = frame_length as usize;
        if input.readable_bytes() < frame_length {
            return Ok(DecodeOutcome::Incomplete);
        }

        let strip = self.config.initial_bytes_to_strip;
        if strip > frame_length {
            input.skip(frame_length)?;
            return Ok(DecodeOutcome::Discarded(
                FrameError::StripExceedsFrame {
                    strip,
                    frame: frame_length,
                }
                .into_core("length-field"),
            ));
        }

        input.skip(strip)?;
        let frame = input.read_slice(frame_length - strip)?;
        Ok(DecodeOutcome::Complete(frame.into()))
    }
}

#[cfg(test)]
mod tests {
    use spark_core::error::codes;

    use super::*;

    fn decoder(config: LengthFieldConfig) -> LengthFieldBasedFrameDecoder {
        LengthFieldBasedFrameDecoder::try_new(config).expect("合法配置")
    }

    fn frame(outcome: DecodeOutcome) -> Vec<u8> {
        match outcome {
            DecodeOutcome::Complete(msg) => msg
                .into_buffer()
                .expect("产出字节帧")
                .readable_slice()
                .to_vec(),
            other => panic!("期望完整帧，实际为 {other:?}"),
        }
    }

    fn fault_code(outcome: DecodeOutcome) -> &'static str {
        match outcome {
            DecodeOutcome::Discarded(fault) => fault.code(),
            other => panic!("期望帧故障，实际为 {other:?}"),
        }
    }

    #[test]
    fn big_endian_prefix_is_stripped() {
        let mut decoder = decoder(
            LengthFieldConfig::default()
                .with_length_field(0, 2)
                .with_initial_bytes_to_strip(2),
        );
        let mut input = ByteBuf::copy_from_slice(b"\x00\x05hello").expect("输入");
        assert_eq!(frame(decoder.decode(&mut input).expect("解码")), b"hello");
        assert!(!input.is_readable());
    }

    #[test]
    fn partial_frame_waits_without_consuming() {
        let mut decoder = decoder(LengthFieldConfig::default().with_length_field(0, 2));
        let mut input = ByteBuf::copy_from_slice(b"\x00\x05hel").expect("输入");
        assert!(matches!(
            decoder.decode(&mut input).expect("解码"),
            DecodeOutcome::Incomplete
        ));
        assert_eq!(input.reader_index(), 0);
        input.write_bytes(b"lo").expect("追加");
        assert_eq!(
            frame(decoder.decode(&mut input).expect("解码")),
            b"\x00\x05hello",
            "未配置剥离时保留长度字段"
        );
    }

    #[test]
    fn header_before_length_and_adjustment_are_honoured() {
        // 帧格式：2 字节魔数 | 小端 4 字节长度（包含整个帧头）| 负载
        let mut decoder = decoder(
            LengthFieldConfig::default()
                .with_byte_order(ByteOrder::LittleEndian)
                .with_length_field(2, 4)
                .with_length_adjustment(-6)
                .with_initial_bytes_to_strip(6),
        );
        let mut input = ByteBuf::copy_from_slice(b"\xCA\xFE\x09\x00\x00\x00abc").expect("输入");
        assert_eq!(frame(decoder.decode(&mut input).expect("解码")), b"abc");
    }

    #[test]
    fn negative_eight_byte_length_is_corrupted() {
        let mut decoder = decoder(LengthFieldConfig::default().with_length_field(0, 8));
        let mut input = ByteBuf::with_capacity(16).expect("容量");
        input.write_i64(-1).expect("写入");
        input.write_bytes(b"rest").expect("写入");
        assert_eq!(
            fault_code(decoder.decode(&mut input).expect("解码")),
            codes::PROTOCOL_CORRUPTED_FRAME
        );
        assert_eq!(input.readable_slice(), b"rest", "仅跳过长度字段区域");
    }

    #[test]
    fn adjusted_length_below_header_is_corrupted() {
        let mut decoder = decoder(
            LengthFieldConfig::default()
                .with_length_field(0, 1)
                .with_length_adjustment(-4),
        );
        let mut input = ByteBuf::copy_from_slice(b"\x02ab").expect("输入");
        assert_eq!(
            fault_code(decoder.decode(&mut input).expect("解码")),
            codes::PROTOCOL_CORRUPTED_FRAME
        );
        assert_eq!(input.reader_index(), 1);
    }

    #[test]
    fn oversized_frame_is_discarded_across_reads() {
        let mut decoder = decoder(
            LengthFieldConfig::default()
                .with_max_frame_length(8)
                .with_length_field(0, 1),
        );
        let mut input = ByteBuf::copy_from_slice(b"\x0Aabcd").expect("输入");
        assert_eq!(
            fault_code(decoder.decode(&mut input).expect("解码")),
            codes::PROTOCOL_TOO_LONG_FRAME
        );
        assert!(!input.is_readable());
        assert_eq!(decoder.pending_discard(), 6);

        input.write_bytes(b"efg").expect("追加");
        assert!(matches!(
            decoder.decode(&mut input).expect("解码"),
            DecodeOutcome::Incomplete
        ));
        assert_eq!(decoder.pending_discard(), 3);

        input.write_bytes(b"hij\x02ok").expect("追加");
        assert_eq!(frame(decoder.decode(&mut input).expect("解码")), b"\x02ok");
        assert_eq!(decoder.pending_discard(), 0);
    }

    #[test]
    fn strip_larger_than_frame_is_corrupted() {
        let mut decoder = decoder(
            LengthFieldConfig::default()
                .with_length_field(0, 1)
                .with_initial_bytes_to_strip(4),
        );
        let mut input = ByteBuf::copy_from_slice(b"\x01x\x00").expect("输入");
        let DecodeOutcome::Discarded(fault) = decoder.decode(&mut input).expect("解码") else {
            panic!("剥离量超过帧长应上报故障");
        };
        assert_eq!(fault.code(), codes::PROTOCOL_CORRUPTED_FRAME);
        assert_eq!(input.readable_slice(), b"\x00", "跳过整帧后继续解析");
    }

    #[test]
    fn invalid_configurations_are_rejected() {
        for config in [
            LengthFieldConfig::default().with_max_frame_length(0),
            LengthFieldConfig::default().with_length_field(0, 3),
            LengthFieldConfig::default()
                .with_max_frame_length(4)
                .with_length_field(2, 4),
            LengthFieldConfig::default().with_length_field(usize::MAX, 8),
        ] {
            let err = LengthFieldBasedFrameDecoder::try_new(config).expect_err("非法配置");
            assert_eq!(err.code(), codes::CONFIG_INVALID);
        }
    }
}
