use spark_core::codec::{ByteToMessageDecoder, DecodeOutcome};
use spark_core::error::config_error;
use spark_core::{ByteBuf, Result};

use crate::FrameError;

/// 按一个或多个分隔符切帧的解码器。
///
/// # 逻辑解析（How）
/// 1. 在可读区域中分别查找每个分隔符，取偏移最小的一次出现；偏移相同时取较长的分隔符；
/// 2. 未找到时等待更多数据；若累积已超过 `max_length` 加上最长分隔符可能残留的前缀，
///    丢弃可读字节并进入丢弃模式（保留末尾可能属于半个分隔符的字节），
///    直到下一个分隔符出现时一并跳过，再上报一次超长故障；
/// 3. 找到但帧长超过 `max_length` 时跳过帧与分隔符，上报超长故障，不产出消息；
/// 4. 否则切出帧，按 `strip_delimiter` 决定是否保留分隔符。
///
/// # 契约说明（What）
/// - `max_length` 为不含分隔符的帧长上限，必须为正；
/// - 分隔符列表不能为空，且每个分隔符至少一个字节；
/// - 超长故障经 Pipeline 错误路径上报，连接不关闭，后续数据在下一个分隔符处重新同步。
#[derive(Debug, Clone)]
pub struct DelimiterBasedFrameDecoder {
    max_length: usize,
    strip_delimiter: bool,
    delimiters: Vec<Vec<u8>>,
    longest_delimiter: usize,
    discarding: bool,
    discarded_bytes: usize,
}

impl DelimiterBasedFrameDecoder {
    pub fn try_new<I, D>(max_length: usize, strip_delimiter: bool, delimiters: I) -> Result<Self>
    where
        I: IntoIterator<Item = D>,
        D: Into<Vec<u8>>,
    {
        if max_length == 0 {
            return Err(config_error("delimiter decoder max_length must be positive"));
        }
        let delimiters: Vec<Vec<u8>> = delimiters.into_iter().map(Into::into).collect();
        if delimiters.is_empty() {
            return Err(config_error("delimiter decoder needs at least one delimiter"));
        }
        if delimiters.iter().any(Vec::is_empty) {
            return Err(config_error("delimiters must not be empty"));
        }
        let longest_delimiter = delimiters.iter().map(Vec::len).max().unwrap_or(1);
        Ok(Self {
            max_length,
            strip_delimiter,
            delimiters,
            longest_delimiter,
            discarding: false,
            discarded_bytes: 0,
        })
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn strip_delimiter(&self) -> bool {
        self.strip_delimiter
    }

    /// 返回 `(帧长度, 分隔符长度)`。
    fn find_frame(&self, input: &ByteBuf) -> Option<(usize, usize)> {
        self.delimiters
            .iter()
            .filter_map(|delimiter| {
                input
                    .index_of(delimiter)
                    .map(|offset| (offset, delimiter.len()))
            })
            .min_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)))
    }

    fn too_long(&self, length: usize) -> DecodeOutcome {
        DecodeOutcome::Discarded(
            FrameError::TooLong {
                length: length as u64,
                max: self.max_length,
            }
            .into_core("delimiter"),
        )
    }
}

impl ByteToMessageDecoder for DelimiterBasedFrameDecoder {
    fn decode(&mut self, input: &mut ByteBuf) -> Result<DecodeOutcome> {
        let Some((frame_length, delimiter_length)) = self.find_frame(input) else {
            // 末尾最多 `longest_delimiter - 1` 字节可能是被拆开的分隔符前缀。
            let partial = self.longest_delimiter - 1;
            let readable = input.readable_bytes();
            if self.discarding || readable > self.max_length + partial {
                let skipped = readable.saturating_sub(partial);
                input.skip(skipped)?;
                self.discarded_bytes += skipped;
                self.discarding = true;
            }
            return Ok(DecodeOutcome::Incomplete);
        };

        if self.discarding {
            let total = self.discarded_bytes + frame_length;
            input.skip(frame_length + delimiter_length)?;
            self.discarding = false;
            self.discarded_bytes = 0;
            return Ok(self.too_long(total));
        }

        if frame_length > self.max_length {
            input.skip(frame_length + delimiter_length)?;
            return Ok(self.too_long(frame_length));
        }

        let frame = if self.strip_delimiter {
            let frame = input.read_slice(frame_length)?;
            input.skip(delimiter_length)?;
            frame
        } else {
            input.read_slice(frame_length + delimiter_length)?
        };
        Ok(DecodeOutcome::Complete(frame.into()))
    }
}
