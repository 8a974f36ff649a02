use spark_core::codec::{ByteToMessageDecoder, DecodeOutcome};
use spark_core::{ByteBuf, Result};

use crate::DelimiterBasedFrameDecoder;

/// 以 `\n` 或 `\r\n` 结尾的行解码器。
///
/// 在分隔符解码器之上固定分隔符集合；`\r\n` 优先于单独的 `\n`，
/// 因此剥离分隔符时行尾不会残留 `\r`。
#[derive(Debug, Clone)]
pub struct LineBasedFrameDecoder {
    inner: DelimiterBasedFrameDecoder,
}

impl LineBasedFrameDecoder {
    pub fn try_new(max_length: usize, strip_delimiter: bool) -> Result<Self> {
        let inner = DelimiterBasedFrameDecoder::try_new(
            max_length,
            strip_delimiter,
            [b"\r\n".to_vec(), b"\n".to_vec()],
        )?;
        Ok(Self { inner })
    }

    pub fn max_length(&self) -> usize {
        self.inner.max_length()
    }
}

impl ByteToMessageDecoder for LineBasedFrameDecoder {
    fn decode(&mut self, input: &mut ByteBuf) -> Result<DecodeOutcome> {
        self.inner.decode(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(decoder: &mut LineBasedFrameDecoder, input: &mut ByteBuf) -> Vec<Vec<u8>> {
        let mut lines = Vec::new();
        while let DecodeOutcome::Complete(msg) = decoder.decode(input).expect("解码不失败") {
            let buf = msg.into_buffer().expect("行解码器只产出字节帧");
            lines.push(buf.readable_slice().to_vec());
        }
        lines
    }

    #[test]
    fn crlf_and_lf_are_both_line_endings() {
        let mut decoder = LineBasedFrameDecoder::try_new(64, true).expect("合法配置");
        let mut input = ByteBuf::copy_from_slice(b"one\r\ntwo\nthree").expect("输入");
        assert_eq!(decode_all(&mut decoder, &mut input), [b"one".to_vec(), b"two".to_vec()]);
        assert_eq!(input.readable_slice(), b"three");
    }

    #[test]
    fn unstripped_lines_keep_their_terminator() {
        let mut decoder = LineBasedFrameDecoder::try_new(64, false).expect("合法配置");
        let mut input = ByteBuf::copy_from_slice(b"a\r\nb\n").expect("输入");
        assert_eq!(decode_all(&mut decoder, &mut input), [b"a\r\n".to_vec(), b"b\n".to_vec()]);
    }

    #[test]
    fn crlf_split_across_reads_at_max_length() {
        let mut decoder = LineBasedFrameDecoder::try_new(3, true).expect("合法配置");
        let mut input = ByteBuf::copy_from_slice(b"abc\r").expect("输入");
        assert!(decode_all(&mut decoder, &mut input).is_empty());
        assert_eq!(input.readable_slice(), b"abc\r", "半个分隔符不触发丢弃");
        input.write_bytes(b"\n").expect("追加");
        assert_eq!(decode_all(&mut decoder, &mut input), [b"abc".to_vec()]);
    }
}
