use std::fmt;

use crate::buffer::{ByteBuf, PipelineMessage};
use crate::error::{CoreError, Result, codes};
use crate::pipeline::{Capabilities, ChannelHandler, Context};

/// 单次解码尝试的结果。
#[derive(Debug)]
pub enum DecodeOutcome {
    /// 切出一帧，解码器已消费对应字节。
    Complete(PipelineMessage),
    /// 数据不足，等待下一次入站字节。
    Incomplete,
    /// 丢弃了一段无法成帧的字节，附带需要上报的帧故障。
    Discarded(CoreError),
}

/// 从累积字节中增量切帧的解码器。
///
/// # 契约说明（What）
/// - 返回 [`DecodeOutcome::Complete`] 时必须已推进 `input` 的读游标，否则适配器判定为停滞；
/// - 返回 [`DecodeOutcome::Incomplete`] 时不应消费半帧字节，剩余数据会保留到下一次调用；
/// - 返回 [`DecodeOutcome::Discarded`] 表示可恢复的帧故障：故障沿 Pipeline 错误路径上报，连接不关闭；
/// - 返回 `Err` 表示解码器自身无法继续，适配器丢弃累积数据并把错误交给故障拦截。
pub trait ByteToMessageDecoder: Send + 'static {
    fn decode(&mut self, input: &mut ByteBuf) -> Result<DecodeOutcome>;

    /// 连接失活时的最后一次解码，默认与 [`decode`](Self::decode) 相同。
    fn decode_last(&mut self, input: &mut ByteBuf) -> Result<DecodeOutcome> {
        self.decode(input)
    }
}

enum Emitted {
    Frame(PipelineMessage),
    Fault(CoreError),
}

struct DecoderState<D> {
    decoder: D,
    cumulation: Option<ByteBuf>,
}

impl<D: ByteToMessageDecoder> DecoderState<D> {
    fn cumulate(&mut self, incoming: ByteBuf) -> Result<()> {
        match self.cumulation.as_mut() {
            Some(cumulation) => cumulation.write_slice(&incoming),
            None => {
                self.cumulation = Some(incoming);
                Ok(())
            }
        }
    }

    /// 对累积缓冲反复解码，直到数据不足或出现错误。
    fn drain(&mut self, last: bool, emitted: &mut Vec<Emitted>) -> Result<()> {
        let outcome = self.decode_loop(last, emitted);
        if outcome.is_err() {
            self.cumulation = None;
        }
        if self.cumulation.as_ref().is_some_and(|buf| !buf.is_readable()) {
            self.cumulation = None;
        } else if let Some(cumulation) = self.cumulation.as_mut() {
            cumulation.discard_read_bytes();
        }
        outcome
    }

    fn decode_loop(&mut self, last: bool, emitted: &mut Vec<Emitted>) -> Result<()> {
        while let Some(input) = self.cumulation.as_mut().filter(|buf| buf.is_readable()) {
            let before = input.readable_bytes();
            let outcome = if last {
                self.decoder.decode_last(input)?
            } else {
                self.decoder.decode(input)?
            };
            let consumed = before - input.readable_bytes();
            match outcome {
                DecodeOutcome::Complete(frame) => {
                    if consumed == 0 {
                        return Err(CoreError::new(
                            codes::CODEC_DECODER_STALLED,
                            "decoder produced a frame without consuming any bytes",
                        ));
                    }
                    emitted.push(Emitted::Frame(frame));
                }
                DecodeOutcome::Incomplete => break,
                DecodeOutcome::Discarded(fault) => {
                    emitted.push(Emitted::Fault(fault));
                    if consumed == 0 {
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}

/// 把 [`ByteToMessageDecoder`] 包装为入站 Handler，负责跨读取累积剩余字节。
///
/// # 逻辑解析（How）
/// 1. 首个字节缓冲直接作为累积缓冲，后续缓冲追加到其后；
/// 2. 循环调用解码器，单次读取可能产出多帧；
/// 3. 每帧作为新的读事件向后传播，帧故障经 `fire_exception_caught` 上报；
/// 4. 累积缓冲读尽即释放，有剩余时压缩已读区域；
/// 5. 连接失活时做最后一次解码，丢弃残余字节后继续传播失活事件。
///
/// 非字节缓冲消息原样放行。
pub struct ByteToMessageHandler<D> {
    state: spin::Mutex<DecoderState<D>>,
}

impl<D: ByteToMessageDecoder> ByteToMessageHandler<D> {
    pub fn new(decoder: D) -> Self {
        Self {
            state: spin::Mutex::new(DecoderState {
                decoder,
                cumulation: None,
            }),
        }
    }

    /// 当前累积、尚未成帧的字节数。
    pub fn buffered_bytes(&self) -> usize {
        self.state
            .lock()
            .cumulation
            .as_ref()
            .map_or(0, ByteBuf::readable_bytes)
    }

    fn forward(ctx: &Context<'_>, emitted: Vec<Emitted>) {
        for item in emitted {
            match item {
                Emitted::Frame(frame) => ctx.fire_read(frame),
                Emitted::Fault(fault) => ctx.fire_exception_caught(fault),
            }
        }
    }
}

impl<D: ByteToMessageDecoder> ChannelHandler for ByteToMessageHandler<D> {
    fn capabilities(&self) -> Capabilities {
        Capabilities::READ | Capabilities::INACTIVE
    }

    fn on_read(&self, ctx: &Context<'_>, msg: PipelineMessage) -> Result<()> {
        let incoming = match msg.into_buffer() {
            Ok(buf) => buf,
            Err(other) => {
                ctx.fire_read(other);
                return Ok(());
            }
        };
        let mut emitted = Vec::new();
        let outcome = {
            let mut state = self.state.lock();
            state
                .cumulate(incoming)
                .and_then(|()| state.drain(false, &mut emitted))
        };
        Self::forward(ctx, emitted);
        outcome
    }

    fn on_channel_inactive(&self, ctx: &Context<'_>) -> Result<()> {
        let mut emitted = Vec::new();
        let (outcome, leftover) = {
            let mut state = self.state.lock();
            let outcome = state.drain(true, &mut emitted);
            let leftover = state
                .cumulation
                .take()
                .map_or(0, |buf| buf.readable_bytes());
            (outcome, leftover)
        };
        Self::forward(ctx, emitted);
        if leftover > 0 {
            ctx.logger().debug(&format!(
                "decoder `{}` discarded {leftover} trailing bytes on inactive",
                ctx.name()
            ));
        }
        ctx.fire_channel_inactive();
        outcome
    }
}

impl<D> fmt::Debug for ByteToMessageHandler<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let buffered = self
            .state
            .lock()
            .cumulation
            .as_ref()
            .map_or(0, ByteBuf::readable_bytes);
        f.debug_struct("ByteToMessageHandler")
            .field("buffered", &buffered)
            .finish()
    }
}
