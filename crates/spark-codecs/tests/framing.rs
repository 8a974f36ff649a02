//! 分帧编解码器挂入 Pipeline 后的端到端行为。

use std::sync::Arc;

use proptest::prelude::*;
use spark_codecs::{
    DelimiterBasedFrameDecoder, LengthFieldBasedFrameDecoder, LengthFieldConfig,
    LengthFieldPrepender, LineBasedFrameDecoder,
};
use spark_core::codec::{ByteToMessageHandler, MessageToMessageEncoderHandler};
use spark_core::error::codes;
use spark_core::test_stubs::EmbeddedChannel;
use spark_core::{ByteBuf, ByteOrder, PipelineMessage};

fn bytes(raw: &[u8]) -> ByteBuf {
    ByteBuf::copy_from_slice(raw).expect("非空输入")
}

fn drain(mut next: impl FnMut() -> Option<PipelineMessage>) -> Vec<Vec<u8>> {
    std::iter::from_fn(|| next())
        .map(|msg| {
            msg.into_buffer()
                .expect("分帧结果为字节缓冲")
                .readable_slice()
                .to_vec()
        })
        .collect()
}

#[test]
fn line_frames_are_split_and_stripped() {
    let channel = EmbeddedChannel::new();
    let handler = Arc::new(ByteToMessageHandler::new(
        LineBasedFrameDecoder::try_new(1024, true).expect("合法配置"),
    ));
    channel
        .add_handler("line", handler.clone())
        .expect("注册行解码器");

    channel.write_inbound(bytes(b"foo\nbar\n"));

    assert_eq!(
        drain(|| channel.read_inbound()),
        [b"foo".to_vec(), b"bar".to_vec()]
    );
    assert_eq!(handler.buffered_bytes(), 0, "余量为空");
    assert!(channel.take_faults().is_empty());
}

#[test]
fn length_field_frame_is_extracted() {
    let channel = EmbeddedChannel::new();
    let config = LengthFieldConfig::default()
        .with_byte_order(ByteOrder::BigEndian)
        .with_length_field(0, 2)
        .with_initial_bytes_to_strip(2);
    channel
        .add_handler(
            "length",
            Arc::new(ByteToMessageHandler::new(
                LengthFieldBasedFrameDecoder::try_new(config).expect("合法配置"),
            )),
        )
        .expect("注册长度字段解码器");

    // 长度字段与负载分两次到达。
    channel.write_inbound(bytes(b"\x00\x05he"));
    assert!(channel.read_inbound().is_none());
    channel.write_inbound(bytes(b"llo"));

    assert_eq!(drain(|| channel.read_inbound()), [b"hello".to_vec()]);
}

#[test]
fn prepender_emits_prefix_then_payload() {
    let channel = EmbeddedChannel::new();
    let prepender = LengthFieldPrepender::try_new(ByteOrder::BigEndian, 2, 0, false).expect("合法配置");
    channel
        .add_handler("prepender", Arc::new(MessageToMessageEncoderHandler::new(prepender)))
        .expect("注册前置编码器");

    channel.write_outbound(bytes(b"hi"));

    assert_eq!(
        drain(|| channel.read_outbound()),
        [b"\x00\x02".to_vec(), b"hi".to_vec()]
    );
}

#[test]
fn oversized_delimited_frame_raises_fault_without_message() {
    let channel = EmbeddedChannel::new();
    let handler = Arc::new(ByteToMessageHandler::new(
        DelimiterBasedFrameDecoder::try_new(3, true, [b"\n".to_vec()]).expect("合法配置"),
    ));
    channel
        .add_handler("delimiter", handler.clone())
        .expect("注册分隔符解码器");

    channel.write_inbound(bytes(b"abcdef\n"));

    assert!(channel.read_inbound().is_none(), "超长帧不产出消息");
    assert_eq!(handler.buffered_bytes(), 0, "7 个字节全部被消费");
    let faults = channel.take_faults_with_origin();
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0].0.code(), codes::PROTOCOL_TOO_LONG_FRAME);
    assert_eq!(faults[0].1.as_deref(), Some("delimiter"), "故障来源为解码器上下文");
}

#[test]
fn prepender_output_decodes_back_through_length_field_decoder() {
    let sender = EmbeddedChannel::new();
    sender
        .add_handler(
            "prepender",
            Arc::new(MessageToMessageEncoderHandler::new(
                LengthFieldPrepender::try_new(ByteOrder::LittleEndian, 4, 0, false)
                    .expect("合法配置"),
            )),
        )
        .expect("注册前置编码器");
    let receiver = EmbeddedChannel::new();
    let config = LengthFieldConfig::default()
        .with_byte_order(ByteOrder::LittleEndian)
        .with_initial_bytes_to_strip(4);
    receiver
        .add_handler(
            "length",
            Arc::new(ByteToMessageHandler::new(
                LengthFieldBasedFrameDecoder::try_new(config).expect("合法配置"),
            )),
        )
        .expect("注册长度字段解码器");

    for payload in [&b"alpha"[..], b"b", b"gamma-delta"] {
        sender.write_outbound(bytes(payload));
    }
    while let Some(chunk) = sender.read_outbound() {
        receiver.write_inbound(chunk);
    }

    assert_eq!(
        drain(|| receiver.read_inbound()),
        [b"alpha".to_vec(), b"b".to_vec(), b"gamma-delta".to_vec()]
    );
}

#[test]
fn length_field_config_loads_from_toml() {
    let config: LengthFieldConfig = toml::from_str(
        r#"
        byte_order = "little_endian"
        max_frame_length = 4096
        length_field_length = 2
        initial_bytes_to_strip = 2
        "#,
    )
    .expect("解析配置");
    assert_eq!(
        config,
        LengthFieldConfig::default()
            .with_byte_order(ByteOrder::LittleEndian)
            .with_max_frame_length(4096)
            .with_length_field(0, 2)
            .with_initial_bytes_to_strip(2)
    );
    assert!(toml::from_str::<LengthFieldConfig>("unknown = 1").is_err());
}

proptest! {
    /// 无论输入如何切分，行解码器产出的帧序列都相同。
    #[test]
    fn line_framing_is_independent_of_chunking(
        lines in prop::collection::vec("[a-z]{0,12}", 1..16),
        cuts in prop::collection::vec(1usize..8, 1..64),
    ) {
        let wire: Vec<u8> = lines.iter().flat_map(|line| format!("{line}\r\n").into_bytes()).collect();
        let channel = EmbeddedChannel::new();
        channel
            .add_handler(
                "line",
                Arc::new(ByteToMessageHandler::new(
                    LineBasedFrameDecoder::try_new(64, true).expect("合法配置"),
                )),
            )
            .expect("注册行解码器");

        let mut rest = &wire[..];
        let mut cuts = cuts.into_iter().cycle();
        while !rest.is_empty() {
            let take = cuts.next().unwrap_or(1).min(rest.len());
            let (chunk, tail) = rest.split_at(take);
            channel.write_inbound(bytes(chunk));
            rest = tail;
        }

        let expected: Vec<Vec<u8>> = lines.iter().map(|line| line.clone().into_bytes()).collect();
        prop_assert_eq!(drain(|| channel.read_inbound()), expected);
        prop_assert!(channel.take_faults().is_empty());
    }
}
