#![deny(unsafe_code)]
#![allow(clippy::result_large_err)]
#![doc = "spark-core: 事件驱动网络 I/O 框架的核心契约。"]
#![doc = ""]
#![doc = "== 模块地图 =="]
#![doc = "- [`buffer`]：游标式可增长字节缓冲、双字节序访问器，以及自适应接收尺寸估算器。"]
#![doc = "- [`pipeline`]：基于 Arena 的可变 Handler 链，按能力位图路由事件并拦截故障。"]
#![doc = "- [`codec`]：运行在 Pipeline 内的流式解码/编码适配器。"]
#![doc = "- [`channel`]：连接契约、生命周期状态机与并发属性表。"]
#![doc = "- [`observability`]：显式注入的日志契约，默认空实现。"]
#![doc = ""]
#![doc = "== 数据流 =="]
#![doc = "传输层按估算器给出的尺寸分配缓冲并读入字节，随后把缓冲作为入站事件交给 Pipeline；"]
#![doc = "解码器在链中重组帧并作为新的入站事件继续传播，业务 Handler 可反向写出消息，"]
#![doc = "出站消息经编码器回到链头，由传输层排队发送。"]

pub mod buffer;
pub mod channel;
pub mod codec;
pub mod error;
pub mod observability;
pub mod pipeline;
pub mod test_stubs;

pub use buffer::{
    ByteBuf, ByteOrder, DatagramPacket, PipelineMessage, RecvBufferConfig, RecvSizeEstimator,
};
pub use channel::{
    AttributeKey, Attributes, Channel, ChannelId, ChannelInitializer, ChannelLifecycle,
    ChannelState,
};
pub use error::{CoreError, ErrorCategory, Result};
pub use observability::{LogRecord, LogSeverity, Logger, NoopLogger, TracingLogger};
pub use pipeline::{Capabilities, ChannelHandler, Context, Pipeline};
