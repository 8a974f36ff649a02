//! 字节缓冲、自适应接收尺寸与消息信封。
//!
//! - [`ByteBuf`]：游标式可增长缓冲，双字节序数值访问器；
//! - [`RecvSizeEstimator`]：按观测到的读取量预测下一次接收缓冲尺寸；
//! - [`PipelineMessage`] / [`DatagramPacket`]：在 Pipeline 中流动的消息形态。

mod allocator;
mod byte_buf;
mod datagram;
mod message;

pub use allocator::{
    DEFAULT_INITIAL, DEFAULT_MAXIMUM, DEFAULT_MINIMUM, RecvBufferConfig, RecvSizeEstimator,
    SIZE_TABLE, size_table_index,
};
pub use byte_buf::{ByteBuf, ByteOrder, CALCULATE_THRESHOLD, MIN_NEW_CAPACITY, calculate_new_capacity};
pub use datagram::DatagramPacket;
pub use message::PipelineMessage;
