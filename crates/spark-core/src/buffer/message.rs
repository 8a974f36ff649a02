use std::any::Any;
use std::fmt;

use super::{ByteBuf, DatagramPacket};

/// 在 Pipeline 中流动的消息信封。
///
/// # 设计背景（Why）
/// - 传输层只理解字节缓冲与数据报，业务解码器却会产出任意类型；信封以枚举区分两者，
///   使解码/编码适配器能够在不做运行期类型探测的情况下放行非字节消息。
///
/// # 契约说明（What）
/// - `Buffer`：字节流片段或完整帧；
/// - `Datagram`：带地址的数据报；
/// - `User`：业务自定义消息，通过 [`downcast_user`](Self::downcast_user) 取回具体类型。
pub enum PipelineMessage {
    Buffer(ByteBuf),
    Datagram(DatagramPacket),
    User(Box<dyn Any + Send>),
}

impl PipelineMessage {
    /// 以业务对象构造消息。
    pub fn from_user<T: Any + Send>(value: T) -> Self {
        Self::User(Box::new(value))
    }

    /// 若为字节缓冲则返回引用。
    pub fn as_buffer(&self) -> Option<&ByteBuf> {
        match self {
            Self::Buffer(buf) => Some(buf),
            _ => None,
        }
    }

    /// 若为字节缓冲则取出，否则原样退回。
    pub fn into_buffer(self) -> Result<ByteBuf, Self> {
        match self {
            Self::Buffer(buf) => Ok(buf),
            other => Err(other),
        }
    }

    /// 若为数据报则取出，否则原样退回。
    pub fn into_datagram(self) -> Result<DatagramPacket, Self> {
        match self {
            Self::Datagram(packet) => Ok(packet),
            other => Err(other),
        }
    }

    /// 尝试把业务消息还原为具体类型；类型不符时原样退回。
    pub fn downcast_user<T: Any + Send>(self) -> Result<T, Self> {
        match self {
            Self::User(boxed) => boxed
                .downcast::<T>()
                .map(|value| *value)
                .map_err(Self::User),
            other => Err(other),
        }
    }

    /// 消息种类的稳定标签，用于日志。
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Buffer(_) => "buffer",
            Self::Datagram(_) => "datagram",
            Self::User(_) => "user",
        }
    }
}

impl From<ByteBuf> for PipelineMessage {
    fn from(buf: ByteBuf) -> Self {
        Self::Buffer(buf)
    }
}

impl From<DatagramPacket> for PipelineMessage {
    fn from(packet: DatagramPacket) -> Self {
        Self::Datagram(packet)
    }
}

impl fmt::Debug for PipelineMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffer(buf) => f.debug_tuple("Buffer").field(buf).finish(),
            Self::Datagram(packet) => f.debug_tuple("Datagram").field(packet).finish(),
            Self::User(_) => f.write_str("User(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_messages_round_trip_through_downcast() {
        let msg = PipelineMessage::from_user(42u32);
        assert_eq!(msg.kind(), "user");
        let msg = msg.downcast_user::<String>().expect_err("类型不符应退回原消息");
        assert_eq!(msg.downcast_user::<u32>().expect("类型相符"), 42);
    }

    #[test]
    fn buffer_accessors() {
        let buf = ByteBuf::copy_from_slice(b"abc").expect("构造缓冲");
        let msg = PipelineMessage::from(buf);
        assert_eq!(msg.as_buffer().map(ByteBuf::readable_bytes), Some(3));
        assert!(msg.into_datagram().is_err());
    }
}
