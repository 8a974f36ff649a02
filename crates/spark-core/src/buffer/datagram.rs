use std::net::SocketAddr;

use super::ByteBuf;

/// 携带对端地址的数据报，是 UDP 通道入站与出站消息的载体。
///
/// - 入站：`remote` 为发送方地址；
/// - 出站：`remote` 为目标地址，`None` 表示发往已连接的对端。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatagramPacket {
    content: ByteBuf,
    remote: Option<SocketAddr>,
}

impl DatagramPacket {
    pub fn new(content: ByteBuf, remote: Option<SocketAddr>) -> Self {
        Self { content, remote }
    }

    pub fn content(&self) -> &ByteBuf {
        &self.content
    }

    pub fn content_mut(&mut self) -> &mut ByteBuf {
        &mut self.content
    }

    pub fn remote(&self) -> Option<SocketAddr> {
        self.remote
    }

    /// 拆分为内容与地址。
    pub fn into_parts(self) -> (ByteBuf, Option<SocketAddr>) {
        (self.content, self.remote)
    }
}
