#![doc = r#"
# spark-transport-udp

## 模块使命（Why）
- **统一 UDP 通路**：围绕 Tokio `UdpSocket` 提供数据报通道，使无连接传输与 TCP 共享同一套
  [`Pipeline`](spark_core::Pipeline) 与 Handler 模型。

## 核心契约（What）
- [`UdpChannel`] 负责套接字生命周期管理：`bind` / `connect` 建立通道，`serve` 运行接收循环；
- 每个入站数据报对应一次 `read` 事件，消息为携带发送方地址的 [`DatagramPacket`](spark_core::DatagramPacket)；
- 出站接受 `Datagram`（显式目标）或 `Buffer`（发往已连接的对端）；
- 约束：调用方必须运行在 Tokio 运行时中。

## 实现策略（How）
- 接收缓冲由 [`RecvSizeEstimator`](spark_core::RecvSizeEstimator) 按最近报文长度自适应；
- 失败以 [`UdpError`] 描述，跨 crate 边界时转换为带 `spark.transport.udp.*` 错误码的
  [`CoreError`](spark_core::CoreError)。
"#]

mod channel;
mod config;
mod error;

pub use channel::UdpChannel;
pub use config::UdpChannelOptions;
pub use error::{TIMEOUT_CODE, UdpError};
