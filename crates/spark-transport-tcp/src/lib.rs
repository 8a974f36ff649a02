#![doc = r#"
# spark-transport-tcp

## 设计动机（Why）
- **定位**：该 crate 提供 Spark 在 Tokio 运行时上的 TCP 连接与监听服务，
  封装建连、接受、读写任务、背压与关闭时序等底层细节。
- **架构角色**：把字节流接入 `spark-core` 的 [`Pipeline`](spark_core::Pipeline)：
  读任务产出的缓冲作为入站事件，链头写出的消息进入连接的有界写队列。

## 核心契约（What）
- **输入条件**：调用方必须在 Tokio 运行时中使用本实现；
- **输出保障**：监听、建连、读写失败均映射为带稳定错误码的
  [`CoreError`](spark_core::CoreError)，如 `spark.transport.tcp.read_failed`、
  `spark.transport.tcp.timeout`，并附带 [`ErrorCategory`](spark_core::ErrorCategory)；
- **生命周期**：连接遵循 `Created → Active → Inactive → Closed`，关闭请求幂等。

## 实现策略（How）
- **执行框架**：`TcpStream::into_split` 拆出读、写两半，分别由独立任务驱动；
- **截止时间**：读写截止时间在每次底层 IO 前以 `tokio::time::timeout` 重新计时；
- **背压治理**：写队列满时，多线程运行时内阻塞生产者，单线程运行时内返回
  `transport.backpressure`。

## 风险与考量（Trade-offs）
- 入站分发在读任务内同步执行，Handler 内的长耗时逻辑会直接拖慢该连接的读取。
"#]

mod channel;
mod config;
mod error;
mod listener;

pub use channel::TcpChannel;
pub use config::{DEFAULT_WRITE_QUEUE_CAPACITY, TcpChannelOptions};
pub use error::TIMEOUT_CODE;
pub use listener::TcpServer;
