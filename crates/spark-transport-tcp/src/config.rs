use std::io;
use std::time::Duration;

use serde::Deserialize;
use socket2::{SockRef, TcpKeepalive};
use spark_core::error::config_error;
use spark_core::{RecvBufferConfig, Result};
use tokio::net::TcpStream;

/// 写队列的默认容量。
pub const DEFAULT_WRITE_QUEUE_CAPACITY: usize = 16;

/// 单条 TCP 连接的套接字与 I/O 行为配置。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 把 `TCP_NODELAY`、`SO_KEEPALIVE`、`SO_LINGER` 与收发缓冲等内核选项，以及读写截止时间、
///   写队列容量、接收缓冲预测区间集中到一个可序列化结构，服务端与客户端共享同一套语义；
/// - 避免调用方直接操作 `socket2` 或平台相关常量。
///
/// ## 核心逻辑（How）
/// - 套接字选项在连接建立后、读写任务启动前通过 `apply` 一次性落地；
/// - `connect_timeout` 只约束客户端建连；`read_timeout` / `write_timeout` 在每次底层读写前重新计时，超时视为传输故障并触发关闭；
/// - 时长字段在配置文件中以毫秒表示。
///
/// ## 契约说明（What）
/// - `write_queue_capacity` 必须为正；`recv_buffer` 须满足 `0 < minimum ≤ initial ≤ maximum`；
/// - 设置了的截止时间必须大于零；
/// - `None` 表示沿用内核默认值或不设截止。
///
/// ## 设计取舍与注意事项（Trade-offs）
/// - `SO_LINGER` 在 Linux 上按秒取整；设置过小可能导致发送缓冲中的数据被丢弃并触发对端 `ECONNRESET`。
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TcpChannelOptions {
    pub nodelay: bool,
    #[serde(rename = "keepalive_ms", with = "millis")]
    pub keepalive: Option<Duration>,
    #[serde(rename = "linger_ms", with = "millis")]
    pub linger: Option<Duration>,
    pub send_buffer_size: Option<usize>,
    pub recv_buffer_size: Option<usize>,
    #[serde(rename = "connect_timeout_ms", with = "millis")]
    pub connect_timeout: Option<Duration>,
    #[serde(rename = "read_timeout_ms", with = "millis")]
    pub read_timeout: Option<Duration>,
    #[serde(rename = "write_timeout_ms", with = "millis")]
    pub write_timeout: Option<Duration>,
    pub write_queue_capacity: usize,
    pub recv_buffer: RecvBufferConfig,
}

impl Default for TcpChannelOptions {
    fn default() -> Self {
        Self {
            nodelay: true,
            keepalive: None,
            linger: None,
            send_buffer_size: None,
            recv_buffer_size: None,
            connect_timeout: None,
            read_timeout: None,
            write_timeout: None,
            write_queue_capacity: DEFAULT_WRITE_QUEUE_CAPACITY,
            recv_buffer: RecvBufferConfig::default(),
        }
    }
}

impl TcpChannelOptions {
    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    /// 开启 `SO_KEEPALIVE` 并设置首个探测前的空闲时长。
    pub fn with_keepalive(mut self, idle: Option<Duration>) -> Self {
        self.keepalive = idle;
        self
    }

    pub fn with_linger(mut self, linger: Option<Duration>) -> Self {
        self.linger = linger;
        self
    }

    pub fn with_send_buffer_size(mut self, size: Option<usize>) -> Self {
        self.send_buffer_size = size;
        self
    }

    pub fn with_recv_buffer_size(mut self, size: Option<usize>) -> Self {
        self.recv_buffer_size = size;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn with_write_queue_capacity(mut self, capacity: usize) -> Self {
        self.write_queue_capacity = capacity;
        self
    }

    pub fn with_recv_buffer(mut self, recv_buffer: RecvBufferConfig) -> Self {
        self.recv_buffer = recv_buffer;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.write_queue_capacity == 0 {
            return Err(config_error("write_queue_capacity must be positive"));
        }
        for (name, timeout) in [
            ("connect_timeout", self.connect_timeout),
            ("read_timeout", self.read_timeout),
            ("write_timeout", self.write_timeout),
        ] {
            if timeout.is_some_and(|timeout| timeout.is_zero()) {
                return Err(config_error(format!("{name} must be greater than zero")));
            }
        }
        self.recv_buffer.validate()
    }

    pub(crate) fn apply(&self, stream: &TcpStream) -> io::Result<()> {
        stream.set_nodelay(self.nodelay)?;
        let socket = SockRef::from(stream);
        if let Some(idle) = self.keepalive {
            socket.set_tcp_keepalive(&TcpKeepalive::new().with_time(idle))?;
        }
        if self.linger.is_some() {
            socket.set_linger(self.linger)?;
        }
        if let Some(size) = self.send_buffer_size {
            socket.set_send_buffer_size(size)?;
        }
        if let Some(size) = self.recv_buffer_size {
            socket.set_recv_buffer_size(size)?;
        }
        Ok(())
    }
}

/// 以毫秒整数表示的可选时长。
pub(crate) mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use spark_core::error::codes;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        let options = TcpChannelOptions::default();
        assert!(options.nodelay);
        assert_eq!(options.write_queue_capacity, DEFAULT_WRITE_QUEUE_CAPACITY);
        options.validate().expect("默认配置合法");
    }

    #[test]
    fn durations_load_as_milliseconds() {
        let options: TcpChannelOptions = toml::from_str(
            r#"
            nodelay = false
            read_timeout_ms = 1500
            linger_ms = 0
            write_queue_capacity = 4

            [recv_buffer]
            minimum = 128
            initial = 2048
            maximum = 8192
            "#,
        )
        .expect("解析配置");
        assert!(!options.nodelay);
        assert_eq!(options.read_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(options.linger, Some(Duration::ZERO));
        assert_eq!(options.write_timeout, None);
        assert_eq!(options.write_queue_capacity, 4);
        assert_eq!(options.recv_buffer, RecvBufferConfig::new(128, 2048, 8192));
    }

    #[test]
    fn invalid_options_fail_validation() {
        for options in [
            TcpChannelOptions::default().with_write_queue_capacity(0),
            TcpChannelOptions::default().with_read_timeout(Some(Duration::ZERO)),
            TcpChannelOptions::default().with_recv_buffer(RecvBufferConfig::new(4096, 1024, 8192)),
        ] {
            let err = options.validate().expect_err("非法配置");
            assert_eq!(err.code(), codes::CONFIG_INVALID);
        }
    }
}
