use std::time::Duration;

use serde::{Deserialize, Deserializer};
use spark_core::error::config_error;
use spark_core::{RecvBufferConfig, Result};

/// UDP 通道的套接字与接收行为配置。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 将 `SO_BROADCAST`、接收截止时间与接收缓冲预测区间显式建模，避免宿主层散布零散参数。
///
/// ## 契约（What）
/// - `broadcast`：是否允许向广播地址发送；
/// - `read_timeout`：两次入站报文之间允许的最长空闲，到期视为故障并关闭通道；配置文件中以 `read_timeout_ms` 表示；
/// - `recv_buffer`：`maximum` 决定接收区大小，不超过它的报文总是完整交付，超过的报文被内核截断；
///   `minimum`/`initial` 只影响交付缓冲的初始容量，由估算器按最近报文长度调整。
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UdpChannelOptions {
    pub broadcast: bool,
    #[serde(rename = "read_timeout_ms", deserialize_with = "millis")]
    pub read_timeout: Option<Duration>,
    pub recv_buffer: RecvBufferConfig,
}

impl UdpChannelOptions {
    /// 启用或关闭广播。
    pub fn with_broadcast(mut self, enabled: bool) -> Self {
        self.broadcast = enabled;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_recv_buffer(mut self, recv_buffer: RecvBufferConfig) -> Self {
        self.recv_buffer = recv_buffer;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.read_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(config_error("read_timeout must be greater than zero"));
        }
        self.recv_buffer.validate()
    }
}

fn millis<'de, D>(deserializer: D) -> std::result::Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
}
