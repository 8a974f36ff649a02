use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use spark_core::CoreError;
use spark_core::error::ErrorCategory;
use thiserror::Error;

/// 接收截止时间到期时使用的错误码。
pub const TIMEOUT_CODE: &str = "spark.transport.udp.timeout";

/// UDP 模块统一错误类型。
///
/// 跨越 crate 边界时经 `From` 转换为带稳定错误码的 [`CoreError`]，原始错误保留为 cause。
#[derive(Debug, Error)]
pub enum UdpError {
    /// 绑定失败。
    #[error("无法绑定 UDP 套接字到 {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },
    /// 关联默认对端失败。
    #[error("无法连接 UDP 对端 {addr}: {source}")]
    Connect { addr: SocketAddr, source: io::Error },
    /// 套接字选项或地址查询失败。
    #[error("无法配置 UDP 套接字: {0}")]
    Configure(#[source] io::Error),
    /// 接收失败。
    #[error("接收 UDP 报文失败: {0}")]
    Receive(#[source] io::Error),
    /// 发送失败。
    #[error("发送 UDP 报文失败: {0}")]
    Send(#[source] io::Error),
    /// 内核只接受了部分报文。
    #[error("UDP 报文只发送了 {written}/{expected} 字节")]
    ShortSend { written: usize, expected: usize },
    /// 出站报文既未携带目标地址，通道也没有默认对端。
    #[error("UDP 报文缺少目标地址，且通道未连接对端")]
    NoDestination,
    /// 在截止时间内没有收到任何报文。
    #[error("UDP 接收在 {0:?} 内未收到报文")]
    ReadTimeout(Duration),
}

impl UdpError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            UdpError::Bind { .. } => "spark.transport.udp.bind_failed",
            UdpError::Connect { .. } => "spark.transport.udp.connect_failed",
            UdpError::Configure(_) => "spark.transport.udp.configure_failed",
            UdpError::Receive(_) => "spark.transport.udp.recv_failed",
            UdpError::Send(_) => "spark.transport.udp.send_failed",
            UdpError::ShortSend { .. } => "spark.transport.udp.short_send",
            UdpError::NoDestination => "spark.transport.udp.no_destination",
            UdpError::ReadTimeout(_) => TIMEOUT_CODE,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            UdpError::Bind { source, .. } | UdpError::Connect { source, .. } => {
                categorize_io_error(source)
            }
            UdpError::Configure(source) | UdpError::Receive(source) | UdpError::Send(source) => {
                categorize_io_error(source)
            }
            UdpError::ShortSend { .. } => ErrorCategory::Retryable,
            UdpError::NoDestination => ErrorCategory::NonRetryable,
            UdpError::ReadTimeout(_) => ErrorCategory::Timeout,
        }
    }
}

impl From<UdpError> for CoreError {
    fn from(err: UdpError) -> Self {
        let code = err.code();
        let category = err.category();
        CoreError::new(code, err.to_string())
            .with_category(category)
            .with_cause(err)
    }
}

fn categorize_io_error(error: &io::Error) -> ErrorCategory {
    use io::ErrorKind;
    match error.kind() {
        ErrorKind::TimedOut => ErrorCategory::Timeout,
        ErrorKind::WouldBlock
        | ErrorKind::Interrupted
        | ErrorKind::ConnectionRefused
        | ErrorKind::ConnectionReset
        | ErrorKind::AddrInUse
        | ErrorKind::AddrNotAvailable => ErrorCategory::Retryable,
        _ => ErrorCategory::NonRetryable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_keeps_code_category_and_cause() {
        let err: CoreError = UdpError::Send(io::Error::new(io::ErrorKind::Interrupted, "eintr")).into();
        assert_eq!(err.code(), "spark.transport.udp.send_failed");
        assert_eq!(err.category(), ErrorCategory::Retryable);
        assert!(err.message().starts_with("发送 UDP 报文失败"));
        assert!(err.cause().is_some());
    }

    #[test]
    fn read_timeout_is_classified() {
        let err: CoreError = UdpError::ReadTimeout(Duration::from_millis(20)).into();
        assert_eq!(err.code(), TIMEOUT_CODE);
        assert_eq!(err.category(), ErrorCategory::Timeout);
    }
}
