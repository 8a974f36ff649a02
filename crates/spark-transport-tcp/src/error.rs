use std::io;

use spark_core::CoreError;
use spark_core::error::ErrorCategory;

/// 描述一次底层操作对应的稳定错误码与默认文案。
#[derive(Clone, Copy, Debug)]
pub(crate) struct OperationKind {
    pub code: &'static str,
    pub message: &'static str,
}

pub(crate) const BIND: OperationKind = OperationKind {
    code: "spark.transport.tcp.bind_failed",
    message: "tcp bind",
};
pub(crate) const ACCEPT: OperationKind = OperationKind {
    code: "spark.transport.tcp.accept_failed",
    message: "tcp accept",
};
pub(crate) const CONNECT: OperationKind = OperationKind {
    code: "spark.transport.tcp.connect_failed",
    message: "tcp connect",
};
pub(crate) const READ: OperationKind = OperationKind {
    code: "spark.transport.tcp.read_failed",
    message: "tcp read",
};
pub(crate) const WRITE: OperationKind = OperationKind {
    code: "spark.transport.tcp.write_failed",
    message: "tcp write",
};
pub(crate) const SHUTDOWN: OperationKind = OperationKind {
    code: "spark.transport.tcp.shutdown_failed",
    message: "tcp shutdown",
};
pub(crate) const CONFIGURE: OperationKind = OperationKind {
    code: "spark.transport.tcp.configure_failed",
    message: "tcp configure",
};
pub(crate) const SERVE: OperationKind = OperationKind {
    code: "spark.transport.tcp.task_failed",
    message: "tcp io task",
};

/// 超时错误码，读写截止时间与建连超时共用。
pub const TIMEOUT_CODE: &str = "spark.transport.tcp.timeout";

/// 将 IO 错误映射为框架级 CoreError，并附带错误分类。
pub(crate) fn map_io_error(kind: OperationKind, error: io::Error) -> CoreError {
    let category = categorize_io_error(&error);
    CoreError::new(kind.code, format!("{}: {}", kind.message, error))
        .with_category(category)
        .with_cause(error)
}

/// 构造超时错误。
pub(crate) fn timeout_error(kind: OperationKind) -> CoreError {
    let message = format!("{} timed out", kind.message);
    CoreError::new(TIMEOUT_CODE, message).with_category(ErrorCategory::Timeout)
}

fn categorize_io_error(error: &io::Error) -> ErrorCategory {
    use io::ErrorKind;
    match error.kind() {
        ErrorKind::TimedOut => ErrorCategory::Timeout,
        ErrorKind::WouldBlock
        | ErrorKind::Interrupted
        | ErrorKind::ConnectionRefused
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::NotConnected
        | ErrorKind::AddrInUse
        | ErrorKind::AddrNotAvailable
        | ErrorKind::BrokenPipe
        | ErrorKind::WriteZero => ErrorCategory::Retryable,
        _ => ErrorCategory::NonRetryable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_keep_operation_code_and_cause() {
        let err = map_io_error(READ, io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert_eq!(err.code(), "spark.transport.tcp.read_failed");
        assert_eq!(err.category(), ErrorCategory::Retryable);
        assert!(err.message().starts_with("tcp read: "));
        assert!(err.cause().is_some());
    }

    #[test]
    fn timeouts_are_classified() {
        let err = timeout_error(WRITE);
        assert_eq!(err.code(), TIMEOUT_CODE);
        assert_eq!(err.category(), ErrorCategory::Timeout);
        assert_eq!(err.message(), "tcp write timed out");
    }
}
