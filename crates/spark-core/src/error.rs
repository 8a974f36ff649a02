//! 稳定错误域：所有可观察故障最终收敛为 [`CoreError`]。
//!
//! # 设计背景（Why）
//! - 缓冲越界、配置非法、帧格式错误与传输故障分散在不同层次，需要统一错误码以便日志与告警精确归类。
//! - Handler 故障以显式 `Result` 返回，Pipeline 检查结果后执行“先自身、再向后扫描、最后记录”的路由，
//!   因此错误类型必须可跨线程移动且可携带底层原因。
//!
//! # 契约说明（What）
//! - `code` 采用 `<领域>.<语义>` 形式，集中登记在 [`codes`]；
//! - `category` 描述处置策略，未显式设置时按错误码推断；
//! - `cause` 为可选底层原因，通过 [`std::error::Error::source`] 暴露。

use std::borrow::Cow;
use std::error::Error;
use std::fmt;

/// 底层原因的装箱形式。
pub type ErrorCause = Box<dyn Error + Send + Sync + 'static>;

/// 框架统一的结果别名。
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

/// 错误的主要处置策略。
///
/// # 契约说明（What）
/// - `Retryable`：瞬时故障，调用方可稍后重试；
/// - `NonRetryable`：确定性失败，重试无意义；
/// - `ProtocolViolation`：对端或配置违反帧协议，需丢弃或关闭；
/// - `ResourceExhausted`：容量或队列耗尽；
/// - `Timeout` / `Cancelled`：截止时间或取消触发。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Retryable,
    NonRetryable,
    ProtocolViolation,
    ResourceExhausted,
    Timeout,
    Cancelled,
}

/// 稳定错误码集合。
///
/// 新增错误码时需同时在 [`default_category`] 中登记分类。
pub mod codes {
    /// 写入所需容量超过缓冲上限。
    pub const BUFFER_OUT_OF_CAPACITY: &str = "buffer.out_of_capacity";
    /// 顺序读取超过写游标。
    pub const BUFFER_INSUFFICIENT_READABLE: &str = "buffer.insufficient_readable_bytes";
    /// 随机访问或游标设置越界。
    pub const BUFFER_INDEX_OUT_OF_RANGE: &str = "buffer.index_out_of_range";
    /// 向字节汇写出时未能一次写完可读区域。
    pub const BUFFER_SHORT_WRITE: &str = "buffer.short_write";
    /// 以零容量构造缓冲。
    pub const BUFFER_ZERO_CAPACITY: &str = "buffer.zero_capacity";
    /// 与字节源/字节汇交互时的 I/O 失败。
    pub const BUFFER_IO: &str = "buffer.io";

    /// Handler 未声明任何事件能力。
    pub const PIPELINE_INVALID_HANDLER: &str = "pipeline.invalid_handler_type";
    /// 引用了不存在的上下文名称。
    pub const PIPELINE_UNKNOWN_CONTEXT: &str = "pipeline.unknown_context";
    /// 上下文名称重复或占用保留名。
    pub const PIPELINE_DUPLICATE_NAME: &str = "pipeline.duplicate_name";
    /// 出站消息没有任何消费方。
    pub const PIPELINE_WRITE_UNCONSUMED: &str = "pipeline.write_unconsumed";

    /// 消息到消息编码器未产出任何消息。
    pub const CODEC_MUST_PRODUCE_MESSAGE: &str = "codec.must_produce_at_least_one_message";
    /// 编解码器收到无法处理的消息类型。
    pub const CODEC_UNSUPPORTED_MESSAGE: &str = "codec.unsupported_message";
    /// 解码器产出消息却未消费任何字节。
    pub const CODEC_DECODER_STALLED: &str = "codec.decoder_stalled";

    /// 帧长度超过上限。
    pub const PROTOCOL_TOO_LONG_FRAME: &str = "protocol.too_long_frame";
    /// 帧头内容损坏（负长度、长度不足等）。
    pub const PROTOCOL_CORRUPTED_FRAME: &str = "protocol.corrupted_frame";

    /// 构造参数非法。
    pub const CONFIG_INVALID: &str = "config.invalid";

    /// 连接已关闭或尚未激活。
    pub const TRANSPORT_CLOSED: &str = "transport.closed";
    /// 写队列已满且当前运行时无法阻塞等待。
    pub const TRANSPORT_BACKPRESSURE: &str = "transport.backpressure";
}

/// 按错误码推断默认分类。
pub fn default_category(code: &str) -> ErrorCategory {
    match code {
        codes::BUFFER_OUT_OF_CAPACITY | codes::TRANSPORT_BACKPRESSURE => {
            ErrorCategory::ResourceExhausted
        }
        codes::BUFFER_SHORT_WRITE | codes::BUFFER_IO => ErrorCategory::Retryable,
        codes::PROTOCOL_TOO_LONG_FRAME
        | codes::PROTOCOL_CORRUPTED_FRAME
        | codes::CODEC_UNSUPPORTED_MESSAGE
        | codes::CODEC_MUST_PRODUCE_MESSAGE
        | codes::CODEC_DECODER_STALLED => ErrorCategory::ProtocolViolation,
        _ => ErrorCategory::NonRetryable,
    }
}

/// `CoreError` 承载稳定错误码、面向排障人员的消息、处置分类与可选底层原因。
///
/// # 逻辑解析（How）
/// - Builder 风格的 `with_*` 方法叠加上下文；
/// - `Display` 输出 `code: message`，便于日志直接检索错误码。
///
/// # 示例（Examples）
/// ```rust
/// use spark_core::error::{codes, CoreError, ErrorCategory};
///
/// let err = CoreError::new(codes::PROTOCOL_TOO_LONG_FRAME, "frame length 9000 exceeds 8192");
/// assert_eq!(err.code(), codes::PROTOCOL_TOO_LONG_FRAME);
/// assert_eq!(err.category(), ErrorCategory::ProtocolViolation);
/// ```
#[derive(Debug)]
pub struct CoreError {
    code: &'static str,
    message: Cow<'static, str>,
    category: Option<ErrorCategory>,
    cause: Option<ErrorCause>,
}

impl CoreError {
    /// 构造核心错误，分类默认按错误码推断。
    pub fn new(code: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
            category: None,
            cause: None,
        }
    }

    /// 附带底层原因。
    pub fn with_cause(mut self, cause: impl Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// 就地设置底层原因。
    pub fn set_cause(&mut self, cause: impl Error + Send + Sync + 'static) {
        self.cause = Some(Box::new(cause));
    }

    /// 显式覆盖处置分类。
    pub fn with_category(mut self, category: ErrorCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// 面向排障人员的描述。
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 处置分类；未显式设置时按错误码推断。
    pub fn category(&self) -> ErrorCategory {
        self.category.unwrap_or_else(|| default_category(self.code))
    }

    /// 底层原因。
    pub fn cause(&self) -> Option<&ErrorCause> {
        self.cause.as_ref()
    }

    /// 判断错误码是否匹配。
    pub fn is(&self, code: &str) -> bool {
        self.code == code
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl Error for CoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_ref()
            .map(|cause| cause.as_ref() as &(dyn Error + 'static))
    }
}

/// 构造配置错误的便捷函数，供各模块在构造期快速失败。
pub fn config_error(message: impl Into<Cow<'static, str>>) -> CoreError {
    CoreError::new(codes::CONFIG_INVALID, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn category_falls_back_to_code_table() {
        let err = CoreError::new(codes::BUFFER_OUT_OF_CAPACITY, "full");
        assert_eq!(err.category(), ErrorCategory::ResourceExhausted);
        let err = CoreError::new("custom.reason", "custom");
        assert_eq!(err.category(), ErrorCategory::NonRetryable, "未登记错误码应视为不可重试");
    }

    #[test]
    fn explicit_category_wins() {
        let err = CoreError::new(codes::BUFFER_IO, "io").with_category(ErrorCategory::Timeout);
        assert_eq!(err.category(), ErrorCategory::Timeout);
    }

    #[test]
    fn cause_is_exposed_as_source() {
        let err = CoreError::new(codes::BUFFER_IO, "read failed")
            .with_cause(io::Error::new(io::ErrorKind::BrokenPipe, "pipe"));
        let source = err.source().expect("底层原因应通过 source 暴露");
        assert_eq!(source.to_string(), "pipe");
        assert_eq!(err.to_string(), "buffer.io: read failed");
    }
}
