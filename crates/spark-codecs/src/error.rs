use spark_core::CoreError;
use spark_core::error::codes;
use thiserror::Error;

/// 帧格式违规的具体原因，作为 [`CoreError`] 的底层原因上报。
///
/// # 契约说明（What）
/// - 超长类违规映射为 `protocol.too_long_frame`，其余映射为 `protocol.corrupted_frame`；
/// - 变体字段保留排障所需的全部数值，日志中可直接还原现场。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("帧长度 {length} 超过上限 {max}")]
    TooLong { length: u64, max: usize },
    #[error("长度字段为负数: {0}")]
    NegativeLength(i64),
    #[error("调整后的帧长度 {length} 小于长度字段结束偏移 {min}")]
    AdjustedLengthTooSmall { length: i64, min: usize },
    #[error("剥离字节数 {strip} 超过帧长度 {frame}")]
    StripExceedsFrame { strip: usize, frame: usize },
    #[error("帧长度 {length} 无法以 {width} 字节表示")]
    LengthDoesNotFit { length: u64, width: usize },
    #[error("帧长度计算溢出")]
    LengthOverflow,
}

impl FrameError {
    /// 对应的稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            Self::TooLong { .. } | Self::LengthDoesNotFit { .. } => codes::PROTOCOL_TOO_LONG_FRAME,
            _ => codes::PROTOCOL_CORRUPTED_FRAME,
        }
    }

    /// 包装为框架统一错误，原因链保留本变体。
    pub fn into_core(self, codec: &str) -> CoreError {
        CoreError::new(self.code(), format!("{codec}: {self}")).with_cause(self)
    }
}

impl From<FrameError> for CoreError {
    fn from(error: FrameError) -> Self {
        error.into_core("frame")
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn too_long_maps_to_stable_code_with_cause() {
        let err = FrameError::TooLong { length: 9, max: 3 }.into_core("delimiter");
        assert_eq!(err.code(), codes::PROTOCOL_TOO_LONG_FRAME);
        assert!(err.message().starts_with("delimiter: "));
        let cause = err
            .source()
            .and_then(|source| source.downcast_ref::<FrameError>())
            .expect("原因链保留 FrameError");
        assert_eq!(cause, &FrameError::TooLong { length: 9, max: 3 });
    }

    #[test]
    fn malformed_headers_are_corrupted_frames() {
        let err: CoreError = FrameError::NegativeLength(-1).into();
        assert_eq!(err.code(), codes::PROTOCOL_CORRUPTED_FRAME);
    }
}
