//! 可观测性契约：显式注入的日志能力。
//!
//! # 设计缘起（Why）
//! - 组件不依赖全局日志单例，而是在构造时接收 `Arc<dyn Logger>`；未注入时退化为 [`NoopLogger`]。
//! - 生产环境通过 [`TracingLogger`] 接入 `tracing` 生态，由宿主决定订阅者与过滤策略。

mod logging;

pub use logging::{LogRecord, LogSeverity, Logger, NoopLogger, TracingLogger, shared_noop_logger};
