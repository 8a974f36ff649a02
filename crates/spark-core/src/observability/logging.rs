use std::borrow::Cow;
use std::error::Error;
use std::sync::{Arc, OnceLock};

/// 日志级别，取 `tracing` 级别的同名子集。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LogSeverity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// 单条结构化日志记录。
///
/// # 逻辑解析（How）
/// - `message` 使用 `Cow`，静态文案零分配，动态文案按需分配；
/// - `target` 表示日志分类（如 `spark.pipeline`），缺省时由实现决定；
/// - `error` 以引用携带根因，避免克隆错误链。
#[derive(Debug)]
pub struct LogRecord<'a> {
    pub message: Cow<'a, str>,
    pub severity: LogSeverity,
    pub target: Option<Cow<'a, str>>,
    pub error: Option<&'a (dyn Error + 'static)>,
}

impl<'a> LogRecord<'a> {
    /// 构建新的日志记录。
    pub fn new(message: impl Into<Cow<'a, str>>, severity: LogSeverity) -> Self {
        Self {
            message: message.into(),
            severity,
            target: None,
            error: None,
        }
    }

    /// 指定日志分类。
    pub fn with_target(mut self, target: impl Into<Cow<'a, str>>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// 附带根因。
    pub fn with_error(mut self, error: &'a (dyn Error + 'static)) -> Self {
        self.error = Some(error);
        self
    }
}

/// 日志接口的核心契约。
///
/// # 契约说明（What）
/// - `log` 为唯一必需方法；便捷方法内部构造 [`LogRecord`] 再调用 `log`，所有路径共享相同逻辑。
/// - **后置条件**：实现应尽量非阻塞，它会在 Pipeline 分发的热路径上被调用。
pub trait Logger: Send + Sync + 'static {
    /// 提交结构化日志。
    fn log(&self, record: &LogRecord<'_>);

    /// 输出 TRACE 日志。
    fn trace(&self, message: &str) {
        self.log(&LogRecord::new(message, LogSeverity::Trace));
    }

    /// 输出 DEBUG 日志。
    fn debug(&self, message: &str) {
        self.log(&LogRecord::new(message, LogSeverity::Debug));
    }

    /// 输出 INFO 日志。
    fn info(&self, message: &str) {
        self.log(&LogRecord::new(message, LogSeverity::Info));
    }

    /// 输出 WARN 日志。
    fn warn(&self, message: &str) {
        self.log(&LogRecord::new(message, LogSeverity::Warn));
    }

    /// 输出带根因的 WARN 日志。
    fn warn_with_error(&self, message: &str, error: &(dyn Error + 'static)) {
        self.log(&LogRecord::new(message, LogSeverity::Warn).with_error(error));
    }

    /// 输出 ERROR 日志。
    fn error(&self, message: &str) {
        self.log(&LogRecord::new(message, LogSeverity::Error));
    }

    /// 输出带根因的 ERROR 日志。
    fn error_with_error(&self, message: &str, error: &(dyn Error + 'static)) {
        self.log(&LogRecord::new(message, LogSeverity::Error).with_error(error));
    }
}

/// 丢弃所有日志的空实现，是未注入日志能力时的默认值。
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn log(&self, _record: &LogRecord<'_>) {}
}

/// 返回进程内共享的 [`NoopLogger`] 句柄，避免每个组件重复分配。
pub fn shared_noop_logger() -> Arc<dyn Logger> {
    static NOOP: OnceLock<Arc<dyn Logger>> = OnceLock::new();
    Arc::clone(NOOP.get_or_init(|| Arc::new(NoopLogger)))
}

/// 将日志转发到 `tracing` 的实现。
///
/// # 逻辑解析（How）
/// - `tracing` 宏的 target 必须是编译期常量，因此记录中的 `target` 以字段 `log.target` 输出；
/// - 根因以 `Display` 形式写入 `error` 字段。
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, record: &LogRecord<'_>) {
        let target = record.target.as_deref().unwrap_or("spark");
        let error = record.error.map(|err| err.to_string());
        let error = error.as_deref();
        let message = record.message.as_ref();
        match record.severity {
            LogSeverity::Trace => tracing::trace!(log.target = target, error, "{message}"),
            LogSeverity::Debug => tracing::debug!(log.target = target, error, "{message}"),
            LogSeverity::Info => tracing::info!(log.target = target, error, "{message}"),
            LogSeverity::Warn => tracing::warn!(log.target = target, error, "{message}"),
            LogSeverity::Error => tracing::error!(log.target = target, error, "{message}"),
        }
    }
}
