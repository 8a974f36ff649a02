//! Handler Pipeline：按名称组织、可在运行期增删改的双向事件分发链。
//!
//! # 模块结构（How）
//! - [`capability`]：Handler 声明的事件能力位图；
//! - `chain`：以下标相连的 Arena 链表，链头与链尾为固定哨兵；
//! - [`context`]：Handler 回调时看到的位置视图与分发逻辑；
//! - [`handler`]：Handler 契约；
//! - [`pipeline`]：对外的变更与触发入口。
//!
//! # 分发规则（What）
//! - 入站事件自链头向后查找第一个声明对应能力的上下文；
//! - 出站写入自链尾向前查找第一个声明写能力的上下文，最终由链头交给连接；
//! - Handler 返回的错误在发生处拦截：先自身、再向后查找错误处理者、最后记录为未处理故障。

pub mod capability;
mod chain;
pub mod context;
pub mod handler;
#[allow(clippy::module_inception)]
pub mod pipeline;

pub use capability::Capabilities;
pub use context::Context;
pub use handler::ChannelHandler;
pub use pipeline::Pipeline;
