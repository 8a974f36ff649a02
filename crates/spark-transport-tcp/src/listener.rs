use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use spark_core::observability::shared_noop_logger;
use spark_core::{Channel, ChannelId, ChannelInitializer, Logger, Result};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use crate::error::{self, map_io_error};
use crate::{TcpChannel, TcpChannelOptions};

/// 接受失败后的退避时长，避免文件描述符耗尽时空转。
const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);

/// TCP 监听服务：每个入站连接构造一个 [`TcpChannel`]，经初始化器装配后独立运行。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 服务端只需声明“新连接的 Pipeline 长什么样”，接受循环、套接字选项与连接生命周期由本类型统一托管。
///
/// ## 逻辑 (How)
/// - `serve` 循环接受连接；每个连接应用监听器级别的 [`TcpChannelOptions`]，调用初始化器后
///   在独立任务中运行 [`TcpChannel::serve`]；
/// - 存活连接登记在并发表中，连接结束时自行注销；
/// - `shutdown` 停止接受循环，`serve` 返回前关闭全部存活连接。
///
/// ## 契约 (What)
/// - 初始化失败的连接被直接关闭，不影响后续接受；
/// - 单次接受失败只记录日志，接受循环继续；
/// - **前置条件**：必须在 Tokio 运行时中使用。
pub struct TcpServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    options: TcpChannelOptions,
    logger: Arc<dyn Logger>,
    channels: Arc<DashMap<ChannelId, Arc<TcpChannel>>>,
    shutdown: watch::Sender<bool>,
}

impl TcpServer {
    /// 绑定到指定地址。
    pub async fn bind(addr: SocketAddr, options: TcpChannelOptions) -> Result<Self> {
        options.validate()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|err| map_io_error(error::BIND, err))?;
        let local_addr = listener
            .local_addr()
            .map_err(|err| map_io_error(error::BIND, err))?;
        Ok(Self {
            listener,
            local_addr,
            options,
            logger: shared_noop_logger(),
            channels: Arc::new(DashMap::new()),
            shutdown: watch::Sender::new(false),
        })
    }

    /// 注入日志实现，新接受的连接共享该实现。
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// 实际绑定的地址。
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 当前存活的连接数。
    pub fn connection_count(&self) -> usize {
        self.channels.len()
    }

    /// 运行接受循环，直到 [`shutdown`](Self::shutdown) 被调用。
    pub async fn serve(&self, initializer: impl ChannelInitializer) -> Result<()> {
        let initializer: Arc<dyn ChannelInitializer> = Arc::new(initializer);
        let mut shutdown = self.shutdown.subscribe();
        self.logger
            .info(&format!("tcp server listening on {}", self.local_addr));
        loop {
            let accepted = tokio::select! {
                biased;
                _ = shutdown.wait_for(|stopped| *stopped) => break,
                accepted = self.listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, _)) => self.spawn_channel(stream, &initializer),
                Err(err) => {
                    let err = map_io_error(error::ACCEPT, err);
                    self.logger.warn_with_error("tcp accept failed", &err);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }

        let live: Vec<Arc<TcpChannel>> = self
            .channels
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for channel in &live {
            channel.close();
        }
        for channel in &live {
            channel.closed().await;
        }
        self.logger
            .info(&format!("tcp server on {} stopped", self.local_addr));
        Ok(())
    }

    /// 请求停止接受循环，可在任意线程调用。
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    fn spawn_channel(&self, stream: TcpStream, initializer: &Arc<dyn ChannelInitializer>) {
        let channel =
            match TcpChannel::from_stream(stream, self.options.clone(), Arc::clone(&self.logger)) {
                Ok(channel) => channel,
                Err(err) => {
                    self.logger
                        .warn_with_error("failed to set up accepted tcp connection", &err);
                    return;
                }
            };
        if let Err(err) = initializer.init_channel(&*channel) {
            self.logger.warn_with_error(
                &format!("initializer rejected tcp channel {}", channel.id()),
                &err,
            );
            return;
        }

        let id = channel.id();
        self.channels.insert(id, Arc::clone(&channel));
        let channels = Arc::clone(&self.channels);
        let logger = Arc::clone(&self.logger);
        tokio::spawn(async move {
            if let Err(err) = channel.serve().await {
                logger.debug(&format!("tcp channel {id} closed with error: {err}"));
            }
            channels.remove(&id);
        });
    }
}

impl fmt::Debug for TcpServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpServer")
            .field("local_addr", &self.local_addr)
            .field("connections", &self.channels.len())
            .finish_non_exhaustive()
    }
}
