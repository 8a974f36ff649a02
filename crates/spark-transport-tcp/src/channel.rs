use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use spark_core::error::codes;
use spark_core::observability::shared_noop_logger;
use spark_core::{
    Attributes, ByteBuf, Channel, ChannelId, ChannelLifecycle, ChannelState, CoreError, Logger,
    Pipeline, PipelineMessage, RecvSizeEstimator, Result,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::{mpsc, watch};

use crate::TcpChannelOptions;
use crate::error::{self, OperationKind, map_io_error, timeout_error};

/// 关闭时冲刷已排队写出的时间上限，未配置写截止时间时使用。
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// `serve` 启动前暂存的 I/O 资源。
struct IoParts {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    queue: mpsc::Receiver<ByteBuf>,
    estimator: RecvSizeEstimator,
}

/// 基于 Tokio 的 TCP 连接。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 每条连接由独立的读任务与写任务驱动：读任务按估算器分配缓冲并同步驱动入站分发，
///   写任务排空有界队列；两者的生命周期与连接绑定。
/// - Pipeline 链头的写处理器只调用 [`Channel::send`]，因此业务 Handler 无需感知 Tokio。
///
/// ## 逻辑 (How)
/// - 流在构造时拆分为读、写两半；`serve` 先启动写任务，再激活连接并触发 `active`，最后启动读任务；
/// - `send` 优先无阻塞入队；队列已满时在多线程运行时内以 `block_in_place` 阻塞等待，
///   在单线程运行时内返回 `transport.backpressure`；
/// - 关闭顺序：标记失活（幂等）→ 同步触发 `inactive` → 通知两个任务停止 → 写任务冲刷已排队数据后关闭写方向
///   → 等待两个任务结束 → 标记关闭并向 `serve` 的调用方报告首个传输错误。
///
/// ## 契约 (What)
/// - 读到 EOF 视为正常关闭，`serve` 返回 `Ok(())`；
/// - 读写错误与截止时间超时触发关闭，`serve` 返回该错误；
/// - `close` 可在任意线程（包括 Handler 内部）调用，不等待关闭完成；需要等待时使用 [`closed`](Self::closed)。
/// - 在 current-thread 运行时内 `send` 从不阻塞：队列已满时该消息不入队，错误交还调用方决定重试或放弃；
///   多线程运行时与运行时之外的调用会阻塞到队列腾出空位，不丢弃数据。
///
/// ## 注意事项 (Trade-offs)
/// - 入站事件只在读任务中分发，严格有序；写任务触发的关闭会在写任务线程上分发 `inactive`。
pub struct TcpChannel {
    id: ChannelId,
    lifecycle: ChannelLifecycle,
    attributes: Attributes,
    pipeline: Pipeline,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
    options: TcpChannelOptions,
    logger: Arc<dyn Logger>,
    outbound: mpsc::Sender<ByteBuf>,
    io: spin::Mutex<Option<IoParts>>,
    stop: watch::Sender<bool>,
    done: watch::Sender<bool>,
    failure: spin::Mutex<Option<CoreError>>,
}

impl TcpChannel {
    /// 建立到目标地址的连接，日志丢弃。
    pub async fn connect(addr: SocketAddr, options: TcpChannelOptions) -> Result<Arc<Self>> {
        Self::connect_with_logger(addr, options, shared_noop_logger()).await
    }

    /// 建立到目标地址的连接，并注入日志实现。
    ///
    /// 返回的连接处于 `Created` 状态：调用方先装配 Pipeline，再调用 [`serve`](Self::serve)。
    pub async fn connect_with_logger(
        addr: SocketAddr,
        options: TcpChannelOptions,
        logger: Arc<dyn Logger>,
    ) -> Result<Arc<Self>> {
        options.validate()?;
        let connect = TcpStream::connect(addr);
        let stream = match options.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, connect)
                .await
                .map_err(|_| timeout_error(error::CONNECT))?,
            None => connect.await,
        }
        .map_err(|err| map_io_error(error::CONNECT, err))?;
        Self::from_stream(stream, options, logger)
    }

    /// 以已建立的流构造连接，应用套接字选项。
    pub fn from_stream(
        stream: TcpStream,
        options: TcpChannelOptions,
        logger: Arc<dyn Logger>,
    ) -> Result<Arc<Self>> {
        options.validate()?;
        options
            .apply(&stream)
            .map_err(|err| map_io_error(error::CONFIGURE, err))?;
        let local_addr = stream
            .local_addr()
            .map_err(|err| map_io_error(error::CONFIGURE, err))?;
        let peer_addr = stream
            .peer_addr()
            .map_err(|err| map_io_error(error::CONFIGURE, err))?;
        let estimator = RecvSizeEstimator::new(options.recv_buffer)?;
        let (queue_tx, queue_rx) = mpsc::channel(options.write_queue_capacity);
        let (reader, writer) = stream.into_split();

        let channel = Arc::new_cyclic(|weak: &Weak<TcpChannel>| {
            let back: Weak<dyn Channel> = weak.clone();
            TcpChannel {
                id: ChannelId::next(),
                lifecycle: ChannelLifecycle::new(),
                attributes: Attributes::new(),
                pipeline: Pipeline::new(back, Arc::clone(&logger)),
                local_addr,
                peer_addr,
                options,
                logger,
                outbound: queue_tx,
                io: spin::Mutex::new(Some(IoParts {
                    reader,
                    writer,
                    queue: queue_rx,
                    estimator,
                })),
                stop: watch::Sender::new(false),
                done: watch::Sender::new(false),
                failure: spin::Mutex::new(None),
            }
        });
        Ok(channel)
    }

    pub fn options(&self) -> &TcpChannelOptions {
        &self.options
    }

    /// 启动读写任务并激活连接，直到连接关闭后返回关闭结果。
    ///
    /// 每个连接只能 `serve` 一次，重复调用返回 `transport.closed`。
    pub async fn serve(self: &Arc<Self>) -> Result<()> {
        let Some(parts) = self.io.lock().take() else {
            return Err(CoreError::new(
                codes::TRANSPORT_CLOSED,
                format!("tcp channel {} is already served", self.id),
            ));
        };
        if !self.lifecycle.activate() {
            return Err(CoreError::new(
                codes::TRANSPORT_CLOSED,
                format!("tcp channel {} cannot be activated", self.id),
            ));
        }

        let writer = tokio::spawn(write_loop(
            Arc::clone(self),
            parts.writer,
            parts.queue,
            self.stop.subscribe(),
        ));
        self.logger.debug(&format!("[{self}] serve"));
        self.pipeline.fire_channel_active();
        if *self.stop.borrow() {
            // 激活前收到的关闭请求在此补上失活流程。
            self.close();
        }
        let reader = tokio::spawn(read_loop(
            Arc::clone(self),
            parts.reader,
            parts.estimator,
            self.stop.subscribe(),
        ));

        let mut stop = self.stop.subscribe();
        let _ = stop.wait_for(|stopped| *stopped).await;
        for task in [reader, writer] {
            if let Err(join) = task.await {
                self.record_failure(CoreError::new(
                    error::SERVE.code,
                    format!("{} aborted: {join}", error::SERVE.message),
                ));
            }
        }

        self.lifecycle.mark_closed();
        self.done.send_replace(true);
        match self.failure.lock().take() {
            Some(err) => {
                self.logger.debug(&format!("[{self}] close: {err}"));
                Err(err)
            }
            None => {
                self.logger.debug(&format!("[{self}] close"));
                Ok(())
            }
        }
    }

    /// 等待连接进入 `Closed`。
    pub async fn closed(&self) {
        let mut done = self.done.subscribe();
        let _ = done.wait_for(|done| *done).await;
    }

    fn record_failure(&self, err: CoreError) {
        let mut slot = self.failure.lock();
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    /// 记录传输错误并关闭连接。
    fn fail(&self, err: CoreError) {
        self.logger
            .debug(&format!("[{self}] transport fault: {err}"));
        self.record_failure(err);
        self.close();
    }

    fn enqueue(&self, buf: ByteBuf) -> Result<()> {
        let buf = match self.outbound.try_send(buf) {
            Ok(()) => return Ok(()),
            Err(mpsc::error::TrySendError::Closed(_)) => return Err(self.closed_error()),
            Err(mpsc::error::TrySendError::Full(buf)) => buf,
        };
        let sent = match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| self.outbound.blocking_send(buf))
            }
            Ok(_) => {
                return Err(CoreError::new(
                    codes::TRANSPORT_BACKPRESSURE,
                    format!(
                        "tcp channel {} write queue is full and the runtime cannot block",
                        self.id
                    ),
                ));
            }
            Err(_) => self.outbound.blocking_send(buf),
        };
        sent.map_err(|_| self.closed_error())
    }

    fn closed_error(&self) -> CoreError {
        CoreError::new(
            codes::TRANSPORT_CLOSED,
            format!("tcp channel {} is not active", self.id),
        )
    }
}

impl Channel for TcpChannel {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn state(&self) -> ChannelState {
        self.lifecycle.state()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        Some(self.local_addr)
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        Some(self.peer_addr)
    }

    fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    fn send(&self, msg: PipelineMessage) -> Result<()> {
        if !self.lifecycle.is_active() {
            return Err(self.closed_error());
        }
        let buf = match msg {
            PipelineMessage::Buffer(buf) => buf,
            PipelineMessage::Datagram(packet) => packet.into_parts().0,
            other => {
                return Err(CoreError::new(
                    codes::CODEC_UNSUPPORTED_MESSAGE,
                    format!(
                        "tcp channel {} cannot send a {} message; add an encoder",
                        self.id,
                        other.kind()
                    ),
                ));
            }
        };
        if !buf.is_readable() {
            return Ok(());
        }
        self.enqueue(buf)
    }

    fn close(&self) {
        if self.lifecycle.deactivate() {
            self.pipeline.fire_channel_inactive();
        }
        self.stop.send_replace(true);
    }
}

impl fmt::Display for TcpChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "channel: {}, network: tcp, remote: {}, active: {}",
            self.id,
            self.peer_addr,
            self.lifecycle.is_active()
        )
    }
}

impl fmt::Debug for TcpChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpChannel")
            .field("id", &self.id)
            .field("state", &self.lifecycle.state())
            .field("local_addr", &self.local_addr)
            .field("peer_addr", &self.peer_addr)
            .finish_non_exhaustive()
    }
}

/// 在可选截止时间内执行一次 IO，超时映射为 `spark.transport.tcp.timeout`。
async fn with_deadline<T>(
    kind: OperationKind,
    limit: Option<Duration>,
    io: impl Future<Output = io::Result<T>>,
) -> Result<T> {
    let result = match limit {
        Some(limit) => tokio::time::timeout(limit, io)
            .await
            .map_err(|_| timeout_error(kind))?,
        None => io.await,
    };
    result.map_err(|err| map_io_error(kind, err))
}

async fn read_loop(
    channel: Arc<TcpChannel>,
    mut reader: OwnedReadHalf,
    mut estimator: RecvSizeEstimator,
    mut stop: watch::Receiver<bool>,
) {
    let limit = channel.options.read_timeout;
    while !*stop.borrow_and_update() {
        let mut buf = match estimator.allocate() {
            Ok(buf) => buf,
            Err(err) => return channel.fail(err),
        };
        let read = tokio::select! {
            biased;
            _ = stop.changed() => return,
            read = with_deadline(error::READ, limit, reader.read(buf.writable_slice_mut())) => read,
        };
        match read {
            Ok(0) => return channel.close(),
            Ok(n) => {
                estimator.record(n);
                if let Err(err) = buf.advance_writer(n) {
                    return channel.fail(err);
                }
                channel.pipeline.fire_read(buf);
            }
            Err(err) => return channel.fail(err),
        }
    }
}

async fn write_loop(
    channel: Arc<TcpChannel>,
    mut writer: OwnedWriteHalf,
    mut queue: mpsc::Receiver<ByteBuf>,
    mut stop: watch::Receiver<bool>,
) {
    let limit = channel.options.write_timeout;
    while !*stop.borrow_and_update() {
        let next = tokio::select! {
            biased;
            _ = stop.changed() => continue,
            next = queue.recv() => next,
        };
        let Some(mut buf) = next else { break };
        if let Err(err) = write_fully(&mut writer, &mut buf, limit).await {
            channel.fail(err);
            return;
        }
    }

    queue.close();
    let flush_limit = limit.unwrap_or(CLOSE_FLUSH_TIMEOUT);
    while let Ok(mut buf) = queue.try_recv() {
        if let Err(err) = write_fully(&mut writer, &mut buf, Some(flush_limit)).await {
            channel.logger.debug(&format!(
                "[{channel}] dropped queued writes on close: {err}"
            ));
            break;
        }
    }
    drop(queue);
    if let Err(err) = with_deadline(error::SHUTDOWN, Some(flush_limit), writer.shutdown()).await {
        channel.logger.debug(&format!("[{channel}] {err}"));
    }
}

/// 反复写出直到缓冲排空，每次底层写入重新计时。
async fn write_fully(
    writer: &mut OwnedWriteHalf,
    buf: &mut ByteBuf,
    limit: Option<Duration>,
) -> Result<()> {
    while buf.is_readable() {
        let written = with_deadline(error::WRITE, limit, writer.write(buf.readable_slice())).await?;
        if written == 0 {
            return Err(map_io_error(
                error::WRITE,
                io::Error::from(io::ErrorKind::WriteZero),
            ));
        }
        buf.skip(written)?;
    }
    Ok(())
}
