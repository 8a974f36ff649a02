use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};

use spark_core::error::codes;
use spark_core::observability::shared_noop_logger;
use spark_core::{
    Attributes, ByteBuf, Channel, ChannelId, ChannelLifecycle, ChannelState, CoreError,
    DatagramPacket, Logger, Pipeline, PipelineMessage, RecvSizeEstimator, Result,
};
use tokio::net::UdpSocket;
use tokio::sync::watch;

use crate::{UdpChannelOptions, UdpError};

/// 基于 Tokio `UdpSocket` 的数据报通道。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 让无连接传输也能复用 Pipeline：每个入站数据报包装为 [`DatagramPacket`]（携带发送方地址）
///   触发一次 `read` 事件，出站方向由链头调用 [`Channel::send`] 直接写入套接字。
///
/// ## 逻辑 (How)
/// - `bind` 得到可收发任意对端的通道；`connect` 额外关联默认对端，允许发送不带地址的 `Buffer`；
/// - `serve` 在调用方任务内运行接收循环，每个报文先收进 `recv_buffer.maximum` 大小的接收区，
///   再复制到由估算器按最近报文长度预测容量的缓冲中交付；
/// - 发送使用 `try_send_to` / `try_send`，内核发送缓冲已满时返回 `transport.backpressure`，不排队。
///
/// ## 契约 (What)
/// - `Datagram` 的地址优先于默认对端；两者都缺失时返回 `spark.transport.udp.no_destination`；
/// - 接收错误与截止时间到期会关闭通道，`serve` 返回该错误；`close` 后 `serve` 返回 `Ok(())`；
/// - 不超过 `recv_buffer.maximum` 的报文完整交付，与此前报文的大小无关；更大的报文按平台语义被截断。
pub struct UdpChannel {
    id: ChannelId,
    lifecycle: ChannelLifecycle,
    attributes: Attributes,
    pipeline: Pipeline,
    socket: UdpSocket,
    local_addr: SocketAddr,
    peer_addr: Option<SocketAddr>,
    options: UdpChannelOptions,
    logger: Arc<dyn Logger>,
    estimator: spin::Mutex<Option<RecvSizeEstimator>>,
    stop: watch::Sender<bool>,
    done: watch::Sender<bool>,
    failure: spin::Mutex<Option<CoreError>>,
}

impl UdpChannel {
    /// 绑定到本地地址，日志丢弃。
    pub async fn bind(addr: SocketAddr, options: UdpChannelOptions) -> Result<Arc<Self>> {
        Self::bind_with_logger(addr, options, shared_noop_logger()).await
    }

    pub async fn bind_with_logger(
        addr: SocketAddr,
        options: UdpChannelOptions,
        logger: Arc<dyn Logger>,
    ) -> Result<Arc<Self>> {
        options.validate()?;
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| UdpError::Bind { addr, source })?;
        Self::from_socket(socket, None, options, logger)
    }

    /// 绑定本地地址并关联默认对端。
    pub async fn connect(
        local: SocketAddr,
        remote: SocketAddr,
        options: UdpChannelOptions,
    ) -> Result<Arc<Self>> {
        Self::connect_with_logger(local, remote, options, shared_noop_logger()).await
    }

    pub async fn connect_with_logger(
        local: SocketAddr,
        remote: SocketAddr,
        options: UdpChannelOptions,
        logger: Arc<dyn Logger>,
    ) -> Result<Arc<Self>> {
        options.validate()?;
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|source| UdpError::Bind { addr: local, source })?;
        socket
            .connect(remote)
            .await
            .map_err(|source| UdpError::Connect { addr: remote, source })?;
        Self::from_socket(socket, Some(remote), options, logger)
    }

    fn from_socket(
        socket: UdpSocket,
        peer_addr: Option<SocketAddr>,
        options: UdpChannelOptions,
        logger: Arc<dyn Logger>,
    ) -> Result<Arc<Self>> {
        socket
            .set_broadcast(options.broadcast)
            .map_err(UdpError::Configure)?;
        let local_addr = socket.local_addr().map_err(UdpError::Configure)?;
        let estimator = RecvSizeEstimator::new(options.recv_buffer)?;

        Ok(Arc::new_cyclic(|weak: &Weak<UdpChannel>| {
            let back: Weak<dyn Channel> = weak.clone();
            UdpChannel {
                id: ChannelId::next(),
                lifecycle: ChannelLifecycle::new(),
                attributes: Attributes::new(),
                pipeline: Pipeline::new(back, Arc::clone(&logger)),
                socket,
                local_addr,
                peer_addr,
                options,
                logger,
                estimator: spin::Mutex::new(Some(estimator)),
                stop: watch::Sender::new(false),
                done: watch::Sender::new(false),
                failure: spin::Mutex::new(None),
            }
        }))
    }

    pub fn options(&self) -> &UdpChannelOptions {
        &self.options
    }

    /// 激活通道并运行接收循环，直到通道关闭。
    ///
    /// 每个通道只能 `serve` 一次，重复调用返回 `transport.closed`。
    pub async fn serve(self: &Arc<Self>) -> Result<()> {
        let Some(mut estimator) = self.estimator.lock().take() else {
            return Err(CoreError::new(
                codes::TRANSPORT_CLOSED,
                format!("udp channel {} is already served", self.id),
            ));
        };
        if !self.lifecycle.activate() {
            return Err(self.closed_error());
        }
        self.logger.debug(&format!("[{self}] serve"));
        self.pipeline.fire_channel_active();
        if *self.stop.borrow() {
            // 激活前收到的关闭请求在此补上失活流程。
            self.close();
        }

        // 内核按接收缓冲截断数据报，因此接收区固定为配置上限；估算器只决定交付副本的初始容量。
        let mut scratch = vec![0u8; self.options.recv_buffer.maximum];
        let mut stop = self.stop.subscribe();
        while !*stop.borrow_and_update() {
            let received = tokio::select! {
                biased;
                _ = stop.changed() => continue,
                received = self.receive(&mut scratch) => received,
            };
            let (len, sender) = match received {
                Ok(received) => received,
                Err(err) => {
                    self.fail(err.into());
                    break;
                }
            };
            match Self::copy_datagram(&mut estimator, &scratch[..len]) {
                Ok(content) => self
                    .pipeline
                    .fire_read(DatagramPacket::new(content, Some(sender))),
                Err(err) => {
                    self.fail(err);
                    break;
                }
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

    /// 等待通道进入 `Closed`。
    pub async fn closed(&self) {
        let mut done = self.done.subscribe();
        let _ = done.wait_for(|done| *done).await;
    }

    async fn receive(
        &self,
        scratch: &mut [u8],
    ) -> std::result::Result<(usize, SocketAddr), UdpError> {
        let recv = self.socket.recv_from(scratch);
        let received = match self.options.read_timeout {
            Some(limit) => tokio::time::timeout(limit, recv)
                .await
                .map_err(|_| UdpError::ReadTimeout(limit))?,
            None => recv.await,
        };
        received.map_err(UdpError::Receive)
    }

    /// 把一个数据报复制进按预测尺寸分配的缓冲，再用实际长度更新预测。
    fn copy_datagram(estimator: &mut RecvSizeEstimator, payload: &[u8]) -> Result<ByteBuf> {
        let mut content = estimator.allocate()?;
        content.write_bytes(payload)?;
        estimator.record(payload.len());
        Ok(content)
    }

    fn fail(&self, err: CoreError) {
        self.logger.debug(&format!("[{self}] transport fault: {err}"));
        {
            let mut slot = self.failure.lock();
            if slot.is_none() {
                *slot = Some(err);
            }
        }
        self.close();
    }

    fn transmit(&self, buf: &ByteBuf, target: Option<SocketAddr>) -> Result<()> {
        let payload = buf.readable_slice();
        let sent = match (target, self.peer_addr) {
            (Some(target), Some(peer)) if target == peer => self.socket.try_send(payload),
            (Some(target), _) => self.socket.try_send_to(payload, target),
            (None, Some(_)) => self.socket.try_send(payload),
            (None, None) => return Err(UdpError::NoDestination.into()),
        };
        let written = match sent {
            Ok(written) => written,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                return Err(CoreError::new(
                    codes::TRANSPORT_BACKPRESSURE,
                    format!("udp channel {} socket send buffer is full", self.id),
                )
                .with_cause(err));
            }
            Err(err) => return Err(UdpError::Send(err).into()),
        };
        if written != payload.len() {
            return Err(UdpError::ShortSend {
                written,
                expected: payload.len(),
            }
            .into());
        }
        Ok(())
    }

    fn closed_error(&self) -> CoreError {
        CoreError::new(
            codes::TRANSPORT_CLOSED,
            format!("udp channel {} is not active", self.id),
        )
    }
}

impl Channel for UdpChannel {
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
        self.peer_addr
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
        match msg {
            PipelineMessage::Datagram(packet) => {
                let (content, target) = packet.into_parts();
                self.transmit(&content, target)
            }
            PipelineMessage::Buffer(buf) => self.transmit(&buf, None),
            other => Err(CoreError::new(
                codes::CODEC_UNSUPPORTED_MESSAGE,
                format!(
                    "udp channel {} cannot send a {} message; add an encoder",
                    self.id,
                    other.kind()
                ),
            )),
        }
    }

    fn close(&self) {
        if self.lifecycle.deactivate() {
            self.logger.info(&format!("[{self}] stop listening"));
            self.pipeline.fire_channel_inactive();
        }
        self.stop.send_replace(true);
    }
}

impl fmt::Display for UdpChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "channel: {}, network: udp, local: {}, ",
            self.id, self.local_addr
        )?;
        match self.peer_addr {
            Some(peer) => write!(f, "remote: {peer}, ")?,
            None => f.write_str("remote: -, ")?,
        }
        write!(f, "active: {}", self.lifecycle.is_active())
    }
}

impl fmt::Debug for UdpChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UdpChannel")
            .field("id", &self.id)
            .field("state", &self.lifecycle.state())
            .field("local_addr", &self.local_addr)
            .field("peer_addr", &self.peer_addr)
            .finish_non_exhaustive()
    }
}
