//! 行回显客户端：`echo_client [ADDR]`，逐行发送标准输入并打印回显。

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use spark_core::{
    ByteBuf, Capabilities, Channel, ChannelHandler, Context, PipelineMessage, Result,
    TracingLogger,
};
use spark_examples::{DEFAULT_ADDR, init_tracing, line_codec};
use spark_transport_tcp::{TcpChannel, TcpChannelOptions};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Notify;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// 打印回显，并在连接激活时放行输入循环。
struct ReplyPrinter {
    ready: Arc<Notify>,
}

impl ChannelHandler for ReplyPrinter {
    fn capabilities(&self) -> Capabilities {
        Capabilities::ACTIVE | Capabilities::READ
    }

    fn on_channel_active(&self, _ctx: &Context<'_>) -> Result<()> {
        self.ready.notify_one();
        Ok(())
    }

    fn on_read(&self, _ctx: &Context<'_>, msg: PipelineMessage) -> Result<()> {
        if let Some(line) = msg.as_buffer() {
            println!("{}", String::from_utf8_lossy(line.readable_slice()));
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let addr: SocketAddr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_ADDR.to_owned())
        .parse()
        .context("invalid server address")?;

    let options = TcpChannelOptions::default().with_connect_timeout(Some(CONNECT_TIMEOUT));
    let channel = TcpChannel::connect_with_logger(addr, options, Arc::new(TracingLogger))
        .await
        .with_context(|| format!("failed to connect to {addr}"))?;
    let ready = Arc::new(Notify::new());
    let pipeline = channel.pipeline();
    for (name, handler) in line_codec()? {
        pipeline.add_last(name, handler)?;
    }
    pipeline.add_last(
        "printer",
        Arc::new(ReplyPrinter {
            ready: Arc::clone(&ready),
        }),
    )?;

    let serving = {
        let channel = Arc::clone(&channel);
        tokio::spawn(async move { channel.serve().await })
    };
    ready.notified().await;
    tracing::info!(%channel, "connected");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = channel.closed() => break,
            line = lines.next_line() => line.context("failed to read stdin")?,
        };
        match line {
            Some(line) if line.is_empty() => continue,
            Some(line) => pipeline.write(ByteBuf::copy_from_slice(line.as_bytes())?),
            None => break,
        }
    }

    channel.close();
    serving.await.context("client task panicked")??;
    Ok(())
}
