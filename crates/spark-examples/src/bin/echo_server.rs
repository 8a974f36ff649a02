//! 行回显服务端：`echo_server [ADDR]`，Ctrl-C 优雅退出。

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use spark_core::TracingLogger;
use spark_examples::{DEFAULT_ADDR, echo_initializer, init_tracing};
use spark_transport_tcp::{TcpChannelOptions, TcpServer};

/// 空闲连接的回收时限。
const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let addr: SocketAddr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_ADDR.to_owned())
        .parse()
        .context("invalid listen address")?;

    let options = TcpChannelOptions::default().with_read_timeout(Some(IDLE_TIMEOUT));
    let server = Arc::new(
        TcpServer::bind(addr, options)
            .await?
            .with_logger(Arc::new(TracingLogger)),
    );
    tracing::info!(addr = %server.local_addr(), "echo server ready");

    let serving = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.serve(echo_initializer).await })
    };
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    tracing::info!(connections = server.connection_count(), "shutting down");
    server.shutdown();
    serving.await.context("server task panicked")??;
    Ok(())
}
