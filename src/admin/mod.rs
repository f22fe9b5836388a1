//! Admin control channel.
//!
//! # Data Flow
//! ```text
//! Admin connection accepted (admin reactor)
//!     → greeting
//!     → lines framed by net::framing
//!     → handlers.rs (AdminSession state machine)
//!         → command.rs (parse)
//!         → auth.rs (password check)
//!         → registry / flags / statistics / stop flag
//!     → reply written back
//! ```
//!
//! # Design Decisions
//! - Replies are produced synchronously; only socket I/O is async
//! - Every failure looks the same to the peer: `-ERR Unknown command`

pub mod auth;
pub mod command;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::Instrument;

use crate::context::ProxyContext;
use crate::net::framing::LineBuffer;

pub use command::AdminCommand;
pub use handlers::{AdminReply, AdminSession, AdminState};

/// Serve one admin connection until QUIT, disconnect or shutdown.
pub async fn serve(stream: TcpStream, peer: SocketAddr, ctx: Arc<ProxyContext>) {
    let guard = ctx.admins.track();
    let span = tracing::info_span!("admin", session_id = %guard.id(), peer = %peer);

    async move {
        tracing::info!("Admin connected");
        match run(stream, &ctx).await {
            Ok(()) => tracing::info!("Admin disconnected"),
            Err(e) => tracing::warn!(error = %e, "Admin connection failed"),
        }
        drop(guard);
    }
    .instrument(span)
    .await
}

async fn run(mut stream: TcpStream, ctx: &ProxyContext) -> std::io::Result<()> {
    let mut shutdown = ctx.shutdown.subscribe();
    let mut session = AdminSession::new();
    let mut inbound = LineBuffer::new(ctx.buffer_capacity);
    let mut buf = vec![0u8; 4096];

    stream.write_all(handlers::GREETING.as_bytes()).await?;

    loop {
        let n = tokio::select! {
            _ = shutdown.wait() => return Ok(()),
            read = stream.read(&mut buf) => read?,
        };
        if n == 0 {
            return Ok(());
        }

        let lines = inbound
            .push(&buf[..n])
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        for line in lines {
            let reply = session.handle(&line, ctx);
            stream.write_all(reply.text.as_bytes()).await?;
            if reply.close {
                stream.shutdown().await?;
                return Ok(());
            }
        }
    }
}
