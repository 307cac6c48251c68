// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! TCP front-end: accepts connections, frames requests and responses with a
//! 4-byte big-endian length prefix, and feeds the dispatcher. One task per
//! connection; connections are persistent until the peer closes or sends a
//! bad frame. A companion task ticks the reaper.

use std::{io, net::Ipv4Addr, sync::Arc, time::Instant};

use anyhow::{Context, Result, bail};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    time::{self, Duration, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::{
    controller::RequestController,
    monitoring::{ErrorKind, Monitoring, Stage},
};

/// Hard ceiling on a single request or response payload.
pub const MAX_FRAME_LEN: u32 = 1_048_576 + 1024;

const REAP_INTERVAL: Duration = Duration::from_secs(60);

pub struct Server {
    port: u16,
    controller: Arc<RequestController>,
    monitoring: Arc<Monitoring>,
    cancel: CancellationToken,
}

impl Server {
    pub fn new(
        port: u16,
        controller: Arc<RequestController>,
        monitoring: Arc<Monitoring>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            port,
            controller,
            monitoring,
            cancel,
        }
    }

    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, self.port))
            .await
            .with_context(|| format!("failed to bind port {}", self.port))?;
        self.run_on(listener).await
    }

    /// Serves on a pre-bound listener until the cancellation token fires.
    pub async fn run_on(&self, listener: TcpListener) -> Result<()> {
        let local = listener.local_addr().context("listener has no address")?;
        info!(%local, "listening");

        let reaper = tokio::spawn(reap_loop(
            Arc::clone(&self.controller),
            Arc::clone(&self.monitoring),
            self.cancel.clone(),
        ));

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                accepted = listener.accept() => {
                    let (stream, peer) = accepted.context("accept failed")?;
                    debug!(%peer, "connection accepted");

                    let controller = Arc::clone(&self.controller);
                    let monitoring = Arc::clone(&self.monitoring);
                    let cancel = self.cancel.clone();
                    tokio::spawn(async move {
                        if let Err(e) =
                            handle_connection(stream, controller, monitoring, cancel)
                                .await
                        {
                            warn!(%peer, "connection closed: {e}");
                        }
                    });
                },
            }
        }

        info!("listener stopped");
        let _ = reaper.await;
        Ok(())
    }
}

/// Request/response loop for one connection. Returns `Ok` on a clean close
/// between frames; any framing violation or I/O failure ends the connection
/// with an error.
async fn handle_connection(
    mut stream: TcpStream,
    controller: Arc<RequestController>,
    monitoring: Arc<Monitoring>,
    cancel: CancellationToken,
) -> Result<()> {
    stream.set_nodelay(true)?;
    let mut len_buf = [0u8; 4];

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            read = stream.read_exact(&mut len_buf) => {
                match read {
                    Ok(_) => {},
                    // Peer closed between frames.
                    Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
                    Err(e) => {
                        monitoring.inc_error(ErrorKind::Disconnection);
                        return Err(e.into());
                    },
                }
            },
        }
        monitoring.inc_received_bytes(4);

        let frame_len = u32::from_be_bytes(len_buf);
        if frame_len == 0 || frame_len > MAX_FRAME_LEN {
            monitoring.inc_error(ErrorKind::Disconnection);
            bail!("frame length {frame_len} out of bounds");
        }

        let t_recv = Instant::now();
        let mut payload = vec![0u8; frame_len as usize];
        if let Err(e) = stream.read_exact(&mut payload).await {
            monitoring.inc_error(ErrorKind::Disconnection);
            return Err(e.into());
        }
        monitoring.inc_received_bytes(u64::from(frame_len));
        monitoring.update_duration(Stage::Receiving, elapsed_ms(t_recv));
        trace!(payload = %hex::encode(&payload), "request received");

        let t_proc = Instant::now();
        let response = controller.handle(&payload)?;
        monitoring.update_duration(Stage::Processing, elapsed_ms(t_proc));

        let t_send = Instant::now();
        let prefix = (response.len() as u32).to_be_bytes();
        if let Err(e) = write_frame(&mut stream, &prefix, &response).await {
            monitoring.inc_error(ErrorKind::Disconnection);
            return Err(e.into());
        }
        monitoring.inc_sent_bytes(4 + response.len() as u64);
        monitoring.update_duration(Stage::Sending, elapsed_ms(t_send));
    }
}

async fn write_frame(
    stream: &mut TcpStream,
    prefix: &[u8; 4],
    body: &[u8],
) -> io::Result<()> {
    stream.write_all(prefix).await?;
    stream.write_all(body).await?;
    Ok(())
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Periodic sweep of expired sessions and values. The sweep duration feeds
/// the processing histogram, same as a request would.
async fn reap_loop(
    controller: Arc<RequestController>,
    monitoring: Arc<Monitoring>,
    cancel: CancellationToken,
) {
    let mut ticker = time::interval(REAP_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it so sweeps start one full
    // interval after boot.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let t = Instant::now();
                controller.interval();
                monitoring.update_duration(Stage::Processing, elapsed_ms(t));
                debug!("inactive sweep finished");
            },
        }
    }
}
