// MIT License - Copyright (c) 2026 Peter Wright
// DS-AIR gateway bridge

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval, timeout};
use tracing::{debug, error, info, trace, warn};

use crate::config::GatewayConfig;
use crate::error::{DsAirError, Result};
use crate::event::GatewayEvent;
use crate::protocol::frame::{Decoded, FrameCodec};
use crate::protocol::param::Param;
use crate::protocol::result::decode_result;
use crate::session::Session;
use crate::transport::command::CommandEngine;

/// Direct TCP transport: one socket, a reader task feeding the session, a
/// dispatch task draining the session's outgoing queue and a heartbeat task.
pub struct DirectTcpTransport {
    command_engine: Arc<CommandEngine>,
    session: Arc<Session>,
    reader_handle: Option<JoinHandle<()>>,
    dispatch_handle: Option<JoinHandle<()>>,
    heartbeat_handle: Option<JoinHandle<()>>,
}

impl DirectTcpTransport {
    /// Connect to the gateway and open a session with a handshake.
    pub async fn connect(config: &GatewayConfig, session: Arc<Session>) -> Result<Self> {
        info!("Connecting to gateway at {}", config.address());

        let stream = match timeout(config.connect_timeout(), TcpStream::connect(config.address())).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                error!("TCP connect failed: {}", e);
                return Err(DsAirError::Io(e));
            }
            Err(_) => return Err(DsAirError::ConnectionTimeout),
        };
        stream.set_nodelay(true)?;
        debug!("TCP socket connected");

        let (reader, writer) = stream.into_split();
        Self::from_parts(reader, writer, config, session)
    }

    /// Run the protocol over an already-established byte stream.
    pub fn from_parts<R, W>(
        reader: R,
        writer: W,
        config: &GatewayConfig,
        session: Arc<Session>,
    ) -> Result<Self>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let command_engine = Arc::new(CommandEngine::new(Box::new(writer), config.command_timeout()));

        let reader_handle = spawn_reader_task(reader, command_engine.clone(), session.clone());
        let dispatch_handle = spawn_dispatch_task(command_engine.clone(), session.clone());
        let heartbeat_handle = spawn_heartbeat_task(command_engine.clone(), config.heartbeat_interval());

        session.send_msg(Param::handshake())?;
        info!("Connection to gateway established");
        let _ = session.event_sender().send(GatewayEvent::Connected);

        Ok(Self {
            command_engine,
            session,
            reader_handle: Some(reader_handle),
            dispatch_handle: Some(dispatch_handle),
            heartbeat_handle: Some(heartbeat_handle),
        })
    }

    /// Send a command and wait for the gateway to acknowledge it.
    pub async fn execute(&self, param: &Param) -> Result<()> {
        let version = self.session.protocol_version().await;
        self.command_engine.execute(param, version).await
    }

    /// Whether the transport is connected.
    pub async fn is_connected(&self) -> bool {
        self.command_engine.is_connected().await
    }

    pub fn engine(&self) -> &Arc<CommandEngine> {
        &self.command_engine
    }

    /// Stop all tasks and close the socket.
    pub async fn disconnect(&mut self) -> Result<()> {
        info!("Disconnecting from gateway");
        let handles: Vec<JoinHandle<()>> = [
            self.reader_handle.take(),
            self.dispatch_handle.take(),
            self.heartbeat_handle.take(),
        ]
        .into_iter()
        .flatten()
        .collect();
        for handle in &handles {
            handle.abort();
        }
        // wait so the outgoing queue is released before the session is reused
        for handle in handles {
            let _ = handle.await;
        }
        self.command_engine.disconnect().await?;
        let _ = self.session.event_sender().send(GatewayEvent::Disconnected);
        Ok(())
    }

    fn abort_tasks(&mut self) {
        for handle in [
            self.reader_handle.take(),
            self.dispatch_handle.take(),
            self.heartbeat_handle.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }
    }
}

impl Drop for DirectTcpTransport {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

/// Spawn the reader task that decodes frames and applies them in order.
fn spawn_reader_task<R>(
    mut reader: R,
    engine: Arc<CommandEngine>,
    session: Arc<Session>,
) -> JoinHandle<()>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; 4096];
        let mut codec = FrameCodec::new();

        loop {
            match reader.read(&mut buf).await {
                Ok(0) => {
                    debug!("Reader: connection closed");
                    break;
                }
                Ok(n) => {
                    codec.push(&buf[..n]);
                    if let Err(e) = drain_codec(&mut codec, &engine, &session).await {
                        error!("Reader: dropping connection: {}", e);
                        break;
                    }
                }
                Err(e) => {
                    error!("Reader: read error: {}", e);
                    break;
                }
            }
        }

        engine.set_connected(false).await;
        engine.fail_pending().await;
        let _ = session.event_sender().send(GatewayEvent::Disconnected);
    })
}

/// Decode and apply every complete frame in the codec buffer. Only a
/// malformed stream is returned as an error.
async fn drain_codec(
    codec: &mut FrameCodec,
    engine: &CommandEngine,
    session: &Session,
) -> Result<()> {
    while let Some(decoded) = codec.decode()? {
        let frame = match decoded {
            Decoded::Heartbeat => {
                trace!("Heartbeat from gateway");
                continue;
            }
            Decoded::Frame(frame) => frame,
        };

        let version = session.protocol_version().await;
        match decode_result(&frame, version) {
            Ok(result) => {
                engine.resolve(&result).await;
                if let Err(e) = session.apply(result).await {
                    warn!("Failed to apply record (seq {}): {}", frame.sequence, e);
                }
            }
            Err(e) if e.is_record_local() => {
                warn!(
                    "Skipping record device_id={} command={}: {}",
                    frame.device_id, frame.command, e
                );
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Spawn the task that writes queued session commands. Each command gets
/// its own ack waiter so an unanswered one is reported without holding up
/// the queue.
fn spawn_dispatch_task(engine: Arc<CommandEngine>, session: Arc<Session>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut outgoing = session.outgoing().lock().await;
        while let Some(param) = outgoing.recv().await {
            let version = session.protocol_version().await;
            match engine.submit(&param, version).await {
                Ok((seq, rx)) => {
                    spawn_ack_waiter(engine.clone(), session.clone(), param.name(), seq, rx);
                }
                Err(e) => {
                    warn!("Failed to send {}: {}", param.name(), e);
                    let _ = session.event_sender().send(GatewayEvent::CommandFailed {
                        command: param.name(),
                        error: e.to_string(),
                    });
                    if e.is_retryable() {
                        break;
                    }
                }
            }
        }
        debug!("Dispatch task finished");
    })
}

fn spawn_ack_waiter(
    engine: Arc<CommandEngine>,
    session: Arc<Session>,
    command: &'static str,
    seq: u32,
    rx: oneshot::Receiver<()>,
) {
    tokio::spawn(async move {
        match engine.wait_ack(seq, command, rx).await {
            Ok(()) => {}
            Err(e @ DsAirError::CommandTimeout { .. }) => {
                warn!("No ack for {} (seq {})", command, seq);
                let _ = session.event_sender().send(GatewayEvent::CommandFailed {
                    command,
                    error: e.to_string(),
                });
            }
            // connection gone; the disconnect is reported on its own
            Err(e) => trace!("Ack waiter for seq {} ended: {}", seq, e),
        }
    });
}

/// Spawn the keep-alive task.
fn spawn_heartbeat_task(engine: Arc<CommandEngine>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = engine.send_heartbeat().await {
                warn!("Heartbeat failed: {}", e);
                break;
            }
        }
    })
}
