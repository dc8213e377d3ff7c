// MIT License - Copyright (c) 2026 Peter Wright
// DS-AIR gateway bridge

use std::collections::HashMap;
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, RwLock, oneshot};
use tokio::time::{Duration, timeout};
use tracing::{debug, error, trace};

use crate::constants::ProtocolVersion;
use crate::error::{DsAirError, Result};
use crate::protocol::frame::{encode_frame, encode_heartbeat};
use crate::protocol::param::Param;
use crate::protocol::result::{GatewayResult, ResultBody};

/// Write half of the gateway connection.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Assigns sequence numbers, serializes frame writes and routes acks back to
/// callers waiting in [`CommandEngine::execute`].
pub struct CommandEngine {
    /// Next sequence number
    sequence: Mutex<u32>,
    /// Map of pending sequence numbers to their completion senders
    pending: Arc<Mutex<HashMap<u32, oneshot::Sender<()>>>>,
    writer: Mutex<BoxedWriter>,
    connected: RwLock<bool>,
    command_timeout: Duration,
}

impl CommandEngine {
    pub fn new(writer: BoxedWriter, command_timeout: Duration) -> Self {
        Self {
            sequence: Mutex::new(1),
            pending: Arc::new(Mutex::new(HashMap::new())),
            writer: Mutex::new(writer),
            connected: RwLock::new(true),
            command_timeout,
        }
    }

    pub async fn set_connected(&self, connected: bool) {
        *self.connected.write().await = connected;
    }

    pub async fn is_connected(&self) -> bool {
        *self.connected.read().await
    }

    async fn next_sequence(&self) -> u32 {
        let mut seq = self.sequence.lock().await;
        let id = *seq;
        *seq = seq.wrapping_add(1).max(1);
        id
    }

    async fn write(&self, bytes: &[u8]) -> Result<()> {
        if !self.is_connected().await {
            return Err(DsAirError::Disconnected);
        }
        let mut writer = self.writer.lock().await;
        writer.write_all(bytes).await.map_err(|e| {
            error!("Failed to write frame: {}", e);
            DsAirError::Io(e)
        })?;
        writer.flush().await?;
        Ok(())
    }

    /// Write `param` and register it as awaiting an ack. Returns its
    /// sequence number and the receiver completed by [`resolve`](Self::resolve).
    pub async fn submit(
        &self,
        param: &Param,
        version: ProtocolVersion,
    ) -> Result<(u32, oneshot::Receiver<()>)> {
        let seq = self.next_sequence().await;
        let bytes = encode_frame(&param.to_frame(seq, version)?)?;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(seq, tx);

        if let Err(e) = self.write(&bytes).await {
            self.pending.lock().await.remove(&seq);
            return Err(e);
        }
        debug!("Command sent: {} (seq {})", param.name(), seq);
        Ok((seq, rx))
    }

    /// Wait for the ack of a submitted command. Not retried; a late reply
    /// after the timeout is ignored.
    pub async fn wait_ack(
        &self,
        seq: u32,
        command: &'static str,
        rx: oneshot::Receiver<()>,
    ) -> Result<()> {
        match timeout(self.command_timeout, rx).await {
            Ok(Ok(())) => {
                debug!("Command acknowledged (seq {})", seq);
                Ok(())
            }
            Ok(Err(_)) => Err(DsAirError::ChannelClosed),
            Err(_) => {
                self.pending.lock().await.remove(&seq);
                debug!("Command timeout: {} (seq {})", command, seq);
                Err(DsAirError::CommandTimeout {
                    sequence: seq,
                    command: command.to_string(),
                })
            }
        }
    }

    /// Write `param` and wait for a system ack with the same sequence number
    /// or a command response naming it.
    pub async fn execute(&self, param: &Param, version: ProtocolVersion) -> Result<()> {
        let (seq, rx) = self.submit(param, version).await?;
        self.wait_ack(seq, param.name(), rx).await
    }

    /// Write the keep-alive sentinel.
    pub async fn send_heartbeat(&self) -> Result<()> {
        trace!("Sending heartbeat");
        self.write(&encode_heartbeat()).await
    }

    /// Complete the pending command `result` answers, if any. Returns whether
    /// a waiter was found.
    pub async fn resolve(&self, result: &GatewayResult) -> bool {
        let seq = match result.body {
            ResultBody::Ack { .. } => result.sequence,
            ResultBody::CommandResponse { command_id, .. } => command_id,
            _ => return false,
        };
        match self.pending.lock().await.remove(&seq) {
            Some(tx) => {
                let _ = tx.send(());
                true
            }
            None => {
                trace!("No waiter for seq {}", seq);
                false
            }
        }
    }

    /// Drop every pending waiter; they fail with `ChannelClosed`.
    pub async fn fail_pending(&self) {
        self.pending.lock().await.clear();
    }

    /// Mark disconnected, fail waiters and shut the write half down.
    pub async fn disconnect(&self) -> Result<()> {
        self.set_connected(false).await;
        self.fail_pending().await;
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::{Decoded, decode_frame};
    use tokio::io::AsyncReadExt;

    fn ack(sequence: u32) -> GatewayResult {
        GatewayResult {
            sequence,
            subbody_version: 0,
            target: None,
            body: ResultBody::Ack { version: None },
        }
    }

    #[tokio::test]
    async fn test_submit_assigns_sequence() {
        let (client, mut server) = tokio::io::duplex(1024);
        let engine = CommandEngine::new(Box::new(client), Duration::from_millis(100));

        let (first, _) = engine.submit(&Param::RecommendedIndoorTemp, ProtocolVersion::Old).await.unwrap();
        let (second, rx) = engine.submit(&Param::all_rooms(), ProtocolVersion::Old).await.unwrap();
        assert_eq!(second, first + 1);
        assert!(engine.resolve(&ack(second)).await);
        assert!(rx.await.is_ok());

        let mut buf = vec![0u8; 64];
        let n = server.read(&mut buf).await.unwrap();
        let (decoded, _) = decode_frame(&buf[..n]).unwrap().unwrap();
        assert!(matches!(decoded, Decoded::Frame(f) if f.sequence == first));
    }

    #[tokio::test]
    async fn test_execute_resolved_by_ack() {
        let (client, _server) = tokio::io::duplex(1024);
        let engine = Arc::new(CommandEngine::new(Box::new(client), Duration::from_secs(5)));

        let waiter = {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .execute(&Param::RecommendedIndoorTemp, ProtocolVersion::Old)
                    .await
            })
        };

        // sequence numbers start at 1
        loop {
            if engine.resolve(&ack(1)).await {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(waiter.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_execute_times_out_and_ignores_late_ack() {
        let (client, _server) = tokio::io::duplex(1024);
        let engine = CommandEngine::new(Box::new(client), Duration::from_millis(20));

        let err = engine
            .execute(&Param::RecommendedIndoorTemp, ProtocolVersion::Old)
            .await
            .unwrap_err();
        assert!(matches!(err, DsAirError::CommandTimeout { sequence: 1, .. }));
        assert!(!engine.resolve(&ack(1)).await);
    }

    #[tokio::test]
    async fn test_command_response_resolves_by_id() {
        let (client, _server) = tokio::io::duplex(1024);
        let engine = Arc::new(CommandEngine::new(Box::new(client), Duration::from_secs(5)));
        let waiter = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.execute(&Param::all_rooms(), ProtocolVersion::Old).await })
        };
        let rsp = GatewayResult {
            sequence: 900,
            subbody_version: 0,
            target: None,
            body: ResultBody::CommandResponse { command_id: 1, code: 0 },
        };
        while !engine.resolve(&rsp).await {
            tokio::task::yield_now().await;
        }
        assert!(waiter.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_disconnected_write_fails() {
        let (client, _server) = tokio::io::duplex(64);
        let engine = CommandEngine::new(Box::new(client), Duration::from_millis(20));
        engine.disconnect().await.unwrap();
        let err = engine.send_heartbeat().await.unwrap_err();
        assert!(matches!(err, DsAirError::Disconnected));
    }
}
