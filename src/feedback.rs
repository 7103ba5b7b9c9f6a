//! Long-lived feedback connection
//!
//! The receiver pushes state reports over a TCP connection it never closes on
//! its own. The listener reads that stream, hands every chunk to the decoders
//! and reopens the connection whenever it breaks, until it is killed.
//!
//! The protocol has no framing: each `read` is treated as one frame, which
//! matches how the device writes its reports but is not guaranteed by TCP. Two
//! reports coalesced into one read are not recognized and are dropped.

use crate::config::ReceiverConfig;
use crate::decoder::{decode_frame, default_decoders, FrameDecoder};
use crate::error::ReceiverError;
use crate::frames::hex;
use crate::state::Reconciler;
use crate::types::DeviceEndpoint;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Lifecycle of the feedback connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Disconnected,
    Connecting,
    Connected,
    Reading,
    Reconnecting,
    Closing,
    /// Terminal
    Closed,
}

/// Reads and dispatches feedback from the receiver
pub struct FeedbackListener {
    endpoint: DeviceEndpoint,
    reconciler: Arc<Reconciler>,
    decoders: Vec<Box<dyn FrameDecoder>>,
    read_buffer_size: usize,
    reconnect_delay: Duration,
}

impl FeedbackListener {
    pub fn new(endpoint: DeviceEndpoint, reconciler: Arc<Reconciler>, config: &ReceiverConfig) -> Self {
        Self {
            endpoint,
            reconciler,
            decoders: default_decoders(),
            read_buffer_size: config.read_buffer_size.max(1),
            reconnect_delay: config.reconnect_delay,
        }
    }

    /// Replace the decoder chain; decoders run in the given order
    pub fn with_decoders(mut self, decoders: Vec<Box<dyn FrameDecoder>>) -> Self {
        self.decoders = decoders;
        self
    }

    /// Start the read loop on the runtime
    pub fn spawn(self) -> FeedbackHandle {
        let ended = Arc::new(AtomicBool::new(false));
        let (stop_tx, stop_rx) = broadcast::channel(1);
        let (state_tx, state_rx) = watch::channel(ListenerState::Disconnected);

        let task = tokio::spawn(self.run(ended.clone(), stop_rx, state_tx));

        FeedbackHandle {
            ended,
            stop_tx,
            state_rx,
            task: Some(task),
        }
    }

    async fn run(
        self,
        ended: Arc<AtomicBool>,
        mut stop_rx: broadcast::Receiver<()>,
        state_tx: watch::Sender<ListenerState>,
    ) {
        let addr = self.endpoint.socket_addr();
        let mut buf = vec![0u8; self.read_buffer_size];
        let mut stream: Option<TcpStream> = None;
        let mut reconnecting = false;

        loop {
            if ended.load(Ordering::Acquire) {
                break;
            }

            let mut current = match stream.take() {
                Some(current) => current,
                None => {
                    state_tx.send_replace(if reconnecting {
                        ListenerState::Reconnecting
                    } else {
                        ListenerState::Connecting
                    });

                    let connected = tokio::select! {
                        _ = stop_rx.recv() => None,
                        result = TcpStream::connect(addr) => Some(result),
                    };
                    match connected {
                        None => break,
                        Some(Ok(current)) => {
                            if reconnecting {
                                tracing::info!(addr = %self.endpoint, "Feedback connection reopened");
                            } else {
                                tracing::info!(addr = %self.endpoint, "Feedback connection established");
                            }
                            state_tx.send_replace(ListenerState::Connected);
                            current
                        }
                        Some(Err(e)) => {
                            reconnecting = true;
                            if self.recover(e, &ended, &mut stop_rx).await {
                                continue;
                            }
                            break;
                        }
                    }
                }
            };

            state_tx.send_replace(ListenerState::Reading);
            let read = tokio::select! {
                _ = stop_rx.recv() => None,
                result = current.read(&mut buf) => Some(result),
            };

            match read {
                None => {
                    stream = Some(current);
                    break;
                }
                Some(Ok(0)) => {
                    drop(current);
                    reconnecting = true;
                    let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "closed by device");
                    if !self.recover(eof, &ended, &mut stop_rx).await {
                        break;
                    }
                }
                Some(Ok(n)) => {
                    if ended.load(Ordering::Acquire) {
                        stream = Some(current);
                        break;
                    }
                    self.dispatch(&buf[..n]);
                    stream = Some(current);
                }
                Some(Err(e)) => {
                    drop(current);
                    reconnecting = true;
                    if !self.recover(e, &ended, &mut stop_rx).await {
                        break;
                    }
                }
            }
        }

        state_tx.send_replace(ListenerState::Closing);
        if let Some(mut current) = stream {
            if let Err(e) = current.shutdown().await {
                tracing::debug!(addr = %self.endpoint, error = %e, "Shutdown of feedback connection failed");
            }
        }
        state_tx.send_replace(ListenerState::Closed);
        tracing::info!(addr = %self.endpoint, "Feedback connection closed");
    }

    /// Log a connection failure and wait before the next attempt.
    /// Returns `false` if the listener was killed meanwhile.
    async fn recover(
        &self,
        error: io::Error,
        ended: &AtomicBool,
        stop_rx: &mut broadcast::Receiver<()>,
    ) -> bool {
        // A kill shuts the socket down under an in-flight read; that error is
        // expected and must not lead to a reconnect.
        if ended.load(Ordering::Acquire) {
            return false;
        }

        let error = ReceiverError::FeedbackConnection(error);
        tracing::warn!(addr = %self.endpoint, error = %error, "Feedback connection lost, reconnecting");

        let stopped = tokio::select! {
            _ = stop_rx.recv() => true,
            _ = sleep(self.reconnect_delay) => false,
        };
        !stopped && !ended.load(Ordering::Acquire)
    }

    /// Decode one chunk and apply it to the device state
    fn dispatch(&self, chunk: &[u8]) {
        tracing::trace!(addr = %self.endpoint, bytes = chunk.len(), data = %hex(chunk), "Received feedback");

        match decode_frame(&self.decoders, chunk) {
            Some(feedback) => self.reconciler.apply(feedback),
            None => {
                let error = ReceiverError::UnrecognizedFrame(chunk.to_vec());
                tracing::debug!(addr = %self.endpoint, "{}", error);
            }
        }
    }
}

/// Control handle of a running [`FeedbackListener`]
///
/// Dropping the handle stops the listener as well.
pub struct FeedbackHandle {
    ended: Arc<AtomicBool>,
    stop_tx: broadcast::Sender<()>,
    state_rx: watch::Receiver<ListenerState>,
    task: Option<JoinHandle<()>>,
}

impl FeedbackHandle {
    /// Current lifecycle state
    pub fn state(&self) -> ListenerState {
        *self.state_rx.borrow()
    }

    /// Watch lifecycle transitions
    pub fn watch_state(&self) -> watch::Receiver<ListenerState> {
        self.state_rx.clone()
    }

    /// Ask the listener to stop; a pending read is interrupted immediately
    pub fn kill(&self) {
        self.ended.store(true, Ordering::Release);
        let _ = self.stop_tx.send(());
    }

    /// Stop the listener and wait up to `wait` for it to close its socket;
    /// after that the task is aborted
    pub async fn shutdown(&mut self, wait: Duration) {
        self.kill();
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(wait, &mut task).await.is_err() {
                tracing::warn!("Feedback listener did not stop within {:?}, aborting", wait);
                task.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::{SOURCE_FEEDBACK, STATUS_MUTE_ON, VOLUME_PREFIX};
    use crate::types::Source;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::atomic::AtomicUsize;
    use tokio::net::TcpListener;

    fn test_config() -> ReceiverConfig {
        ReceiverConfig::default().with_reconnect_delay(Duration::from_millis(10))
    }

    fn endpoint(port: u16) -> DeviceEndpoint {
        DeviceEndpoint::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    fn volume_frame(level: u8) -> Vec<u8> {
        let mut frame = VOLUME_PREFIX.to_vec();
        frame.push(level);
        frame
    }

    fn source_frame(source: Source) -> Vec<u8> {
        let (_, prefix) = SOURCE_FEEDBACK.iter().find(|(s, _)| *s == source).unwrap();
        let mut frame = prefix.to_vec();
        frame.extend_from_slice(&[STATUS_MUTE_ON, 0x00]);
        frame
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
        while !condition() {
            assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
            sleep(Duration::from_millis(10)).await;
        }
    }

    async fn wait_for_state(handle: &FeedbackHandle, expected: ListenerState) {
        let mut rx = handle.watch_state();
        tokio::time::timeout(Duration::from_secs(3), rx.wait_for(|s| *s == expected))
            .await
            .expect("listener state not reached in time")
            .expect("listener state channel closed");
    }

    #[tokio::test]
    async fn reconnects_after_connection_loss() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accepted = Arc::new(AtomicUsize::new(0));

        let accepted_clone = accepted.clone();
        let server = tokio::spawn(async move {
            // First connection: one report, then the device drops the link
            let (mut first, _) = listener.accept().await.unwrap();
            accepted_clone.fetch_add(1, Ordering::SeqCst);
            first.write_all(&volume_frame(20)).await.unwrap();
            first.flush().await.unwrap();
            sleep(Duration::from_millis(50)).await;
            drop(first);

            // Second connection: report and stay open
            let (mut second, _) = listener.accept().await.unwrap();
            accepted_clone.fetch_add(1, Ordering::SeqCst);
            second.write_all(&source_frame(Source::Usb)).await.unwrap();
            second.flush().await.unwrap();
            let mut buf = [0u8; 16];
            let _ = second.read(&mut buf).await;
        });

        let reconciler = Arc::new(Reconciler::new(16));
        let mut handle =
            FeedbackListener::new(endpoint(port), reconciler.clone(), &test_config()).spawn();

        wait_until(|| reconciler.snapshot().source == Some(Source::Usb)).await;
        let state = reconciler.snapshot();
        assert_eq!(state.volume, 20);
        assert!(state.muted);
        assert_eq!(accepted.load(Ordering::SeqCst), 2);

        handle.shutdown(Duration::from_secs(2)).await;
        assert_eq!(handle.state(), ListenerState::Closed);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn kill_interrupts_pending_read() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            // The listener's shutdown shows up here as end of stream
            let mut buf = [0u8; 16];
            let n = stream.read(&mut buf).await.unwrap();
            assert_eq!(n, 0);

            // No reconnect after a kill
            let second = tokio::time::timeout(Duration::from_millis(200), listener.accept()).await;
            assert!(second.is_err(), "listener reconnected after kill");
        });

        let reconciler = Arc::new(Reconciler::new(16));
        let mut handle = FeedbackListener::new(endpoint(port), reconciler, &test_config()).spawn();
        wait_for_state(&handle, ListenerState::Reading).await;

        let started = tokio::time::Instant::now();
        handle.shutdown(Duration::from_secs(2)).await;
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(handle.state(), ListenerState::Closed);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn keeps_retrying_refused_connections() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let reconciler = Arc::new(Reconciler::new(16));
        let mut handle = FeedbackListener::new(endpoint(port), reconciler, &test_config()).spawn();
        wait_for_state(&handle, ListenerState::Reconnecting).await;

        handle.shutdown(Duration::from_secs(2)).await;
        assert_eq!(handle.state(), ListenerState::Closed);
    }

    #[tokio::test]
    async fn unrecognized_frames_leave_state_alone() {
        let reconciler = Arc::new(Reconciler::new(16));
        reconciler.set_initialized(true);
        let mut rx = reconciler.subscribe();
        let listener = FeedbackListener::new(endpoint(1), reconciler.clone(), &test_config());

        let before = reconciler.snapshot();
        listener.dispatch(&[0x02, 0x09, 0xEE, 0x01, 0x02]);
        listener.dispatch(&[]);
        assert_eq!(reconciler.snapshot(), before);
        assert!(rx.try_recv().unwrap().is_none());

        listener.dispatch(&volume_frame(30));
        assert_eq!(reconciler.snapshot().volume, 30);
    }

    #[tokio::test]
    async fn shutdown_without_grace_period_still_closes_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let reconciler = Arc::new(Reconciler::new(16));
        let mut handle = FeedbackListener::new(endpoint(port), reconciler, &test_config()).spawn();
        let (mut device, _) = listener.accept().await.unwrap();
        wait_for_state(&handle, ListenerState::Reading).await;

        handle.shutdown(Duration::ZERO).await;

        let mut buf = [0u8; 16];
        let read = tokio::time::timeout(Duration::from_secs(1), device.read(&mut buf))
            .await
            .expect("connection still open after shutdown");
        assert!(matches!(read, Ok(0) | Err(_)), "got {:?}", read);

        let second = tokio::time::timeout(Duration::from_millis(200), listener.accept()).await;
        assert!(second.is_err(), "listener reconnected after shutdown");
    }
}
