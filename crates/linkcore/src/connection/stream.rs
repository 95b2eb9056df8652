//! 位元組串流連線
//!
//! 把任何 `AsyncRead + AsyncWrite` 串流包裝成 [`Connection`]：
//! 連線成功後啟動讀取迴圈，將收到的資料以事件發出。

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Connection, ConnectionError, ConnectionEvent, DisconnectReason, EventHub};
use crate::encoding::{Encoding, TextDecoder};
use crate::reconnect::{supervise, Dial, ReconnectPolicy};

/// 建立底層串流（單次嘗試）
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    async fn open(&self) -> Result<Self::Stream, ConnectionError>;
}

/// TCP 連線器
#[derive(Debug, Clone)]
pub struct TcpConnector {
    host: String,
    port: u16,
}

impl TcpConnector {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn open(&self) -> Result<TcpStream, ConnectionError> {
        info!("正在連線到 {}:{}", self.host, self.port);

        let addr = format!("{}:{}", self.host, self.port);
        let socket_addrs: Vec<SocketAddr> = tokio::net::lookup_host(&addr)
            .await
            .map_err(|e| ConnectionError::DnsResolutionFailed(e.to_string()))?
            .collect();

        let Some(first) = socket_addrs.first() else {
            return Err(ConnectionError::DnsResolutionFailed(format!(
                "無法解析主機: {}",
                self.host
            )));
        };

        debug!("已解析到位址: {:?}", socket_addrs);

        let stream = TcpStream::connect(first).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

/// 串流連線設定
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// 文字事件與 `send_text` 使用的編碼
    pub encoding: &'static Encoding,
    /// 遠端斷線後自動重連
    pub auto_reconnect: bool,
    pub reconnect: ReconnectPolicy,
    /// 讀取緩衝區大小
    pub read_buffer_size: usize,
    /// 事件佇列容量
    pub event_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            encoding: encoding_rs::UTF_8,
            auto_reconnect: true,
            reconnect: ReconnectPolicy::default(),
            read_buffer_size: 8192,
            event_capacity: EventHub::DEFAULT_CAPACITY,
        }
    }
}

/// 一次成功連線的寫入端與讀取迴圈控制
struct Link<S> {
    writer: Arc<AsyncMutex<WriteHalf<S>>>,
    reader_cancel: CancellationToken,
    generation: u64,
}

struct LinkState<S> {
    link: Option<Link<S>>,
    /// 本地要求斷線，直到下一次 `connect()` 前不自動重連
    hold: bool,
}

struct Shared<C: Connector> {
    connector: C,
    config: StreamConfig,
    hub: EventHub,
    state: Mutex<LinkState<C::Stream>>,
    generation: AtomicU64,
    shutdown: CancellationToken,
    /// 進行中的自動重連，本地斷線時取消
    retry: Mutex<Option<CancellationToken>>,
}

impl<C: Connector> Shared<C> {
    fn lock_state(&self) -> MutexGuard<'_, LinkState<C::Stream>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_writer(&self) -> Option<Arc<AsyncMutex<WriteHalf<C::Stream>>>> {
        self.lock_state()
            .link
            .as_ref()
            .map(|link| Arc::clone(&link.writer))
    }

    fn set_hold(&self, hold: bool) {
        self.lock_state().hold = hold;
    }

    /// 本地斷線：先擋下自動重連，再拆除連線
    fn request_disconnect(&self) {
        self.set_hold(true);
        self.stop_retry();
        self.drop_link(None, DisconnectReason::Requested);
    }

    fn stop_retry(&self) {
        let retry = self.retry.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(retry) = retry {
            debug!("取消自動重新連線");
            retry.cancel();
        }
    }

    /// 拆除連線；`generation` 指定時只拆除該次連線
    ///
    /// 真的拆除了才發出斷線事件，確保同一次連線只通知一次。
    fn drop_link(&self, generation: Option<u64>, reason: DisconnectReason) -> bool {
        let link = {
            let mut state = self.lock_state();
            let stale = matches!(
                (state.link.as_ref(), generation),
                (Some(link), Some(wanted)) if link.generation != wanted
            );
            if stale {
                None
            } else {
                state.link.take()
            }
        };

        match link {
            Some(link) => {
                link.reader_cancel.cancel();
                info!("已斷開連線 ({:?})", reason);
                self.hub.emit(ConnectionEvent::Disconnected(reason));
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl<C: Connector> Dial for Arc<Shared<C>> {
    async fn dial(&self) -> Result<(), ConnectionError> {
        if self.is_established() {
            return Ok(());
        }

        let stream = self.connector.open().await?;
        let (reader, writer) = tokio::io::split(stream);
        let reader_cancel = self.shutdown.child_token();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst);

        {
            let mut state = self.lock_state();
            if state.hold {
                debug!("已要求斷線，捨棄本次串流");
                return Ok(());
            }
            if state.link.is_some() {
                debug!("已有其他嘗試先完成連線，捨棄本次串流");
                return Ok(());
            }
            state.link = Some(Link {
                writer: Arc::new(AsyncMutex::new(writer)),
                reader_cancel: reader_cancel.clone(),
                generation,
            });
        }

        info!("連線已建立");
        self.hub.emit(ConnectionEvent::Connected);
        spawn_reader(Arc::clone(self), reader, reader_cancel, generation);
        Ok(())
    }

    fn is_established(&self) -> bool {
        self.lock_state().link.is_some()
    }
}

fn spawn_reader<C: Connector>(
    shared: Arc<Shared<C>>,
    reader: ReadHalf<C::Stream>,
    cancel: CancellationToken,
    generation: u64,
) {
    tokio::spawn(read_loop(shared, reader, cancel, generation));
}

async fn read_loop<C: Connector>(
    shared: Arc<Shared<C>>,
    mut reader: ReadHalf<C::Stream>,
    cancel: CancellationToken,
    generation: u64,
) {
    let mut buffer = vec![0u8; shared.config.read_buffer_size.max(1)];
    let mut decoder = TextDecoder::new(shared.config.encoding);

    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => return,
            result = reader.read(&mut buffer) => result,
        };

        match result {
            Ok(0) => {
                info!("遠端已關閉連線");
                break;
            }
            Ok(n) => {
                let data = Bytes::copy_from_slice(&buffer[..n]);
                let text = decoder.decode_chunk(&data);
                shared.hub.emit(ConnectionEvent::BytesReceived(data));
                if !text.is_empty() {
                    shared.hub.emit(ConnectionEvent::TextReceived(text));
                }
            }
            Err(e) => {
                warn!("讀取錯誤: {}", e);
                break;
            }
        }
    }

    // 重連必須在斷線事件發出前登記
    let retry = shared.shutdown.child_token();
    if shared.config.auto_reconnect {
        *shared.retry.lock().unwrap_or_else(PoisonError::into_inner) = Some(retry.clone());
    }

    if !shared.drop_link(Some(generation), DisconnectReason::Lost) {
        return;
    }

    let hold = shared.lock_state().hold;
    if shared.config.auto_reconnect && !hold && !retry.is_cancelled() {
        info!("開始自動重新連線");
        if let Err(e) = supervise(&shared, &shared.config.reconnect, &retry).await {
            debug!("自動重新連線結束: {}", e);
        }
        retry.cancel();
    }
}

/// 以 [`Connector`] 建立串流的連線
///
/// 必須在 Tokio runtime 中使用；被 drop 時會停止所有背景迴圈。
pub struct StreamConnection<C: Connector> {
    shared: Arc<Shared<C>>,
}

/// TCP 連線
pub type TcpConnection = StreamConnection<TcpConnector>;

impl TcpConnection {
    pub fn tcp(host: impl Into<String>, port: u16, config: StreamConfig) -> Self {
        Self::new(TcpConnector::new(host, port), config)
    }
}

impl<C: Connector> StreamConnection<C> {
    pub fn new(connector: C, config: StreamConfig) -> Self {
        let hub = EventHub::new(config.event_capacity);
        Self {
            shared: Arc::new(Shared {
                connector,
                config,
                hub,
                state: Mutex::new(LinkState {
                    link: None,
                    hold: false,
                }),
                generation: AtomicU64::new(0),
                shutdown: CancellationToken::new(),
                retry: Mutex::new(None),
            }),
        }
    }

    pub fn connector(&self) -> &C {
        &self.shared.connector
    }

    pub fn config(&self) -> &StreamConfig {
        &self.shared.config
    }

    /// 永久關閉：中止重連迴圈並斷線，之後 `connect()` 一律回傳取消
    pub fn shutdown(&self) {
        self.shared.shutdown.cancel();
        self.shared.drop_link(None, DisconnectReason::Requested);
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }
}

impl<C: Connector> Drop for StreamConnection<C> {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}

#[async_trait]
impl<C: Connector> Dial for StreamConnection<C> {
    async fn dial(&self) -> Result<(), ConnectionError> {
        self.shared.dial().await
    }

    fn is_established(&self) -> bool {
        self.shared.is_established()
    }
}

#[async_trait]
impl<C: Connector> Connection for StreamConnection<C> {
    async fn connect(&self) -> Result<(), ConnectionError> {
        self.shared.set_hold(false);
        supervise(&self.shared, &self.shared.config.reconnect, &self.shared.shutdown)
            .await
            .map(|_| ())
    }

    fn disconnect(&self) {
        self.shared.request_disconnect();
    }

    async fn send_bytes(&self, data: &[u8]) -> usize {
        if data.is_empty() {
            return 0;
        }

        let Some(writer) = self.shared.current_writer() else {
            return 0;
        };

        let mut writer = writer.lock().await;
        let result = async {
            writer.write_all(data).await?;
            writer.flush().await
        }
        .await;

        match result {
            Ok(()) => data.len(),
            Err(e) => {
                warn!("發送失敗: {}", e);
                0
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.shared.is_established()
    }

    fn encoding(&self) -> &'static Encoding {
        self.shared.config.encoding
    }

    fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.hub.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::io::{duplex, DuplexStream};
    use tokio::time::{sleep, timeout};

    #[test]
    fn test_config_default() {
        let config = StreamConfig::default();
        assert_eq!(config.encoding, encoding_rs::UTF_8);
        assert!(config.auto_reconnect);
        assert_eq!(config.read_buffer_size, 8192);
        assert_eq!(config.reconnect.attempt_timeout, Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_send_without_connection() {
        let connection = TcpConnection::tcp("127.0.0.1", 1, StreamConfig::default());
        assert!(!connection.is_connected());
        assert_eq!(connection.send_bytes(b"test").await, 0);
        assert_eq!(connection.send_text("test").await, 0);
    }

    #[tokio::test]
    async fn test_disconnect_without_connection_is_silent() {
        let connection = TcpConnection::tcp("127.0.0.1", 1, StreamConfig::default());
        let mut events = connection.subscribe();
        connection.disconnect();
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_connect_after_shutdown_is_cancelled() {
        let connection = TcpConnection::tcp("127.0.0.1", 1, StreamConfig::default());
        connection.shutdown();
        assert!(connection.is_shut_down());
        assert!(matches!(
            connection.connect().await,
            Err(ConnectionError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_dns_failure() {
        let connector = TcpConnector::new("host.invalid", 23);
        let result = connector.open().await;
        assert!(matches!(result, Err(ConnectionError::DnsResolutionFailed(_))));
    }

    /// 依序交出預先建立的記憶體串流
    struct DuplexConnector {
        pending: Mutex<Vec<DuplexStream>>,
    }

    impl DuplexConnector {
        fn remaining(&self) -> usize {
            self.pending.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Connector for DuplexConnector {
        type Stream = DuplexStream;

        async fn open(&self) -> Result<DuplexStream, ConnectionError> {
            self.pending.lock().unwrap().pop().ok_or_else(|| {
                ConnectionError::Io(std::io::Error::from(std::io::ErrorKind::ConnectionRefused))
            })
        }
    }

    async fn recv(rx: &mut broadcast::Receiver<ConnectionEvent>) -> ConnectionEvent {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("等待事件逾時")
            .expect("事件接收失敗")
    }

    #[tokio::test]
    async fn test_peer_close_racing_local_disconnect_does_not_reconnect() {
        let (client, server) = duplex(64);
        let (spare, _spare_server) = duplex(64);
        let connection = StreamConnection::new(
            DuplexConnector {
                pending: Mutex::new(vec![spare, client]),
            },
            StreamConfig::default(),
        );
        let mut events = connection.subscribe();

        connection.connect().await.unwrap();
        assert_eq!(recv(&mut events).await, ConnectionEvent::Connected);

        // disconnect() 已擋下重連但尚未拆除連線時，遠端先關閉
        connection.shared.set_hold(true);
        drop(server);
        assert_eq!(
            recv(&mut events).await,
            ConnectionEvent::Disconnected(DisconnectReason::Lost)
        );

        sleep(Duration::from_millis(50)).await;
        assert!(!connection.is_connected());
        assert_eq!(connection.connector().remaining(), 1);

        connection.connect().await.unwrap();
        assert!(connection.is_connected());
        assert_eq!(connection.connector().remaining(), 0);
    }
}
