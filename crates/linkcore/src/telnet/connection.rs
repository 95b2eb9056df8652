//! Telnet 連線
//!
//! 包裝底層連線：收到的資料先經過 IAC 解析與協商，
//! 送出的資料先跳脫 IAC。

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

use super::protocol::{escape_iac, parse_and_respond};
use crate::connection::{
    recv_event, Connection, ConnectionError, ConnectionEvent, EventHub, Received, StreamConfig,
    TcpConnection,
};
use crate::encoding::{Encoding, TextDecoder};

/// Telnet 連線
///
/// 狀態事件原樣轉發；資料事件只包含清理後的應用資料。
/// 每段收到的資料都會發出一次 `BytesReceived`，只含控制序列時內容為空。
/// 必須在 Tokio runtime 中建立。
pub struct TelnetConnection<C: Connection + ?Sized + 'static> {
    inner: Arc<C>,
    hub: EventHub,
    pump: JoinHandle<()>,
}

impl TelnetConnection<TcpConnection> {
    /// 建立 Telnet over TCP 連線，事件佇列容量與 `config` 相同
    pub fn tcp(host: impl Into<String>, port: u16, config: StreamConfig) -> Self {
        let capacity = config.event_capacity;
        Self::with_capacity(Arc::new(TcpConnection::tcp(host, port, config)), capacity)
    }
}

impl<C: Connection + ?Sized + 'static> TelnetConnection<C> {
    pub fn new(inner: Arc<C>) -> Self {
        Self::with_capacity(inner, EventHub::DEFAULT_CAPACITY)
    }

    /// 指定事件佇列容量
    pub fn with_capacity(inner: Arc<C>, capacity: usize) -> Self {
        let hub = EventHub::new(capacity);
        let events = inner.subscribe();
        let pump = tokio::spawn(pump(Arc::clone(&inner), events, hub.clone()));
        Self { inner, hub, pump }
    }

    pub fn inner(&self) -> &Arc<C> {
        &self.inner
    }

    pub fn event_capacity(&self) -> usize {
        self.hub.capacity()
    }
}

impl<C: Connection + ?Sized + 'static> Drop for TelnetConnection<C> {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

async fn pump<C: Connection + ?Sized>(
    inner: Arc<C>,
    mut events: broadcast::Receiver<ConnectionEvent>,
    hub: EventHub,
) {
    let mut decoder = TextDecoder::new(inner.encoding());

    while let Some(received) = recv_event(&mut events).await {
        let event = match received {
            Received::Event(event) => event,
            Received::Lagged(_) => {
                // 遺失的資料可能截斷多位元組字元
                decoder.reset();
                continue;
            }
        };
        match event {
            ConnectionEvent::Connected => {
                decoder.reset();
                hub.emit(ConnectionEvent::Connected);
            }
            ConnectionEvent::Disconnected(reason) => {
                hub.emit(ConnectionEvent::Disconnected(reason));
            }
            ConnectionEvent::BytesReceived(raw) => {
                let parsed = parse_and_respond(&raw);

                if !parsed.reply.is_empty() && inner.send_bytes(&parsed.reply).await == 0 {
                    debug!("協商回應發送失敗");
                }

                let text = decoder.decode_chunk(&parsed.data);
                hub.emit(ConnectionEvent::BytesReceived(Bytes::from(parsed.data)));
                if !text.is_empty() {
                    hub.emit(ConnectionEvent::TextReceived(text));
                }
            }
            // 底層文字含有未處理的控制序列，由上面的位元組重新解碼
            ConnectionEvent::TextReceived(_) => {}
        }
    }
}

#[async_trait]
impl<C: Connection + ?Sized + 'static> Connection for TelnetConnection<C> {
    async fn connect(&self) -> Result<(), ConnectionError> {
        self.inner.connect().await
    }

    fn disconnect(&self) {
        self.inner.disconnect();
    }

    /// 回傳值為呼叫端資料的長度（跳脫前）
    async fn send_bytes(&self, data: &[u8]) -> usize {
        if data.is_empty() {
            return 0;
        }
        match self.inner.send_bytes(&escape_iac(data)).await {
            0 => 0,
            _ => data.len(),
        }
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn encoding(&self) -> &'static Encoding {
        self.inner.encoding()
    }

    fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.hub.subscribe()
    }
}
