//! 測試用的假連線

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;

use crate::connection::{
    Connection, ConnectionError, ConnectionEvent, DisconnectReason, EventHub,
};
use crate::encoding::{self, Encoding};

/// 記錄所有送出資料、可手動注入事件的連線
pub(crate) struct FakeConnection {
    hub: EventHub,
    encoding: &'static Encoding,
    connected: AtomicBool,
    connect_calls: AtomicUsize,
    sent: Mutex<Vec<Vec<u8>>>,
}

impl FakeConnection {
    pub(crate) fn new() -> Self {
        Self::with_capacity(EventHub::DEFAULT_CAPACITY)
    }

    /// 指定事件佇列容量，用來製造接收端落後
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            hub: EventHub::new(capacity),
            encoding: encoding_rs::UTF_8,
            connected: AtomicBool::new(false),
            connect_calls: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// 模擬傳輸層完成連線
    pub(crate) fn establish(&self) {
        self.connected.store(true, Ordering::SeqCst);
        self.hub.emit(ConnectionEvent::Connected);
    }

    /// 模擬遠端斷線
    pub(crate) fn lose_link(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.hub.emit(ConnectionEvent::Disconnected(DisconnectReason::Lost));
        }
    }

    /// 讓送出失敗但不發出斷線事件
    pub(crate) fn disconnect_silently(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// 模擬收到資料
    pub(crate) fn receive(&self, data: &[u8]) {
        self.hub.emit(ConnectionEvent::BytesReceived(Bytes::copy_from_slice(data)));
        let text = encoding::decode(self.encoding, data);
        if !text.is_empty() {
            self.hub.emit(ConnectionEvent::TextReceived(text));
        }
    }

    pub(crate) fn receive_text(&self, text: &str) {
        self.hub.emit(ConnectionEvent::TextReceived(text.to_string()));
    }

    pub(crate) fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for FakeConnection {
    async fn connect(&self) -> Result<(), ConnectionError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        self.establish();
        Ok(())
    }

    fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.hub.emit(ConnectionEvent::Disconnected(DisconnectReason::Requested));
        }
    }

    async fn send_bytes(&self, data: &[u8]) -> usize {
        if !self.is_connected() || data.is_empty() {
            return 0;
        }
        self.sent.lock().unwrap().push(data.to_vec());
        data.len()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.hub.subscribe()
    }
}
