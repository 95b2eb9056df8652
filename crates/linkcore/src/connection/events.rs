//! 連線事件廣播

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use super::ConnectionEvent;

/// 每個連線一個的事件登記處
///
/// 以 broadcast channel 實作，多個訂閱者互不干擾。
#[derive(Debug, Clone)]
pub struct EventHub {
    tx: broadcast::Sender<ConnectionEvent>,
    capacity: usize,
}

impl EventHub {
    /// 預設事件佇列容量
    pub const DEFAULT_CAPACITY: usize = 1024;

    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.tx.subscribe()
    }

    /// 發送事件；沒有訂閱者時直接丟棄
    pub fn emit(&self, event: ConnectionEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

/// 一次接收的結果
#[derive(Debug, Clone, PartialEq)]
pub enum Received {
    Event(ConnectionEvent),
    /// 接收端落後，已遺失指定數量的事件
    Lagged(u64),
}

/// 取得下一個事件，落後時回報遺失的數量
///
/// 依賴事件連續性的訂閱者（分幀、心跳）必須處理 [`Received::Lagged`]。
/// 事件來源已關閉時回傳 `None`。
pub async fn recv_event(rx: &mut broadcast::Receiver<ConnectionEvent>) -> Option<Received> {
    match rx.recv().await {
        Ok(event) => Some(Received::Event(event)),
        Err(RecvError::Lagged(skipped)) => {
            warn!("事件接收落後，遺失 {} 個事件", skipped);
            Some(Received::Lagged(skipped))
        }
        Err(RecvError::Closed) => None,
    }
}

/// 取得下一個事件，落後時略過遺失的部分繼續接收
///
/// 事件來源已關閉時回傳 `None`。
pub async fn next_event(
    rx: &mut broadcast::Receiver<ConnectionEvent>,
) -> Option<ConnectionEvent> {
    loop {
        match recv_event(rx).await? {
            Received::Event(event) => return Some(event),
            Received::Lagged(_) => continue,
        }
    }
}
