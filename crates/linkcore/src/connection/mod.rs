//! 連線介面模組
//!
//! 所有傳輸層（TCP、Telnet 等）都實作 [`Connection`]，
//! 心跳、重連、分幀等元件只依賴這個介面，不接觸具體傳輸。

mod events;
mod stream;

use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::encoding::{self, Encoding};

pub use events::{next_event, recv_event, EventHub, Received};
pub use stream::{Connector, StreamConfig, StreamConnection, TcpConnection, TcpConnector};

/// 連線錯誤
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("連線失敗: {0}")]
    Io(#[from] io::Error),

    #[error("連線逾時")]
    Timeout,

    #[error("DNS 解析失敗: {0}")]
    DnsResolutionFailed(String),

    #[error("連線已取消")]
    Cancelled,
}

/// 斷線原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// 本地呼叫 `disconnect()`
    Requested,
    /// 遠端關閉或讀取錯誤
    Lost,
}

/// 連線事件
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected(DisconnectReason),
    BytesReceived(Bytes),
    TextReceived(String),
}

/// 傳輸層必須提供的能力
///
/// 傳輸失敗不會以錯誤往外傳：送出失敗回傳 0，
/// 連線中斷則以 [`ConnectionEvent::Disconnected`] 通知。
#[async_trait]
pub trait Connection: Send + Sync {
    /// 連線直到成功為止（可能無限重試）
    ///
    /// 只有在連線被關閉（shutdown）時才會回傳 [`ConnectionError::Cancelled`]。
    async fn connect(&self) -> Result<(), ConnectionError>;

    /// 斷開連線，重複呼叫不會產生第二個斷線事件
    fn disconnect(&self);

    /// 送出位元組，回傳實際送出的長度（未連線或錯誤時為 0）
    async fn send_bytes(&self, data: &[u8]) -> usize;

    /// 以連線的編碼送出文字
    async fn send_text(&self, text: &str) -> usize {
        let data = encoding::encode(self.encoding(), text);
        self.send_bytes(&data).await
    }

    fn is_connected(&self) -> bool;

    /// 位元組與文字互轉使用的編碼
    fn encoding(&self) -> &'static Encoding;

    /// 訂閱連線事件，每個訂閱者都會收到全部事件
    fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent>;
}
