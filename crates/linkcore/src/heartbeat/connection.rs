//! 帶心跳的連線
//!
//! 將所有操作與事件原樣轉給內層連線，並附帶一個 [`HeartbeatMonitor`]。

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::monitor::{HeartbeatConfig, HeartbeatEvent, HeartbeatMonitor};
use crate::connection::{Connection, ConnectionError, ConnectionEvent};
use crate::encoding::Encoding;

pub struct HeartbeatConnection<C: Connection + ?Sized + 'static> {
    inner: Arc<C>,
    monitor: HeartbeatMonitor,
}

impl<C: Connection + ?Sized + 'static> HeartbeatConnection<C> {
    /// 必須在 Tokio runtime 中呼叫
    pub fn new(inner: Arc<C>, config: HeartbeatConfig) -> Self {
        let monitor = HeartbeatMonitor::spawn(Arc::clone(&inner), config);
        Self { inner, monitor }
    }

    /// 心跳文字以內層連線的編碼轉換
    pub fn with_text(
        inner: Arc<C>,
        payload: &str,
        receive_timeout: std::time::Duration,
        heartbeat_timeout: std::time::Duration,
    ) -> Self {
        let config = HeartbeatConfig::with_text(payload, inner.encoding())
            .with_receive_timeout(receive_timeout)
            .with_heartbeat_timeout(heartbeat_timeout);
        Self::new(inner, config)
    }

    /// 訂閱心跳事件（逾時時不會自動斷線）
    pub fn heartbeat_events(&self) -> broadcast::Receiver<HeartbeatEvent> {
        self.monitor.subscribe()
    }

    pub fn inner(&self) -> &Arc<C> {
        &self.inner
    }
}

#[async_trait]
impl<C: Connection + ?Sized + 'static> Connection for HeartbeatConnection<C> {
    async fn connect(&self) -> Result<(), ConnectionError> {
        self.inner.connect().await
    }

    fn disconnect(&self) {
        self.inner.disconnect();
    }

    async fn send_bytes(&self, data: &[u8]) -> usize {
        self.inner.send_bytes(data).await
    }

    async fn send_text(&self, text: &str) -> usize {
        self.inner.send_text(text).await
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn encoding(&self) -> &'static Encoding {
        self.inner.encoding()
    }

    fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.subscribe()
    }
}
