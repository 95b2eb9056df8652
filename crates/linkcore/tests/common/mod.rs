//! 整合測試共用工具

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use linkcore::connection::{next_event, ConnectionError, ConnectionEvent, Connector};
use tokio::io::{duplex, AsyncReadExt, DuplexStream};
use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// 依序交出預先建立的記憶體串流；沒有串流時拒絕連線
#[derive(Clone, Default)]
pub struct DuplexConnector {
    pending: Arc<Mutex<VecDeque<DuplexStream>>>,
}

impl DuplexConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// 準備一條連線，回傳伺服器端
    pub fn offer(&self) -> DuplexStream {
        let (client, server) = duplex(4096);
        self.pending.lock().unwrap().push_back(client);
        server
    }

    pub fn remaining(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

#[async_trait]
impl Connector for DuplexConnector {
    type Stream = DuplexStream;

    async fn open(&self) -> Result<DuplexStream, ConnectionError> {
        self.pending.lock().unwrap().pop_front().ok_or_else(|| {
            ConnectionError::Io(io::Error::new(io::ErrorKind::ConnectionRefused, "no peer"))
        })
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

pub async fn expect_event(rx: &mut broadcast::Receiver<ConnectionEvent>) -> ConnectionEvent {
    timeout(Duration::from_secs(5), next_event(rx))
        .await
        .expect("等待事件逾時")
        .expect("事件來源已關閉")
}

/// 收集文字事件直到累積長度達到 `len` 個字元
pub async fn collect_text(rx: &mut broadcast::Receiver<ConnectionEvent>, len: usize) -> String {
    let mut text = String::new();
    while text.chars().count() < len {
        if let ConnectionEvent::TextReceived(chunk) = expect_event(rx).await {
            text.push_str(&chunk);
        }
    }
    text
}

/// 從伺服器端讀取恰好 `len` 個位元組
pub async fn read_exact(server: &mut DuplexStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    timeout(Duration::from_secs(5), server.read_exact(&mut buf))
        .await
        .expect("等待資料逾時")
        .expect("讀取失敗");
    buf
}
