//! 重新連線模組
//!
//! 以固定間隔重試單次連線，直到連線成功或被取消為止。
//! 每次嘗試都有時間上限，逾時只代表這次嘗試放棄，迴圈會繼續。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connection::{
    next_event, Connection, ConnectionError, ConnectionEvent, DisconnectReason,
};

/// 重試策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// 單次連線嘗試的時間上限
    pub attempt_timeout: Duration,
    /// 兩次嘗試之間的等待時間
    pub retry_interval: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_millis(4_000),
            retry_interval: Duration::from_millis(1_000),
        }
    }
}

/// 單次連線嘗試
#[async_trait]
pub trait Dial: Send + Sync {
    /// 嘗試連線一次
    async fn dial(&self) -> Result<(), ConnectionError>;

    /// 目前是否已建立連線
    fn is_established(&self) -> bool;
}

/// 重複嘗試連線直到成功，回傳總共嘗試的次數
///
/// 沒有次數上限；需要總時限的呼叫端請自行透過 `cancel` 中止。
pub async fn supervise<D>(
    dialer: &D,
    policy: &ReconnectPolicy,
    cancel: &CancellationToken,
) -> Result<u64, ConnectionError>
where
    D: Dial + ?Sized,
{
    let mut attempts = 0u64;

    loop {
        if cancel.is_cancelled() {
            return Err(ConnectionError::Cancelled);
        }

        attempts += 1;
        debug!("第 {} 次連線嘗試", attempts);

        tokio::select! {
            _ = cancel.cancelled() => return Err(ConnectionError::Cancelled),
            result = timeout(policy.attempt_timeout, dialer.dial()) => match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("第 {} 次連線失敗: {}", attempts, e),
                Err(_) => debug!("第 {} 次連線逾時", attempts),
            },
        }

        if dialer.is_established() {
            info!("連線成功（共嘗試 {} 次）", attempts);
            return Ok(attempts);
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(ConnectionError::Cancelled),
            _ = sleep(policy.retry_interval) => {}
        }
    }
}

/// 在連線中斷時自動呼叫 `connect()`
///
/// 只對 [`DisconnectReason::Lost`] 反應；本地主動斷線不會觸發重連。
/// 重連在獨立的 task 中執行，不會阻塞發出事件的一方。
pub fn spawn_auto_reconnect<C>(connection: Arc<C>, cancel: CancellationToken) -> JoinHandle<()>
where
    C: Connection + ?Sized + 'static,
{
    let mut events = connection.subscribe();

    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = next_event(&mut events) => event,
            };

            match event {
                None => break,
                Some(ConnectionEvent::Disconnected(DisconnectReason::Lost)) => {
                    info!("連線中斷，開始重新連線");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        result = connection.connect() => {
                            if let Err(e) = result {
                                warn!("重新連線中止: {}", e);
                            }
                        }
                    }
                }
                Some(_) => {}
            }
        }
    })
}
