//! 心跳監控
//!
//! 監聽連線事件並驅動 [`LivenessTimers`]；
//! 逾時只發出通知，不會自行斷線，由訂閱者決定如何處理。

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::liveness::{LivenessAction, LivenessTimers};
use crate::connection::{recv_event, Connection, ConnectionEvent, Received};
use crate::encoding::{self, Encoding};

/// 心跳設定
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// 心跳內容
    pub payload: Bytes,
    /// 多久沒收到資料就送出心跳
    pub receive_timeout: Duration,
    /// 送出心跳後多久沒收到資料就判定逾時
    pub heartbeat_timeout: Duration,
}

impl HeartbeatConfig {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            receive_timeout: Duration::from_millis(3_000),
            heartbeat_timeout: Duration::from_millis(5_000),
        }
    }

    /// 以指定編碼將文字轉為心跳內容
    pub fn with_text(text: &str, encoding: &'static Encoding) -> Self {
        Self::new(encoding::encode(encoding, text))
    }

    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }
}

/// 心跳事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatEvent {
    /// 已送出心跳
    Sent,
    /// 心跳送出後未在時限內收到任何資料
    TimedOut,
}

/// 心跳監控器
///
/// 建立時即訂閱連線事件，之後的連線/資料事件都會被計入；
/// 被 drop 時停止監控。
pub struct HeartbeatMonitor {
    events: broadcast::Sender<HeartbeatEvent>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl HeartbeatMonitor {
    /// 啟動監控（必須在 Tokio runtime 中呼叫）
    pub fn spawn<C>(connection: Arc<C>, config: HeartbeatConfig) -> Self
    where
        C: Connection + ?Sized + 'static,
    {
        let (events, _) = broadcast::channel(64);
        let cancel = CancellationToken::new();
        let connection_events = connection.subscribe();

        let task = tokio::spawn(run(
            connection,
            connection_events,
            config,
            events.clone(),
            cancel.clone(),
        ));

        Self {
            events,
            cancel,
            task,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HeartbeatEvent> {
        self.events.subscribe()
    }

    /// 停止監控，計時器不再觸發
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for HeartbeatMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run<C: Connection + ?Sized>(
    connection: Arc<C>,
    mut connection_events: broadcast::Receiver<ConnectionEvent>,
    config: HeartbeatConfig,
    events: broadcast::Sender<HeartbeatEvent>,
    cancel: CancellationToken,
) {
    let mut timers = LivenessTimers::new(config.receive_timeout, config.heartbeat_timeout);
    if connection.is_connected() {
        timers.on_activity(Instant::now());
    }

    loop {
        let deadline = timers.next_deadline();

        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            received = recv_event(&mut connection_events) => match received {
                None => break,
                Some(Received::Event(ConnectionEvent::Connected))
                | Some(Received::Event(ConnectionEvent::BytesReceived(_))) => {
                    timers.on_activity(Instant::now());
                }
                Some(Received::Event(ConnectionEvent::Disconnected(_))) => {
                    timers.on_disconnected();
                }
                Some(Received::Event(ConnectionEvent::TextReceived(_))) => {}
                // 遺失的事件可能包含斷線或資料，依目前連線狀態重新開始
                Some(Received::Lagged(_)) => {
                    if connection.is_connected() {
                        timers.on_activity(Instant::now());
                    } else {
                        timers.on_disconnected();
                    }
                }
            },

            _ = sleep_until_deadline(deadline) => match timers.poll(Instant::now()) {
                Some(LivenessAction::SendHeartbeat) => {
                    let sent = connection.send_bytes(&config.payload).await;
                    debug!("已送出心跳 ({} bytes)", sent);
                    timers.on_heartbeat_sent(Instant::now());
                    let _ = events.send(HeartbeatEvent::Sent);
                }
                Some(LivenessAction::TimedOut) => {
                    warn!("心跳逾時");
                    let _ = events.send(HeartbeatEvent::TimedOut);
                }
                None => {}
            },
        }
    }

    debug!("心跳監控已停止");
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
