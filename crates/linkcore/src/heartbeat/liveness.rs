//! 存活偵測狀態機
//!
//! 兩個倒數計時器：接收逾時（等待任何資料）與心跳逾時（送出心跳後等待回應）。
//! 任何時刻最多只有其中一個在倒數。

use std::time::Duration;

use tokio::time::Instant;

/// 計時器到期時要執行的動作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessAction {
    /// 太久沒收到資料，送出心跳
    SendHeartbeat,
    /// 心跳送出後仍無回應
    TimedOut,
}

/// 目前等待的階段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessPhase {
    /// 未連線或已判定逾時，計時器全部停止
    Idle,
    /// 等待任何資料
    AwaitingData,
    /// 心跳正在送出
    SendingHeartbeat,
    /// 已送出心跳，等待回應
    AwaitingReply,
}

#[derive(Debug, Clone)]
pub struct LivenessTimers {
    receive_timeout: Duration,
    heartbeat_timeout: Duration,
    receive_deadline: Option<Instant>,
    heartbeat_deadline: Option<Instant>,
    sending: bool,
}

impl LivenessTimers {
    pub fn new(receive_timeout: Duration, heartbeat_timeout: Duration) -> Self {
        Self {
            receive_timeout,
            heartbeat_timeout,
            receive_deadline: None,
            heartbeat_deadline: None,
            sending: false,
        }
    }

    /// 連線建立或收到資料：重設接收計時器，停止心跳計時器
    pub fn on_activity(&mut self, now: Instant) {
        self.receive_deadline = Some(now + self.receive_timeout);
        self.heartbeat_deadline = None;
        self.sending = false;
    }

    /// 斷線：停止全部計時器
    pub fn on_disconnected(&mut self) {
        self.receive_deadline = None;
        self.heartbeat_deadline = None;
        self.sending = false;
    }

    /// 心跳已送出（不論成功與否），開始等待回應
    ///
    /// 送出期間若已收到資料或斷線，則不再啟動心跳計時器。
    pub fn on_heartbeat_sent(&mut self, now: Instant) {
        if self.sending {
            self.sending = false;
            self.heartbeat_deadline = Some(now + self.heartbeat_timeout);
        }
    }

    /// 下一個到期時間
    pub fn next_deadline(&self) -> Option<Instant> {
        self.heartbeat_deadline.or(self.receive_deadline)
    }

    /// 檢查到期的計時器；到期的計時器會被停止
    pub fn poll(&mut self, now: Instant) -> Option<LivenessAction> {
        if self.heartbeat_deadline.is_some_and(|deadline| now >= deadline) {
            self.heartbeat_deadline = None;
            return Some(LivenessAction::TimedOut);
        }

        if self.receive_deadline.is_some_and(|deadline| now >= deadline) {
            self.receive_deadline = None;
            self.sending = true;
            return Some(LivenessAction::SendHeartbeat);
        }

        None
    }

    pub fn phase(&self) -> LivenessPhase {
        if self.heartbeat_deadline.is_some() {
            LivenessPhase::AwaitingReply
        } else if self.sending {
            LivenessPhase::SendingHeartbeat
        } else if self.receive_deadline.is_some() {
            LivenessPhase::AwaitingData
        } else {
            LivenessPhase::Idle
        }
    }
}
