//! 心跳模組
//!
//! 偵測「連線還在但對方已無回應」的情況：
//! 一段時間沒收到資料就送出心跳，心跳後仍無資料則發出逾時事件。

mod connection;
mod liveness;
mod monitor;

pub use connection::HeartbeatConnection;
pub use liveness::{LivenessAction, LivenessPhase, LivenessTimers};
pub use monitor::{HeartbeatConfig, HeartbeatEvent, HeartbeatMonitor};
