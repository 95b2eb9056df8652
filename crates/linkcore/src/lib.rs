//! Link Core Library
//!
//! 與傳輸方式無關的連線抽象，以及疊在上面的協定行為：
//! - `connection`: 連線介面、事件與 TCP/串流實作
//! - `reconnect`: 有時限的重試連線
//! - `heartbeat`: 心跳與存活偵測
//! - `telnet`: Telnet 協定解析、跳脫與選項協商
//! - `framing`: 依分隔字串或正則表達式切分訊息
//! - `encoding`: 位元組與文字的編解碼
//! - `config`: JSON 連線設定檔

pub mod config;
pub mod connection;
pub mod encoding;
pub mod framing;
pub mod heartbeat;
pub mod reconnect;
pub mod telnet;

#[cfg(test)]
mod testing;

pub use config::{ConfigError, ConnectionProfile, HeartbeatProfile};
pub use connection::{
    Connection, ConnectionError, ConnectionEvent, DisconnectReason, StreamConfig,
    StreamConnection, TcpConnection,
};
pub use framing::{
    DelimiterFramer, FrameStream, FramingError, FramingExt, PatternFrame, PatternFramer,
};
pub use heartbeat::{HeartbeatConfig, HeartbeatConnection, HeartbeatEvent, HeartbeatMonitor};
pub use reconnect::{supervise, ReconnectPolicy};
pub use telnet::TelnetConnection;
