//! 連線設定檔
//!
//! 以 JSON 描述一條連線：主機、編碼、重連參數，
//! 以及是否套用 Telnet 與心跳。

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::connection::{Connection, StreamConfig, TcpConnection};
use crate::encoding::{self, EncodingError};
use crate::heartbeat::{HeartbeatConfig, HeartbeatConnection};
use crate::reconnect::ReconnectPolicy;
use crate::telnet::TelnetConnection;

/// 設定檔錯誤
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("讀寫設定檔失敗: {0}")]
    Io(#[from] std::io::Error),

    #[error("設定檔格式錯誤: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Encoding(#[from] EncodingError),
}

/// 單一連線的設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionProfile {
    pub host: String,
    pub port: u16,
    /// 編碼名稱，如 `"utf-8"`、`"big5"`
    #[serde(default = "default_encoding")]
    pub encoding: String,
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,
    /// 單次連線嘗試的時間上限（毫秒）
    #[serde(default = "default_retry_timeout_ms")]
    pub connect_retry_timeout_ms: u64,
    /// 兩次連線嘗試的間隔（毫秒）
    #[serde(default = "default_retry_interval_ms")]
    pub connect_retry_interval_ms: u64,
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
    /// 是否以 Telnet 協定處理資料
    #[serde(default)]
    pub telnet: bool,
    #[serde(default)]
    pub heartbeat: Option<HeartbeatProfile>,
}

/// 心跳設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatProfile {
    /// 心跳文字，以連線的編碼送出
    pub payload: String,
    #[serde(default = "default_receive_timeout_ms")]
    pub receive_timeout_ms: u64,
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

fn default_true() -> bool {
    true
}

fn default_retry_timeout_ms() -> u64 {
    4_000
}

fn default_retry_interval_ms() -> u64 {
    1_000
}

fn default_read_buffer_size() -> usize {
    8192
}

fn default_receive_timeout_ms() -> u64 {
    3_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    5_000
}

impl ConnectionProfile {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            encoding: default_encoding(),
            auto_reconnect: true,
            connect_retry_timeout_ms: default_retry_timeout_ms(),
            connect_retry_interval_ms: default_retry_interval_ms(),
            read_buffer_size: default_read_buffer_size(),
            telnet: false,
            heartbeat: None,
        }
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// 從檔案載入
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// 儲存到檔案，必要時建立上層目錄
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn stream_config(&self) -> Result<StreamConfig, ConfigError> {
        Ok(StreamConfig {
            encoding: encoding::lookup(&self.encoding)?,
            auto_reconnect: self.auto_reconnect,
            reconnect: ReconnectPolicy {
                attempt_timeout: Duration::from_millis(self.connect_retry_timeout_ms),
                retry_interval: Duration::from_millis(self.connect_retry_interval_ms),
            },
            read_buffer_size: self.read_buffer_size.max(1),
            ..StreamConfig::default()
        })
    }

    /// 未設定心跳時回傳 `None`
    pub fn heartbeat_config(&self) -> Result<Option<HeartbeatConfig>, ConfigError> {
        let Some(heartbeat) = &self.heartbeat else {
            return Ok(None);
        };
        let encoding = encoding::lookup(&self.encoding)?;
        Ok(Some(
            HeartbeatConfig::with_text(&heartbeat.payload, encoding)
                .with_receive_timeout(Duration::from_millis(heartbeat.receive_timeout_ms))
                .with_heartbeat_timeout(Duration::from_millis(heartbeat.heartbeat_timeout_ms)),
        ))
    }

    /// 依設定組出連線：TCP，必要時外加 Telnet 與心跳
    ///
    /// 尚未連線；必須在 Tokio runtime 中呼叫。
    pub fn open(&self) -> Result<Arc<dyn Connection>, ConfigError> {
        let heartbeat = self.heartbeat_config()?;
        let config = self.stream_config()?;
        let capacity = config.event_capacity;
        let tcp = TcpConnection::tcp(self.host.clone(), self.port, config);

        let mut connection: Arc<dyn Connection> = Arc::new(tcp);
        if self.telnet {
            connection = Arc::new(TelnetConnection::with_capacity(connection, capacity));
        }
        if let Some(heartbeat) = heartbeat {
            connection = Arc::new(HeartbeatConnection::new(connection, heartbeat));
        }

        Ok(connection)
    }
}
