//! Telnet 協定模組
//!
//! 協定解析與跳脫（`protocol`），以及把任意連線包裝成 Telnet 連線的裝飾器。

mod connection;
mod protocol;

pub use connection::TelnetConnection;
pub use protocol::{
    escape_iac, negotiate, parse_and_respond, unescape_iac, ParsedInput, TelnetCommand,
    TelnetOption, IAC,
};
