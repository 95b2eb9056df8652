//! Telnet 協定常數和解析
//!
//! 實作 RFC 854 的 IAC 跳脫與最小化的選項協商：
//! 只同意 Suppress-Go-Ahead，其餘一律拒絕。

use tracing::trace;

/// Telnet IAC (Interpret As Command) - 0xFF
pub const IAC: u8 = 255;

/// Telnet 命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TelnetCommand {
    /// Sub-negotiation End
    Se = 240,
    /// No Operation
    Nop = 241,
    /// Data Mark
    DataMark = 242,
    /// Break
    Break = 243,
    /// Interrupt Process
    InterruptProcess = 244,
    /// Abort Output
    AbortOutput = 245,
    /// Are You There
    AreYouThere = 246,
    /// Erase Character
    EraseCharacter = 247,
    /// Erase Line
    EraseLine = 248,
    /// Go Ahead
    GoAhead = 249,
    /// Sub-negotiation Begin
    Sb = 250,
    /// Will
    Will = 251,
    /// Won't
    Wont = 252,
    /// Do
    Do = 253,
    /// Don't
    Dont = 254,
}

impl TelnetCommand {
    /// 從位元組解析 Telnet 命令
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            240 => Some(Self::Se),
            241 => Some(Self::Nop),
            242 => Some(Self::DataMark),
            243 => Some(Self::Break),
            244 => Some(Self::InterruptProcess),
            245 => Some(Self::AbortOutput),
            246 => Some(Self::AreYouThere),
            247 => Some(Self::EraseCharacter),
            248 => Some(Self::EraseLine),
            249 => Some(Self::GoAhead),
            250 => Some(Self::Sb),
            251 => Some(Self::Will),
            252 => Some(Self::Wont),
            253 => Some(Self::Do),
            254 => Some(Self::Dont),
            _ => None,
        }
    }

    /// 是否為帶選項碼的協商命令
    pub fn is_negotiation(self) -> bool {
        matches!(self, Self::Will | Self::Wont | Self::Do | Self::Dont)
    }
}

/// Telnet 選項
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelnetOption {
    /// Suppress Go Ahead
    SuppressGoAhead,
    /// 其他選項（不支援）
    Other(u8),
}

impl TelnetOption {
    /// 從位元組解析 Telnet 選項
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            3 => Self::SuppressGoAhead,
            other => Self::Other(other),
        }
    }

    /// 獲取選項的位元組值
    pub fn as_byte(&self) -> u8 {
        match self {
            Self::SuppressGoAhead => 3,
            Self::Other(b) => *b,
        }
    }
}

/// 解析結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedInput {
    /// 去除控制序列後的應用資料
    pub data: Vec<u8>,
    /// 需要回傳給對方的協商回應
    pub reply: Vec<u8>,
}

/// 將資料中的 IAC 加倍，避免對方誤認為命令
pub fn escape_iac(data: &[u8]) -> Vec<u8> {
    let mut escaped = Vec::with_capacity(data.len() * 2);
    for &byte in data {
        escaped.push(byte);
        if byte == IAC {
            escaped.push(IAC);
        }
    }
    escaped
}

/// 還原 [`escape_iac`]：只把 IAC IAC 合併為單一 0xFF，不處理協商
pub fn unescape_iac(data: &[u8]) -> Vec<u8> {
    let mut unescaped = Vec::with_capacity(data.len());
    let mut i = 0;

    while i < data.len() {
        unescaped.push(data[i]);
        if data[i] == IAC && data.get(i + 1) == Some(&IAC) {
            i += 2;
        } else {
            i += 1;
        }
    }

    unescaped
}

/// 依固定策略產生協商回應
///
/// 回應的選項碼一律是 SGA，不論對方詢問的是哪個選項；
/// WONT/DONT 不需要回應。
pub fn negotiate(command: TelnetCommand, option: TelnetOption) -> Option<[u8; 3]> {
    let sga = TelnetOption::SuppressGoAhead;
    let response = match command {
        TelnetCommand::Do if option == sga => TelnetCommand::Will,
        TelnetCommand::Do => TelnetCommand::Wont,
        TelnetCommand::Will if option == sga => TelnetCommand::Do,
        TelnetCommand::Will => TelnetCommand::Dont,
        _ => return None,
    };

    Some([IAC, response as u8, sga.as_byte()])
}

/// 解析 Telnet 資料，分離出應用資料與協商回應
///
/// 每次呼叫獨立解析：結尾不完整的命令序列會直接丟棄，
/// 不會保留到下一次呼叫。
pub fn parse_and_respond(input: &[u8]) -> ParsedInput {
    let mut parsed = ParsedInput {
        data: Vec::with_capacity(input.len()),
        reply: Vec::new(),
    };
    let mut i = 0;

    while i < input.len() {
        if input[i] != IAC {
            parsed.data.push(input[i]);
            i += 1;
            continue;
        }

        let Some(&command) = input.get(i + 1) else {
            trace!("不完整的 IAC 序列，已丟棄");
            break;
        };

        if command == IAC {
            // IAC IAC = 轉義的 0xFF
            parsed.data.push(IAC);
            i += 2;
            continue;
        }

        match TelnetCommand::from_byte(command) {
            Some(cmd) if cmd.is_negotiation() => {
                let Some(&option) = input.get(i + 2) else {
                    trace!("不完整的協商序列，已丟棄");
                    break;
                };
                let option = TelnetOption::from_byte(option);
                if let Some(response) = negotiate(cmd, option) {
                    trace!("協商 {:?} {:?} -> {:?}", cmd, option, response);
                    parsed.reply.extend_from_slice(&response);
                }
                i += 3;
            }
            Some(TelnetCommand::Sb) => match find_subnegotiation_end(input, i + 2) {
                Some(end) => i = end,
                None => {
                    trace!("不完整的 Sub-negotiation，已丟棄");
                    break;
                }
            },
            _ => {
                // 其他雙位元組命令（NOP、GA 等），跳過
                i += 2;
            }
        }
    }

    parsed
}

/// 從 `start` 開始尋找 IAC SE，回傳其後的位置
fn find_subnegotiation_end(input: &[u8], start: usize) -> Option<usize> {
    let mut j = start;
    while j + 1 < input.len() {
        if input[j] == IAC {
            if input[j + 1] == TelnetCommand::Se as u8 {
                return Some(j + 2);
            }
            if input[j + 1] == IAC {
                j += 2;
                continue;
            }
        }
        j += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const WILL: u8 = TelnetCommand::Will as u8;
    const WONT: u8 = TelnetCommand::Wont as u8;
    const DO: u8 = TelnetCommand::Do as u8;
    const DONT: u8 = TelnetCommand::Dont as u8;
    const SGA: u8 = 3;

    #[test]
    fn test_command_values_match_rfc854() {
        assert_eq!(IAC, 255);
        assert_eq!((WILL, WONT, DO, DONT), (251, 252, 253, 254));
        assert_eq!(TelnetOption::SuppressGoAhead.as_byte(), SGA);
    }

    #[test]
    fn test_escape_doubles_iac() {
        assert_eq!(escape_iac(b"abc"), b"abc");
        assert_eq!(escape_iac(&[1, IAC, 2, IAC]), vec![1, IAC, IAC, 2, IAC, IAC]);
        assert_eq!(escape_iac(&[IAC; 3]).len(), 6);
    }

    #[test]
    fn test_unescape_reverses_escape() {
        let samples: [&[u8]; 4] = [
            &[],
            &[IAC],
            &[b'x', IAC, IAC, b'y'],
            &[0, IAC, 1, IAC, IAC, IAC, 2],
        ];
        for sample in samples {
            assert_eq!(unescape_iac(&escape_iac(sample)), sample);
        }
    }

    #[test]
    fn test_parse_plain_text() {
        let parsed = parse_and_respond(b"Hello World");
        assert_eq!(parsed.data, b"Hello World");
        assert!(parsed.reply.is_empty());
    }

    #[test]
    fn test_parse_escaped_iac() {
        let parsed = parse_and_respond(&[b'A', IAC, IAC, b'B']);
        assert_eq!(parsed.data, vec![b'A', IAC, b'B']);
        assert!(parsed.reply.is_empty());
    }

    #[test]
    fn test_do_sga_is_accepted() {
        let parsed = parse_and_respond(&[IAC, DO, SGA]);
        assert!(parsed.data.is_empty());
        assert_eq!(parsed.reply, vec![IAC, WILL, SGA]);
    }

    #[test]
    fn test_will_sga_is_accepted() {
        let parsed = parse_and_respond(&[IAC, WILL, SGA]);
        assert!(parsed.data.is_empty());
        assert_eq!(parsed.reply, vec![IAC, DO, SGA]);
    }

    // 已知行為：拒絕回應一律帶 SGA 的選項碼，而非對方詢問的選項
    #[test]
    fn test_refusal_always_names_sga() {
        let parsed = parse_and_respond(&[IAC, DO, 99]);
        assert!(parsed.data.is_empty());
        assert_eq!(parsed.reply, vec![IAC, WONT, SGA]);

        let parsed = parse_and_respond(&[IAC, WILL, 24]);
        assert_eq!(parsed.reply, vec![IAC, DONT, SGA]);
    }

    #[test]
    fn test_wont_and_dont_get_no_reply() {
        let parsed = parse_and_respond(&[IAC, WONT, SGA, IAC, DONT, 1]);
        assert!(parsed.data.is_empty());
        assert!(parsed.reply.is_empty());
    }

    #[test]
    fn test_parse_mixed_content() {
        let mut input = b"Hello ".to_vec();
        input.extend_from_slice(&[IAC, DO, SGA, IAC, WILL, 1]);
        input.extend_from_slice(b" World");

        let parsed = parse_and_respond(&input);
        assert_eq!(parsed.data, b"Hello  World");
        assert_eq!(parsed.reply, vec![IAC, WILL, SGA, IAC, DONT, SGA]);
    }

    // 已知限制：跨讀取邊界的命令序列不會被保留
    #[test]
    fn test_partial_sequence_is_dropped() {
        assert_eq!(parse_and_respond(&[b'a', IAC]).data, b"a");

        let parsed = parse_and_respond(&[b'a', IAC, DO]);
        assert_eq!(parsed.data, b"a");
        assert!(parsed.reply.is_empty());

        // 下一段的選項碼被當成一般資料
        assert_eq!(parse_and_respond(&[SGA, b'b']).data, vec![SGA, b'b']);
    }

    #[test]
    fn test_two_byte_commands_are_skipped() {
        let input = [b'a', IAC, TelnetCommand::GoAhead as u8, b'b', IAC, TelnetCommand::Nop as u8];
        let parsed = parse_and_respond(&input);
        assert_eq!(parsed.data, b"ab");
        assert!(parsed.reply.is_empty());
    }

    #[test]
    fn test_subnegotiation_is_skipped() {
        let input = [
            b'a',
            IAC,
            TelnetCommand::Sb as u8,
            24,
            1,
            IAC,
            IAC,
            IAC,
            TelnetCommand::Se as u8,
            b'b',
        ];
        assert_eq!(parse_and_respond(&input).data, b"ab");
    }

    #[test]
    fn test_unterminated_subnegotiation_is_dropped() {
        let input = [b'a', IAC, TelnetCommand::Sb as u8, 24, 1, 2];
        assert_eq!(parse_and_respond(&input).data, b"a");
    }

    #[test]
    fn test_telnet_option_roundtrip() {
        for byte in 0..=255u8 {
            assert_eq!(TelnetOption::from_byte(byte).as_byte(), byte);
        }
    }
}
