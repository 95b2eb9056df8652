//! 文字編解碼模組
//!
//! 以 `encoding_rs` 處理位元組與文字之間的轉換，
//! 每個連線綁定一種編碼（UTF-8、Big5 等）。

use thiserror::Error;

pub use encoding_rs::Encoding;

/// 編碼錯誤
#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("不支援的編碼名稱: {0}")]
    UnknownLabel(String),
}

/// 依名稱查詢編碼（如 `"utf-8"`、`"big5"`）
///
/// # Example
/// ```
/// use linkcore::encoding::lookup;
///
/// let big5 = lookup("big5").unwrap();
/// assert_eq!(big5.name(), "Big5");
/// ```
pub fn lookup(label: &str) -> Result<&'static Encoding, EncodingError> {
    Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| EncodingError::UnknownLabel(label.to_string()))
}

/// 將位元組一次性解碼為字串（無效字元會被替換為 U+FFFD）
pub fn decode(encoding: &'static Encoding, bytes: &[u8]) -> String {
    let (decoded, _, _) = encoding.decode(bytes);
    decoded.into_owned()
}

/// 將字串編碼為位元組（無法編碼的字元會被替換）
pub fn encode(encoding: &'static Encoding, text: &str) -> Vec<u8> {
    let (encoded, _, _) = encoding.encode(text);
    encoded.into_owned()
}

/// 串流解碼器
///
/// 多位元組字元可能被拆在兩次讀取之間，
/// 未完成的位元組會留在解碼器內等下一段資料補齊。
pub struct TextDecoder {
    encoding: &'static Encoding,
    inner: encoding_rs::Decoder,
}

impl TextDecoder {
    pub fn new(encoding: &'static Encoding) -> Self {
        Self {
            encoding,
            inner: encoding.new_decoder(),
        }
    }

    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    /// 解碼一段資料，回傳目前可確定的文字
    pub fn decode_chunk(&mut self, bytes: &[u8]) -> String {
        let capacity = self
            .inner
            .max_utf8_buffer_length(bytes.len())
            .unwrap_or(bytes.len() * 3 + 4);
        let mut output = String::with_capacity(capacity);
        let (_result, _read, _replaced) = self.inner.decode_to_string(bytes, &mut output, false);
        output
    }

    /// 丟棄暫存的不完整字元（新連線時使用）
    pub fn reset(&mut self) {
        self.inner = self.encoding.new_decoder();
    }
}

impl std::fmt::Debug for TextDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextDecoder")
            .field("encoding", &self.encoding.name())
            .finish()
    }
}
