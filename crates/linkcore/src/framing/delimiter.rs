//! 以分隔字串切分訊息

use super::{FrameMatcher, FramingError, StreamFramer};

/// 依優先順序檢查分隔字串
///
/// 依清單順序檢查，第一個出現在緩衝區中的分隔字串勝出，
/// 即使另一個分隔字串的位置更靠前。訊息不包含分隔字串本身。
#[derive(Debug, Clone)]
pub struct DelimiterMatcher {
    delimiters: Vec<String>,
}

impl DelimiterMatcher {
    pub fn new<I, S>(delimiters: I) -> Result<Self, FramingError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let delimiters: Vec<String> = delimiters.into_iter().map(Into::into).collect();
        if delimiters.is_empty() {
            return Err(FramingError::NoRules);
        }
        if delimiters.iter().any(String::is_empty) {
            return Err(FramingError::EmptyDelimiter);
        }
        Ok(Self { delimiters })
    }

    pub fn delimiters(&self) -> &[String] {
        &self.delimiters
    }
}

impl FrameMatcher for DelimiterMatcher {
    type Frame = String;

    fn next_frame(&self, buffer: &str) -> Option<(String, usize)> {
        self.delimiters.iter().find_map(|delimiter| {
            buffer
                .find(delimiter.as_str())
                .map(|index| (buffer[..index].to_string(), index + delimiter.len()))
        })
    }
}

pub type DelimiterFramer = StreamFramer<DelimiterMatcher>;

impl StreamFramer<DelimiterMatcher> {
    pub fn with_delimiters<I, S>(delimiters: I) -> Result<Self, FramingError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self::new(DelimiterMatcher::new(delimiters)?))
    }
}
