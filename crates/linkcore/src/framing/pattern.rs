//! 以正則表達式切分訊息

use regex::Regex;

use super::{FrameMatcher, FramingError, StreamFramer};

/// 正則分幀的結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternFrame {
    /// 匹配成功的規則索引
    pub rule: usize,
    /// 匹配之前被略過的文字
    pub skipped: String,
    /// 匹配的文字
    pub matched: String,
    /// 捕獲的群組（不含整體匹配），未參與匹配的群組為 `None`
    pub captures: Vec<Option<String>>,
}

impl PatternFrame {
    /// 從緩衝區開頭到匹配結尾的完整文字
    pub fn text(&self) -> String {
        format!("{}{}", self.skipped, self.matched)
    }
}

/// 依優先順序檢查正則表達式
///
/// 第一個有匹配的規則勝出；長度為 0 的匹配不算數，
/// 否則緩衝區永遠不會縮短。
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    patterns: Vec<Regex>,
}

impl PatternMatcher {
    pub fn new<I, S>(patterns: I) -> Result<Self, FramingError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|pattern| Regex::new(pattern.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_regexes(patterns)
    }

    pub fn from_regexes(patterns: Vec<Regex>) -> Result<Self, FramingError> {
        if patterns.is_empty() {
            return Err(FramingError::NoRules);
        }
        Ok(Self { patterns })
    }

    pub fn patterns(&self) -> &[Regex] {
        &self.patterns
    }
}

impl FrameMatcher for PatternMatcher {
    type Frame = PatternFrame;

    fn next_frame(&self, buffer: &str) -> Option<(PatternFrame, usize)> {
        self.patterns.iter().enumerate().find_map(|(rule, regex)| {
            let captures = regex
                .captures_iter(buffer)
                .find(|caps| caps.get(0).is_some_and(|m| m.start() < m.end()))?;
            let whole = captures.get(0)?;

            let frame = PatternFrame {
                rule,
                skipped: buffer[..whole.start()].to_string(),
                matched: whole.as_str().to_string(),
                captures: captures
                    .iter()
                    .skip(1)
                    .map(|group| group.map(|m| m.as_str().to_string()))
                    .collect(),
            };
            Some((frame, whole.end()))
        })
    }
}

pub type PatternFramer = StreamFramer<PatternMatcher>;

impl StreamFramer<PatternMatcher> {
    pub fn with_patterns<I, S>(patterns: I) -> Result<Self, FramingError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self::new(PatternMatcher::new(patterns)?))
    }
}
