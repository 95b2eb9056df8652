//! 分幀模組
//!
//! 把連線收到的文字累積在緩衝區中，依分隔字串或正則表達式切出完整訊息。
//! 緩衝區沒有大小上限，持續收不到分隔符時會一直成長，需由呼叫端留意。

mod delimiter;
mod listener;
mod pattern;

use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;

pub use delimiter::{DelimiterFramer, DelimiterMatcher};
pub use listener::{FrameStream, FramingExt};
pub use pattern::{PatternFrame, PatternFramer, PatternMatcher};

/// 分幀錯誤
#[derive(Debug, Error)]
pub enum FramingError {
    #[error("至少需要一個分隔字串或規則")]
    NoRules,

    #[error("分隔字串不可為空")]
    EmptyDelimiter,

    #[error("正則表達式錯誤: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// 從緩衝區開頭找出下一個訊息
pub trait FrameMatcher: Send + Sync {
    type Frame;

    /// 回傳訊息與被消耗的位元組數（必須大於 0）
    fn next_frame(&self, buffer: &str) -> Option<(Self::Frame, usize)>;
}

/// 累積文字並切出訊息
///
/// 內部以互斥鎖保護緩衝區，可從多個執行緒呼叫 [`push`](Self::push)。
#[derive(Debug)]
pub struct StreamFramer<M: FrameMatcher> {
    matcher: M,
    buffer: Mutex<String>,
}

impl<M: FrameMatcher> StreamFramer<M> {
    pub fn new(matcher: M) -> Self {
        Self {
            matcher,
            buffer: Mutex::new(String::new()),
        }
    }

    pub fn matcher(&self) -> &M {
        &self.matcher
    }

    fn lock_buffer(&self) -> MutexGuard<'_, String> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 加入新收到的文字，依序回傳所有已完整的訊息
    ///
    /// 回傳後緩衝區只剩下尚未匹配的部分。
    pub fn push(&self, chunk: &str) -> Vec<M::Frame> {
        let mut buffer = self.lock_buffer();
        buffer.push_str(chunk);

        let mut frames = Vec::new();
        let mut consumed = 0;
        while let Some((frame, used)) = self.matcher.next_frame(&buffer[consumed..]) {
            debug_assert!(used > 0);
            frames.push(frame);
            consumed += used;
        }

        buffer.drain(..consumed);
        frames
    }

    /// 尚未成為訊息的文字
    pub fn pending(&self) -> String {
        self.lock_buffer().clone()
    }

    pub fn pending_len(&self) -> usize {
        self.lock_buffer().len()
    }

    /// 丟棄緩衝區內容
    pub fn clear(&self) {
        self.lock_buffer().clear();
    }
}
