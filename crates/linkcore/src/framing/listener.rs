//! 將分幀器掛到連線上

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{
    DelimiterFramer, FrameMatcher, FramingError, PatternFrame, PatternFramer, StreamFramer,
};
use crate::connection::{recv_event, Connection, ConnectionEvent, Received};

/// 從連線文字事件切出的訊息流
///
/// 背景 task 訂閱連線的文字事件並分幀；被 drop 時停止。
/// 訊息佇列沒有上限，讀取慢不會拖累事件接收。
/// 事件遺失時緩衝區會被清空，不會把前後不相干的片段拼成一個訊息。
pub struct FrameStream<T> {
    frames: mpsc::UnboundedReceiver<T>,
    task: JoinHandle<()>,
}

impl<T: Send + 'static> FrameStream<T> {
    /// 訂閱 `connection` 並以 `framer` 分幀（必須在 Tokio runtime 中呼叫）
    pub fn spawn<C, M>(connection: &C, framer: StreamFramer<M>) -> Self
    where
        C: Connection + ?Sized,
        M: FrameMatcher<Frame = T> + 'static,
    {
        let mut events = connection.subscribe();
        let (tx, frames) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            while let Some(received) = recv_event(&mut events).await {
                let text = match received {
                    Received::Event(ConnectionEvent::TextReceived(text)) => text,
                    Received::Event(_) => continue,
                    Received::Lagged(_) => {
                        warn!(
                            "文字事件遺失，丟棄 {} 位元組的未完成訊息",
                            framer.pending_len()
                        );
                        framer.clear();
                        continue;
                    }
                };
                for frame in framer.push(&text) {
                    if tx.send(frame).is_err() {
                        debug!("訊息接收端已關閉");
                        return;
                    }
                }
            }
        });

        Self { frames, task }
    }
}

impl<T> FrameStream<T> {
    /// 等待下一個訊息；連線被釋放後回傳 `None`
    pub async fn recv(&mut self) -> Option<T> {
        self.frames.recv().await
    }

    /// 取出已到達的訊息，不等待
    pub fn try_recv(&mut self) -> Option<T> {
        self.frames.try_recv().ok()
    }
}

impl<T> Drop for FrameStream<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// 為任何連線加上分幀監聽
pub trait FramingExt: Connection {
    /// 以分隔字串切分收到的文字
    fn delimited_frames<I, S>(&self, delimiters: I) -> Result<FrameStream<String>, FramingError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let framer = DelimiterFramer::with_delimiters(delimiters)?;
        Ok(FrameStream::spawn(self, framer))
    }

    /// 以正則表達式切分收到的文字
    fn pattern_frames<I, S>(&self, patterns: I) -> Result<FrameStream<PatternFrame>, FramingError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let framer = PatternFramer::with_patterns(patterns)?;
        Ok(FrameStream::spawn(self, framer))
    }
}

impl<C: Connection + ?Sized> FramingExt for C {}
