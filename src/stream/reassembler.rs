//! 后端流重组
//!
//! 把后端原始字节流重组成逻辑事件，支持两种消费方式：
//!
//! - 转发模式 (`RelayReassembler` / [`relay`]): 每收到一个非空文本快照就下发一次，
//!   快照整体作为 delta，不与上一次做差分
//! - 累积模式 (`Accumulator` / [`accumulate`]): 静默消费整条流，结束时给出一个结果
//!
//! 后端每个事件都重发截至当前的完整文本，因此新快照总是替换旧快照。

use crate::backends::{BackendError, ByteStream};
use crate::models::chatgpt::ChatGptStreamEvent;
use crate::stream::events::{AccumulatedResult, BackendEvent, CapturedIds, RelayEvent};
use crate::stream::parsers::ChatGptSseParser;
use futures::{Stream, StreamExt};
use tracing::{debug, warn};

/// 单次后端调用期间的流状态
#[derive(Debug, Default)]
pub struct StreamState {
    /// 最近一次出现的 conversation id
    pub conversation_id: Option<String>,
    /// 最近一次出现的 message id
    pub message_id: Option<String>,
    /// 最近一次的非空文本快照
    pub content: String,
    /// 最近一个带 message id 的事件
    pub last_message_event: Option<ChatGptStreamEvent>,
    /// 是否已收到 `[DONE]`
    pub saw_done: bool,
}

impl StreamState {
    /// 吸收一个 payload，返回其中的非空文本快照
    pub fn observe(&mut self, event: ChatGptStreamEvent) -> Option<String> {
        if let Some(cid) = event.conversation_id.as_deref() {
            if !cid.is_empty() {
                self.conversation_id = Some(cid.to_string());
            }
        }

        let snapshot = event
            .snapshot()
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        if let Some(text) = &snapshot {
            self.content.clone_from(text);
        }

        if let Some(mid) = event.message_id().filter(|id| !id.is_empty()) {
            self.message_id = Some(mid.to_string());
            self.last_message_event = Some(event);
        }

        snapshot
    }

    pub fn ids(&self) -> CapturedIds {
        CapturedIds {
            conversation_id: self.conversation_id.clone(),
            message_id: self.message_id.clone(),
        }
    }
}

/// 转发模式重组器
#[derive(Debug, Default)]
pub struct RelayReassembler {
    parser: ChatGptSseParser,
    state: StreamState,
    finished: bool,
}

impl RelayReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 是否已经下发过结束事件
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn state(&self) -> &StreamState {
        &self.state
    }

    /// 处理一段字节，返回应下发的事件
    ///
    /// 遇到 `[DONE]` 后下发 `Done` 并停止处理后续数据。
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<RelayEvent> {
        if self.finished {
            return Vec::new();
        }

        let mut out = Vec::new();
        for event in self.parser.feed(chunk) {
            match event {
                BackendEvent::Done => {
                    self.state.saw_done = true;
                    self.finished = true;
                    out.push(RelayEvent::Done {
                        ids: self.state.ids(),
                        terminated: true,
                    });
                    break;
                }
                BackendEvent::Payload(payload) => {
                    if let Some(content) = self.state.observe(payload) {
                        out.push(RelayEvent::Delta {
                            content,
                            message_id: self.state.message_id.clone(),
                        });
                    }
                }
            }
        }
        out
    }

    /// 字节流结束
    ///
    /// 没有收到 `[DONE]` 时补一个未正常终止的 `Done`。
    pub fn finish(&mut self) -> Option<RelayEvent> {
        if self.finished {
            return None;
        }
        self.finished = true;
        self.parser.finish();
        warn!("[TRANSLIT] 后端流未发送 [DONE] 即结束");
        Some(RelayEvent::Done {
            ids: self.state.ids(),
            terminated: false,
        })
    }
}

/// 累积模式重组器
#[derive(Debug, Default)]
pub struct Accumulator {
    parser: ChatGptSseParser,
    state: StreamState,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 处理一段字节，收到 `[DONE]` 时返回 true
    pub fn feed(&mut self, chunk: &[u8]) -> bool {
        if self.state.saw_done {
            return true;
        }
        for event in self.parser.feed(chunk) {
            match event {
                BackendEvent::Done => {
                    self.state.saw_done = true;
                    return true;
                }
                BackendEvent::Payload(payload) => {
                    self.state.observe(payload);
                }
            }
        }
        false
    }

    /// 因 JSON 无效而跳过的行数
    pub fn skipped_lines(&self) -> usize {
        self.parser.skipped()
    }

    /// 生成最终结果
    ///
    /// 见过 message id 即成功；否则仅当累积到非空内容时成功。
    /// 内容取最新快照，最新快照为空时退回最后一个带 message id 的事件。
    pub fn finish(mut self) -> AccumulatedResult {
        self.parser.finish();
        let state = self.state;

        let message_id = state
            .last_message_event
            .as_ref()
            .and_then(|e| e.message_id())
            .map(str::to_string)
            .or(state.message_id);
        let content = if state.content.is_empty() {
            state
                .last_message_event
                .as_ref()
                .and_then(|e| e.snapshot())
                .unwrap_or_default()
                .to_string()
        } else {
            state.content
        };

        let (success, error) = if message_id.is_some() || !content.is_empty() {
            (true, None)
        } else if state.saw_done {
            (
                false,
                Some("stream completed without a message id or content".to_string()),
            )
        } else {
            (
                false,
                Some("stream ended before any content was received".to_string()),
            )
        };

        AccumulatedResult {
            conversation_id: state.conversation_id,
            message_id,
            content,
            success,
            error,
        }
    }
}

/// 转发模式：把后端字节流转换为 `RelayEvent` 流
///
/// 流总是以一个 `Done` 结束，除非中途出现传输错误（此时以 `Err` 结束）。
pub fn relay(mut body: ByteStream) -> impl Stream<Item = Result<RelayEvent, BackendError>> + Send {
    async_stream::stream! {
        let mut reassembler = RelayReassembler::new();
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => {
                    for event in reassembler.feed(&bytes) {
                        yield Ok(event);
                    }
                    if reassembler.is_finished() {
                        debug!("[TRANSLIT] 收到 [DONE]，停止读取后端流");
                        return;
                    }
                }
                Err(e) => {
                    yield Err(e);
                    return;
                }
            }
        }
        if let Some(done) = reassembler.finish() {
            yield Ok(done);
        }
    }
}

/// 累积模式：读完整条后端流
pub async fn accumulate(mut body: ByteStream) -> Result<AccumulatedResult, BackendError> {
    let mut accumulator = Accumulator::new();
    while let Some(chunk) = body.next().await {
        if accumulator.feed(&chunk?) {
            break;
        }
    }
    let skipped = accumulator.skipped_lines();
    if skipped > 0 {
        debug!("[TRANSLIT] 累积时跳过了 {} 行无效数据", skipped);
    }
    Ok(accumulator.finish())
}
