//! ChatGPT 后端 SSE 解析器
//!
//! 后端输出按换行分隔的逻辑行，只有 `data: ` 前缀的行携带 payload。
//! 网络读取可能在任意字节处切断一行，未以换行结尾的尾部片段
//! 留在缓冲区等待下一次读取，绝不当作完整行处理。

use crate::models::chatgpt::ChatGptStreamEvent;
use crate::stream::events::BackendEvent;
use tracing::{debug, warn};

const DATA_PREFIX: &str = "data: ";
const DONE_TOKEN: &str = "[DONE]";

/// 行缓冲
///
/// 按字节缓冲，多字节 UTF-8 字符被切断时也能正确拼回。
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一段字节，返回其中所有完整的行（不含换行符和行尾 `\r`）
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let Some(last_newline) = self.pending.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };
        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);

        complete[..last_newline]
            .split(|b| *b == b'\n')
            .map(|line| {
                let line = line.strip_suffix(b"\r").unwrap_or(line);
                String::from_utf8_lossy(line).into_owned()
            })
            .collect()
    }

    /// 缓冲区中尚未成行的字节数
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// 取出剩余的不完整片段
    pub fn take_remainder(&mut self) -> String {
        String::from_utf8_lossy(&std::mem::take(&mut self.pending)).into_owned()
    }
}

/// 后端 SSE 解析器
#[derive(Debug, Default)]
pub struct ChatGptSseParser {
    lines: LineBuffer,
    /// 因 JSON 无效而跳过的行数
    skipped: usize,
}

impl ChatGptSseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// 处理一段网络数据，返回其中完整行解析出的事件
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<BackendEvent> {
        self.lines
            .push(chunk)
            .iter()
            .filter_map(|line| self.parse_line(line))
            .collect()
    }

    /// 流结束，丢弃未成行的尾部片段
    pub fn finish(&mut self) {
        let remainder = self.lines.take_remainder();
        if !remainder.trim().is_empty() {
            debug!(
                "[ChatGptSseParser] 流结束时丢弃不完整的行 ({} 字节)",
                remainder.len()
            );
        }
    }

    /// 因 JSON 无效而跳过的行数
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// 解析单行
    ///
    /// 非 `data: ` 行返回 `None`；JSON 无效的行记录警告后跳过。
    pub fn parse_line(&mut self, line: &str) -> Option<BackendEvent> {
        let data = line.strip_prefix(DATA_PREFIX)?;
        if data.trim() == DONE_TOKEN {
            return Some(BackendEvent::Done);
        }

        match serde_json::from_str::<ChatGptStreamEvent>(data) {
            Ok(event) => Some(BackendEvent::Payload(event)),
            Err(e) => {
                self.skipped += 1;
                warn!(
                    "[ChatGptSseParser] 跳过无效的 JSON 行: {} - data: {}",
                    e,
                    crate::server_utils::safe_truncate(data, 200)
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_buffer_keeps_partial_line() {
        let mut buf = LineBuffer::new();
        assert!(buf.push(b"data: {\"a\"").is_empty());
        assert_eq!(buf.pending_len(), 10);

        let lines = buf.push(b":1}\ndata: [DO");
        assert_eq!(lines, vec!["data: {\"a\":1}".to_string()]);

        let lines = buf.push(b"NE]\r\n\n");
        assert_eq!(lines, vec!["data: [DONE]".to_string(), String::new()]);
        assert_eq!(buf.pending_len(), 0);
    }

    #[test]
    fn test_line_buffer_rejoins_split_utf8() {
        let text = "data: 你好\n".as_bytes();
        let mut buf = LineBuffer::new();
        assert!(buf.push(&text[..8]).is_empty());
        assert_eq!(buf.push(&text[8..]), vec!["data: 你好".to_string()]);
    }

    #[test]
    fn test_parse_line_variants() {
        let mut parser = ChatGptSseParser::new();
        assert_eq!(parser.parse_line("event: ping"), None);
        assert_eq!(parser.parse_line(""), None);
        assert_eq!(parser.parse_line("data: [DONE]"), Some(BackendEvent::Done));

        match parser.parse_line(r#"data: {"conversation_id":"c1"}"#) {
            Some(BackendEvent::Payload(event)) => {
                assert_eq!(event.conversation_id.as_deref(), Some("c1"))
            }
            other => panic!("unexpected: {:?}", other),
        }

        assert_eq!(parser.parse_line("data: {broken"), None);
        assert_eq!(parser.skipped(), 1);
    }

    #[test]
    fn test_finish_discards_remainder() {
        let mut parser = ChatGptSseParser::new();
        assert!(parser.feed(b"data: [DONE]").is_empty());
        parser.finish();
        assert!(parser.feed(b"\n").is_empty());
    }
}
