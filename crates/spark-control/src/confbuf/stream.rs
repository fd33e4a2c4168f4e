use std::io;

use crate::{error::ControlError, transfer::SliceSink};

use super::ConfBuf;

/// 解析器视角下的逐字节流。
///
/// # 教案式说明
/// - **意图 (Why)**：解析器只关心“下一个字节是什么、是否接受它”，不应感知分块边界；
/// - **逻辑 (How)**：`peek` 基于 `prepare_read(1)`，`consume` 基于 `consume_read(1)`，
///   分块切换与释放完全由 [`ConfBuf`] 处理；
/// - **契约 (What)**：
///   - 连续 `peek` 返回同一字节，直到 `consume` 成功；
///   - 没有待读字节时 `consume` 返回 [`ControlError::InvalidState`]；
///   - 适配器独占借用缓冲，生命周期内缓冲不会被其它路径修改。
#[derive(Debug)]
pub struct StreamAdapter<'a> {
    buffer: &'a mut ConfBuf,
    consumed: usize,
}

impl<'a> StreamAdapter<'a> {
    pub(crate) fn new(buffer: &'a mut ConfBuf) -> Self {
        Self {
            buffer,
            consumed: 0,
        }
    }

    /// 查看下一个未读字节，不推进游标。
    pub fn peek(&self) -> Option<u8> {
        self.buffer.prepare_read(1).first().copied()
    }

    /// 接受当前字节并推进一位。
    pub fn consume(&mut self) -> Result<(), ControlError> {
        if self.peek().is_none() {
            return Err(ControlError::invalid_state(
                "stream consume called with no pending byte",
            ));
        }
        self.buffer.consume_read(1)?;
        self.consumed += 1;
        Ok(())
    }

    /// `peek` + `consume` 的组合。
    pub fn next_byte(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.consume().ok()?;
        Some(byte)
    }

    /// 尚未消费的字节数。
    pub fn remaining(&self) -> usize {
        self.buffer.readable_len()
    }

    /// 通过本适配器累计消费的字节数。
    pub fn consumed(&self) -> usize {
        self.consumed
    }
}

impl io::Read for StreamAdapter<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut sink = SliceSink::new(buf);
        let read = self.buffer.drain_into(&mut sink)?;
        self.consumed += read;
        Ok(read)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use crate::config::ConfBufConfig;

    use super::*;

    #[test]
    fn peek_is_stable_across_chunk_boundaries() {
        let mut buf = ConfBuf::new(ConfBufConfig::new(2, 4)).expect("合法配置");
        buf.put_slice(b"abcde").expect("写入三块");
        let mut stream = buf.stream();
        let mut seen = Vec::new();
        while let Some(byte) = stream.peek() {
            assert_eq!(stream.peek(), Some(byte), "重复 peek 不得推进");
            stream.consume().expect("存在待读字节");
            seen.push(byte);
        }
        assert_eq!(seen, b"abcde");
        assert_eq!(stream.consumed(), 5);
        assert!(stream.consume().is_err(), "读尽后 consume 属于状态错误");
        drop(stream);
        assert_eq!(buf.chunk_count(), 0);
    }

    #[test]
    fn read_impl_drains_buffer() {
        let mut buf = ConfBuf::default();
        buf.put_slice(b"hello world").expect("写入");
        let mut stream = buf.stream();
        assert_eq!(stream.next_byte(), Some(b'h'));
        let mut rest = String::new();
        stream.read_to_string(&mut rest).expect("内存读取不会失败");
        assert_eq!(rest, "ello world");
        assert_eq!(stream.remaining(), 0);
        assert_eq!(stream.consumed(), 11);
    }
}
