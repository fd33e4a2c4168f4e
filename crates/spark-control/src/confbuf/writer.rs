use crate::error::ControlError;

use super::ConfBuf;

/// 解析器视角下的响应写入端。
///
/// # 教案式说明
/// - **意图 (Why)**：解析器只应向出站缓冲追加响应，不应读取、消费或复位它；
/// - **逻辑 (How)**：独占借用 [`ConfBuf`]，仅转发 prepare/commit 写协议与整段写入；
/// - **契约 (What)**：语义与 [`ConfBuf::prepare_write`]、[`ConfBuf::commit_write`]、
///   [`ConfBuf::put_slice`] 完全一致，背压同样以 [`ControlError::Backpressure`] 上报。
#[derive(Debug)]
pub struct ResponseWriter<'a> {
    buffer: &'a mut ConfBuf,
}

impl<'a> ResponseWriter<'a> {
    pub(crate) fn new(buffer: &'a mut ConfBuf) -> Self {
        Self { buffer }
    }

    pub fn prepare_write(
        &mut self,
        requested: usize,
        allow_short: bool,
    ) -> Result<&mut [u8], ControlError> {
        self.buffer.prepare_write(requested, allow_short)
    }

    pub fn commit_write(&mut self, size: usize) -> Result<(), ControlError> {
        self.buffer.commit_write(size)
    }

    pub fn put_slice(&mut self, bytes: &[u8]) -> Result<usize, ControlError> {
        self.buffer.put_slice(bytes)
    }
}
