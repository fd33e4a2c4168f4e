//! 分块缓冲 `ConfBuf` 及其读写协议。
//!
//! # 模块定位（Why）
//! - 控制通道的写入可能被拆成任意多次、任意长度的系统调用，读取亦然；`ConfBuf`
//!   把这些零散 I/O 收敛为一条有界、有序的字节流；
//! - 两阶段协议（prepare/commit、prepare/consume）让调用方直接在分块内存上读写，
//!   无需中间拷贝。
//!
//! # 结构说明（How）
//! - 分块保存在 `VecDeque<Chunk>` 环形队列中：队首为最早未读分块（head），队尾为正在写入的分块（tail）；
//! - `read_offset` 指向 head 内下一个未读字节，`write_offset` 指向 tail 内下一个空闲字节；
//! - tail 的可读范围以 `write_offset` 为界，而非分配容量，读者因此永远看不到未提交的字节；
//!   非 tail 分块在被取代时已封存（容量截断为已提交长度）。
//!
//! # 契约说明（What）
//! - 活跃分块数始终不超过 `max_chunks`；需要扩容而无额度时返回 [`ControlError::Backpressure`]；
//! - 分块在其已提交字节被读尽时释放；读者追上写者时尾块一并释放，缓冲回到空态。

mod chunk;
mod stream;
mod writer;

use std::collections::VecDeque;

use tracing::debug;

use crate::{
    config::ConfBufConfig,
    error::{ControlError, transfer_failure},
    transfer::{ByteSink, ByteSource, SliceSource},
};

use self::chunk::Chunk;

pub use self::{stream::StreamAdapter, writer::ResponseWriter};

const LOG_TARGET: &str = "spark_control::confbuf";

/// 缓冲状态快照。
///
/// # 契约说明（What）
/// - `chunk_count`：当前存活分块数；
/// - `readable_bytes`：已提交但尚未消费的字节数；
/// - `allocated_bytes`：所有存活分块的容量之和（封存分块按截断后容量计）；
/// - `committed_bytes`/`consumed_bytes`：生命周期内累计提交与消费的字节数，`reset` 不清零；
/// - `backpressure_events`：累计触发背压的次数。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ConfBufStats {
    pub chunk_count: usize,
    pub readable_bytes: usize,
    pub allocated_bytes: usize,
    pub committed_bytes: u64,
    pub consumed_bytes: u64,
    pub backpressure_events: u64,
}

#[derive(Debug, Default)]
struct Counters {
    committed: u64,
    consumed: u64,
    backpressure: u64,
}

/// 有界分块缓冲。
///
/// # 教案式说明
/// - **意图 (Why)**：为控制通道的入站/出站两个方向各提供一条字节流，内存上界由
///   [`ConfBufConfig`] 决定，耗尽时以背压通知调用方而非无界增长；
/// - **逻辑 (How)**：
///   - 写侧：[`prepare_write`](Self::prepare_write) 返回可写区段，调用方填充后以
///     [`commit_write`](Self::commit_write) 宣告实际字节数；
///   - 读侧：[`prepare_read`](Self::prepare_read) 暴露一段已提交字节，处理后以
///     [`consume_read`](Self::consume_read) 推进读游标；
///   - tail 写满后并不立即切换，下一次 `prepare_write` 才会封存旧 tail 并追加新分块。
/// - **契约 (What)**：
///   - `ConfBuf` 自身不含锁，并发访问由 [`ConfigChannel`](crate::ConfigChannel) 的互斥锁串行化；
///   - 任何返回错误的调用都不会修改游标。
/// - **设计权衡 (Trade-offs)**：
///   - 读者追上写者时释放尾块，牺牲尾块剩余空间换取“读尽即零占用”；
///   - 允许短写的请求从不分配超大分块，超大分块只服务于不接受短写的调用方。
#[derive(Debug)]
pub struct ConfBuf {
    chunks: VecDeque<Chunk>,
    read_offset: usize,
    write_offset: usize,
    config: ConfBufConfig,
    counters: Counters,
}

impl Default for ConfBuf {
    fn default() -> Self {
        Self::with_validated(ConfBufConfig::default())
    }
}

impl ConfBuf {
    /// 按配置创建空缓冲；配置非法时返回 [`ControlError::InvalidConfig`]。
    pub fn new(config: ConfBufConfig) -> Result<Self, ControlError> {
        config.validate()?;
        Ok(Self::with_validated(config))
    }

    pub(crate) fn with_validated(config: ConfBufConfig) -> Self {
        Self {
            chunks: VecDeque::with_capacity(config.max_chunks),
            read_offset: 0,
            write_offset: 0,
            config,
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> ConfBufConfig {
        self.config
    }

    /// 当前存活分块数。
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// 已提交且尚未消费的字节数。
    pub fn readable_len(&self) -> usize {
        let committed: usize = (0..self.chunks.len())
            .map(|index| self.committed_len(index))
            .sum();
        committed - self.read_offset
    }

    /// 没有可读字节时返回 `true`（即便仍保留着尾块）。
    pub fn is_empty(&self) -> bool {
        self.readable_len() == 0
    }

    /// 按队列顺序返回每个分块的已提交长度：封存分块为截断后容量，tail 为写游标。
    pub fn chunk_lengths(&self) -> Vec<usize> {
        (0..self.chunks.len())
            .map(|index| self.committed_len(index))
            .collect()
    }

    /// 为一次写入准备可写区段。
    ///
    /// # 契约说明（What）
    /// - `requested`：期望写入的字节数；为 0 时返回空区段且不分配；
    /// - `allow_short`：为 `true` 时接受比请求更短的区段，tail 剩余空间会被优先用尽；
    ///   为 `false` 时若 tail 剩余空间不足，则封存 tail 并分配足以容纳整个请求的新分块；
    /// - **返回值**：长度为 `min(requested, 可用空间)` 的可写区段，写入后须调用
    ///   [`commit_write`](Self::commit_write)；
    /// - **错误**：需要扩容而分块数已达上限时返回 [`ControlError::Backpressure`]，缓冲保持不变。
    pub fn prepare_write(
        &mut self,
        requested: usize,
        allow_short: bool,
    ) -> Result<&mut [u8], ControlError> {
        if requested == 0 {
            return Ok(&mut []);
        }
        let free = self.tail_free();
        if free > 0 && (free >= requested || allow_short) {
            return self.tail_region(requested.min(free));
        }
        self.grow(requested, allow_short)?;
        let free = self.tail_free();
        self.tail_region(requested.min(free))
    }

    /// 宣告最近一次 `prepare_write` 区段中实际写入了 `size` 字节。
    ///
    /// 超出 tail 剩余空间的提交返回 [`ControlError::InvalidState`]，游标保持不变。
    pub fn commit_write(&mut self, size: usize) -> Result<(), ControlError> {
        if size == 0 {
            return Ok(());
        }
        let free = self.tail_free();
        if size > free {
            return Err(ControlError::invalid_state(format!(
                "commit of {size} bytes exceeds the {free} writable bytes of the tail chunk"
            )));
        }
        self.write_offset += size;
        self.counters.committed += size as u64;
        Ok(())
    }

    /// 暴露至多 `max_size` 个已提交、未消费的连续字节。
    ///
    /// 跳过已读尽的分块；返回空切片表示当前没有可读数据（并非错误）。
    /// 返回区段不会跨越分块边界，调用方需循环读取。
    pub fn prepare_read(&self, max_size: usize) -> &[u8] {
        match self.first_unread() {
            Some((index, offset, unread)) => self
                .chunks
                .get(index)
                .map_or(&[][..], |chunk| chunk.region(offset, unread.min(max_size))),
            None => &[],
        }
    }

    /// 标记 `size` 字节已被消费。
    ///
    /// # 契约说明（What）
    /// - `size` 不得超过紧随其前的 [`prepare_read`](Self::prepare_read) 可暴露的长度，
    ///   否则返回 [`ControlError::InvalidState`]；
    /// - 读尽的分块立即释放，`chunk_count` 随之减少；
    /// - 校验失败时缓冲保持原样，已准备未提交的写区段仍可提交。
    pub fn consume_read(&mut self, size: usize) -> Result<(), ControlError> {
        if size == 0 {
            return Ok(());
        }
        let unread = self.first_unread().map_or(0, |(_, _, unread)| unread);
        if size > unread {
            return Err(ControlError::invalid_state(format!(
                "consume of {size} bytes exceeds the {unread} readable bytes of the head chunk"
            )));
        }
        // 校验通过后才丢弃可读分块之前已读尽的分块；此时可读分块必然存在，tail 不会被误释放。
        self.release_drained();
        self.read_offset += size;
        self.counters.consumed += size as u64;
        self.release_drained();
        Ok(())
    }

    /// 获取面向解析器的逐字节视图。
    pub fn stream(&mut self) -> StreamAdapter<'_> {
        StreamAdapter::new(self)
    }

    /// 获取只允许追加写入的视图，供解析器产出响应。
    pub fn writer(&mut self) -> ResponseWriter<'_> {
        ResponseWriter::new(self)
    }

    /// 从 `source` 搬入尽可能多的字节，直到来源耗尽或触发背压。
    ///
    /// # 执行步骤（How）
    /// 1. 以 `allow_short = true` 准备写区段，长度为来源剩余量；
    /// 2. 由来源填充区段，成功后才提交；
    /// 3. 重复直至来源耗尽。
    ///
    /// # 错误语义（What）
    /// - 背压：返回的 [`ControlError::Backpressure`] 携带本次已提交字节数，已提交数据保留；
    /// - 来源拷贝失败：返回 [`ControlError::TransferFailure`]，失败区段不提交。
    pub fn fill_from<S>(&mut self, source: &mut S) -> Result<usize, ControlError>
    where
        S: ByteSource + ?Sized,
    {
        let mut committed = 0;
        while source.remaining() > 0 {
            let region = self
                .prepare_write(source.remaining(), true)
                .map_err(|err| err.with_committed(committed))?;
            let len = region.len();
            source
                .copy_to(region)
                .map_err(|err| transfer_failure(err).with_transferred(committed))?;
            self.commit_write(len)?;
            committed += len;
        }
        Ok(committed)
    }

    /// 将可读字节搬出到 `sink`，直到 `sink` 写满或缓冲读空。
    ///
    /// 拷贝失败时返回 [`ControlError::TransferFailure`]，失败区段不消费，可在下次读取中重新交付。
    pub fn drain_into<K>(&mut self, sink: &mut K) -> Result<usize, ControlError>
    where
        K: ByteSink + ?Sized,
    {
        let mut delivered = 0;
        while sink.remaining() > 0 {
            let region = self.prepare_read(sink.remaining());
            if region.is_empty() {
                break;
            }
            let len = region.len();
            sink.copy_from(region)
                .map_err(|err| transfer_failure(err).with_transferred(delivered))?;
            self.consume_read(len)?;
            delivered += len;
        }
        Ok(delivered)
    }

    /// 写入整段字节，供解析器产出响应使用；语义同 [`fill_from`](Self::fill_from)。
    pub fn put_slice(&mut self, bytes: &[u8]) -> Result<usize, ControlError> {
        self.fill_from(&mut SliceSource::new(bytes))
    }

    /// 释放全部分块并复位游标，返回释放的分块数。累计计数不清零。
    pub fn reset(&mut self) -> usize {
        let released = self.chunks.len();
        self.chunks.clear();
        self.read_offset = 0;
        self.write_offset = 0;
        released
    }

    /// 生成状态快照。
    pub fn stats(&self) -> ConfBufStats {
        ConfBufStats {
            chunk_count: self.chunks.len(),
            readable_bytes: self.readable_len(),
            allocated_bytes: self.chunks.iter().map(Chunk::capacity).sum(),
            committed_bytes: self.counters.committed,
            consumed_bytes: self.counters.consumed,
            backpressure_events: self.counters.backpressure,
        }
    }

    /// 第 `index` 个分块的已提交长度；tail 以写游标为界。
    fn committed_len(&self, index: usize) -> usize {
        if index + 1 == self.chunks.len() {
            self.write_offset
        } else {
            self.chunks.get(index).map_or(0, Chunk::capacity)
        }
    }

    fn tail_free(&self) -> usize {
        self.chunks
            .back()
            .map_or(0, |tail| tail.capacity() - self.write_offset)
    }

    /// 定位第一个仍有未读字节的分块，返回 `(下标, 块内偏移, 未读字节数)`；只读，不释放任何分块。
    fn first_unread(&self) -> Option<(usize, usize, usize)> {
        let mut offset = self.read_offset;
        for index in 0..self.chunks.len() {
            let committed = self.committed_len(index);
            if committed > offset {
                return Some((index, offset, committed - offset));
            }
            offset = 0;
        }
        None
    }

    fn tail_region(&mut self, len: usize) -> Result<&mut [u8], ControlError> {
        let start = self.write_offset;
        match self.chunks.back_mut() {
            Some(tail) => {
                debug_assert!(!tail.is_sealed(), "封存分块不可作为 tail 继续写入");
                Ok(tail.region_mut(start, len))
            }
            None => Err(ControlError::invalid_state(
                "confbuf has no tail chunk to write into",
            )),
        }
    }

    /// 封存当前 tail 并追加新分块。
    fn grow(&mut self, requested: usize, allow_short: bool) -> Result<(), ControlError> {
        let max_chunks = self.config.max_chunks;
        if self.chunks.len() >= max_chunks {
            self.counters.backpressure += 1;
            debug!(
                target: LOG_TARGET,
                max_chunks,
                requested,
                readable = self.readable_len(),
                "chunk limit reached, refusing to grow"
            );
            return Err(ControlError::Backpressure {
                max_chunks,
                committed: 0,
            });
        }
        let capacity = if !allow_short && requested > self.config.chunk_size {
            requested
        } else {
            self.config.chunk_size
        };
        let sealed_len = self.write_offset;
        if let Some(tail) = self.chunks.back_mut() {
            tail.seal(sealed_len);
        }
        self.chunks.push_back(Chunk::with_capacity(capacity));
        self.write_offset = 0;
        Ok(())
    }

    /// 释放队首已读尽的分块；读者在 tail 内追上写者时连同 tail 一并释放。
    ///
    /// 尚未被读过的 tail（`read_offset == 0`）保留，其中可能有已准备、待提交的写区段。
    fn release_drained(&mut self) {
        while !self.chunks.is_empty() && self.read_offset >= self.committed_len(0) {
            let was_tail = self.chunks.len() == 1;
            if was_tail && self.read_offset == 0 {
                break;
            }
            self.chunks.pop_front();
            self.read_offset = 0;
            if was_tail {
                self.write_offset = 0;
            }
        }
    }
}
