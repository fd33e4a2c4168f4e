//! 请求/响应控制通道。
//!
//! # 模块定位（Why）
//! - 用户态进程通过“写命令、读响应”的方式配置框架；一个通道对应一个控制端点，
//!   需要在多个调用方并发访问时保证写入、解析、读取三步不被交错；
//! - 本模块将两个 [`ConfBuf`] 与解析器收拢在同一把锁之下，对外只暴露
//!   [`write_into`](ConfigChannel::write_into)、[`read_from`](ConfigChannel::read_from)
//!   与 [`destroy`](ConfigChannel::destroy) 三个入口。
//!
//! # 生命周期（What）
//! ```text
//! Idle ──write_into──▶ WriteInProgress ──▶ Idle
//! Idle ──read_from───▶ ReadInProgress (先解析，后排空) ──▶ Idle
//! Idle ──destroy─────▶ Destroyed（终态）
//! ```
//! 每个入口在锁内完成整个阶段，外部观察者只会看到 `Idle` 或 `Destroyed`。

use tracing::{debug, trace, warn};

use crate::{
    config::ChannelConfig,
    confbuf::{ConfBuf, ConfBufStats},
    error::ControlError,
    parser::{ConfigParser, NoopParser},
    sync::{Mutex, lock},
    transfer::{ByteSink, ByteSource, SliceSink, SliceSource},
};

const LOG_TARGET: &str = "spark_control::channel";

/// 通道生命周期阶段。
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ChannelPhase {
    /// 空闲，可接受任意入口调用。
    Idle,
    /// 正在把调用方字节搬入入站缓冲。
    WriteInProgress,
    /// 正在解析并排空出站缓冲。
    ReadInProgress,
    /// 已销毁；读写入口返回 [`ControlError::InvalidState`]。
    Destroyed,
}

/// 通道状态快照。
///
/// `parse_passes` 统计解析器被调用的累计次数（含销毁时的最终一次），可用于确认解析是否发生。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChannelStats {
    pub phase: ChannelPhase,
    pub inbound: ConfBufStats,
    pub outbound: ConfBufStats,
    pub parse_passes: u64,
}

#[derive(Debug)]
struct ChannelState<P> {
    inbound: ConfBuf,
    outbound: ConfBuf,
    parser: P,
    phase: ChannelPhase,
    parse_passes: u64,
}

impl<P: ConfigParser> ChannelState<P> {
    fn ensure_live(&self, operation: &'static str) -> Result<(), ControlError> {
        if self.phase == ChannelPhase::Destroyed {
            return Err(ControlError::invalid_state(format!(
                "cannot {operation} on a destroyed control channel"
            )));
        }
        Ok(())
    }

    /// 以入站缓冲为输入、出站缓冲为输出运行一次解析。
    fn run_parser(&mut self) -> Result<(), ControlError> {
        self.parse_passes += 1;
        let mut input = self.inbound.stream();
        let result = self.parser.parse(&mut input, &mut self.outbound.writer());
        trace!(
            target: LOG_TARGET,
            pass = self.parse_passes,
            consumed = input.consumed(),
            pending = input.remaining(),
            "parse pass finished"
        );
        result
    }

    fn drain<K>(&mut self, sink: &mut K) -> Result<usize, ControlError>
    where
        K: ByteSink + ?Sized,
    {
        self.run_parser()?;
        self.outbound.drain_into(sink)
    }
}

/// 控制通道。
///
/// # 教案式说明
/// - **意图 (Why)**：把“任意切分的写入 → 解析 → 任意切分的读取”组织成可并发调用的请求/响应循环；
/// - **逻辑 (How)**：
///   - 入站缓冲承接写入，出站缓冲承接解析器产出，两者角色固定、互不交换；
///   - 一把互斥锁覆盖两侧缓冲、解析器与生命周期阶段，每个入口持锁完成全部工作；
///   - 每次写入都会清空出站缓冲：新的命令使旧响应作废（后写者胜）；
///   - 每次读取先运行解析器，因此解析器必须在没有新输入时保持幂等。
/// - **契约 (What)**：
///   - 通道在解析器满足 `Send` 时为 `Send + Sync`，可通过 `&self` 跨线程共享；
///   - 背压原样上报，内部从不重试；部分读取以字节数表示，不属于错误；
///   - `destroy` 永不失败且幂等；`Drop` 时若尚未销毁会自动执行一次。
/// - **设计权衡 (Trade-offs)**：解析在锁内进行，慢解析器会阻塞其它调用方；
///   控制面的吞吐需求低，换来的是无需考虑解析与读写交错。
#[derive(Debug)]
pub struct ConfigChannel<P: ConfigParser = NoopParser> {
    state: Mutex<ChannelState<P>>,
}

impl Default for ConfigChannel<NoopParser> {
    fn default() -> Self {
        Self::from_validated(ChannelConfig::default(), NoopParser)
    }
}

impl ConfigChannel<NoopParser> {
    /// 以默认的空解析器创建通道。
    pub fn new(config: ChannelConfig) -> Result<Self, ControlError> {
        Self::with_parser(config, NoopParser)
    }
}

impl<P: ConfigParser> ConfigChannel<P> {
    /// 以指定解析器创建通道；配置非法时返回 [`ControlError::InvalidConfig`]。
    pub fn with_parser(config: ChannelConfig, parser: P) -> Result<Self, ControlError> {
        config.validate()?;
        Ok(Self::from_validated(config, parser))
    }

    fn from_validated(config: ChannelConfig, parser: P) -> Self {
        Self {
            state: Mutex::new(ChannelState {
                inbound: ConfBuf::with_validated(config.inbound),
                outbound: ConfBuf::with_validated(config.outbound),
                parser,
                phase: ChannelPhase::Idle,
                parse_passes: 0,
            }),
        }
    }

    /// 把 `source` 的字节追加到入站缓冲。
    ///
    /// # 执行步骤（How）
    /// 1. 加锁并确认通道未销毁；
    /// 2. 清空出站缓冲，丢弃上一轮未读完的响应；
    /// 3. 以允许短写的方式循环准备、拷贝、提交，直到来源耗尽。
    ///
    /// # 契约说明（What）
    /// - **返回值**：成功时为本次提交的字节数，等于来源的初始剩余量；
    /// - **背压**：入站分块耗尽时返回 [`ControlError::Backpressure`]，其 `committed` 字段为
    ///   停顿前已提交的字节数，这些字节保留在入站缓冲中；
    /// - **搬运失败**：返回 [`ControlError::TransferFailure`]，失败的区段不提交。
    pub fn write_into<S>(&self, source: &mut S) -> Result<usize, ControlError>
    where
        S: ByteSource + ?Sized,
    {
        let mut guard = lock(&self.state);
        let state = &mut *guard;
        state.ensure_live("write")?;
        state.phase = ChannelPhase::WriteInProgress;
        let discarded = state.outbound.reset();
        let result = state.inbound.fill_from(source);
        state.phase = ChannelPhase::Idle;

        match &result {
            Ok(bytes) => debug!(
                target: LOG_TARGET,
                bytes = *bytes,
                discarded_chunks = discarded,
                chunk_count = state.inbound.chunk_count(),
                "write committed"
            ),
            Err(err) if err.is_retryable() => warn!(
                target: LOG_TARGET,
                code = err.code(),
                max_chunks = state.inbound.config().max_chunks,
                error = %err,
                "write stalled on backpressure"
            ),
            Err(err) => warn!(
                target: LOG_TARGET,
                code = err.code(),
                error = %err,
                "write aborted"
            ),
        }
        result
    }

    /// 以内存切片写入，语义同 [`write_into`](Self::write_into)。
    pub fn write(&self, bytes: &[u8]) -> Result<usize, ControlError> {
        self.write_into(&mut SliceSource::new(bytes))
    }

    /// 运行解析器后，把出站缓冲的字节搬到 `sink`。
    ///
    /// # 契约说明（What）
    /// - **返回值**：交付的字节数；`sink` 写满或出站缓冲读空即停止，两者都不是错误；
    /// - 未读完的响应保留到下一次读取；
    /// - 解析器错误原样返回，此时不交付任何字节；
    /// - 搬运失败返回 [`ControlError::TransferFailure`]，失败区段保留、可被再次读取。
    pub fn read_from<K>(&self, sink: &mut K) -> Result<usize, ControlError>
    where
        K: ByteSink + ?Sized,
    {
        let mut guard = lock(&self.state);
        let state = &mut *guard;
        state.ensure_live("read")?;
        state.phase = ChannelPhase::ReadInProgress;
        let result = state.drain(sink);
        state.phase = ChannelPhase::Idle;

        match &result {
            Ok(bytes) => debug!(
                target: LOG_TARGET,
                bytes = *bytes,
                pending = state.outbound.readable_len(),
                "read delivered"
            ),
            Err(err) => warn!(
                target: LOG_TARGET,
                code = err.code(),
                error = %err,
                "read aborted"
            ),
        }
        result
    }

    /// 读取到内存切片，语义同 [`read_from`](Self::read_from)。
    pub fn read(&self, buf: &mut [u8]) -> Result<usize, ControlError> {
        self.read_from(&mut SliceSink::new(buf))
    }

    /// 销毁通道：最后解析一次，随后释放两侧缓冲。
    ///
    /// 解析器错误只记录日志；重复调用不会再次解析。
    pub fn destroy(&self) {
        let mut guard = lock(&self.state);
        let state = &mut *guard;
        if state.phase == ChannelPhase::Destroyed {
            return;
        }
        if let Err(err) = state.run_parser() {
            warn!(
                target: LOG_TARGET,
                code = err.code(),
                error = %err,
                "final parse failed during teardown"
            );
        }
        let inbound_chunks = state.inbound.reset();
        let outbound_chunks = state.outbound.reset();
        state.phase = ChannelPhase::Destroyed;
        debug!(
            target: LOG_TARGET,
            inbound_chunks,
            outbound_chunks,
            "control channel destroyed"
        );
    }

    pub fn phase(&self) -> ChannelPhase {
        lock(&self.state).phase
    }

    /// 生成状态快照，任何阶段均可调用。
    pub fn stats(&self) -> ChannelStats {
        let state = lock(&self.state);
        ChannelStats {
            phase: state.phase,
            inbound: state.inbound.stats(),
            outbound: state.outbound.stats(),
            parse_passes: state.parse_passes,
        }
    }
}

impl<P: ConfigParser> Drop for ConfigChannel<P> {
    fn drop(&mut self) {
        self.destroy();
    }
}
