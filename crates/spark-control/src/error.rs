//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中定义控制通道对外暴露的错误语义，区分“可重试的背压”与“调用方编程错误”；
//! - 为设备层提供到 `std::io::Error` 的稳定映射，使 `Backpressure` 能被翻译为
//!   “资源暂时不可用”（`WouldBlock`）。
//!
//! ## 设计要求（What）
//! - 所有错误类型通过 `thiserror::Error` 派生，兼容 `std::error::Error`；
//! - 每个变体对应 [`codes`] 中的稳定错误码，便于日志与告警按码聚合；
//! - 部分读写不是错误，只以字节数体现，不在本模块建模。

use std::{borrow::Cow, io};

use thiserror::Error;

/// 控制通道的稳定错误码。
///
/// 命名遵循 `<域>.<语义>` 约定，与传输层的 `spark.transport.*` 保持同一风格。
pub mod codes {
    /// 分块数量已达上限，写入需要等待读取侧释放空间。
    pub const BACKPRESSURE: &str = "spark.control.backpressure";
    /// 操作与当前生命周期或游标状态不符。
    pub const INVALID_STATE: &str = "spark.control.invalid_state";
    /// 调用方提供的搬运机制（用户态拷贝、Reader/Writer）失败。
    pub const TRANSFER_FAILED: &str = "spark.control.transfer_failed";
    /// 配置无法通过校验或解析。
    pub const INVALID_CONFIG: &str = "spark.control.invalid_config";
}

/// 控制通道错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：将缓冲协议、通道生命周期与调用方搬运机制的失败收敛为单一枚举，
///   `?` 可直接跨越 `ConfBuf` → `ConfigChannel` → 设备层传播。
/// - **契约 (What)**：
///   - `Backpressure` 是唯一可重试的错误，内部从不自动重试；
///   - `InvalidState` 表示调用顺序错误，应视为本次操作的致命错误；
///   - `TransferFailure` 发生前已经提交/消费的字节保持有效。
/// - **设计权衡 (Trade-offs)**：`TransferFailure` 携带原始 `io::Error`，因此枚举不实现 `Clone`/`PartialEq`，
///   测试中通过 [`ControlError::code`] 比较。
#[derive(Debug, Error)]
pub enum ControlError {
    /// 需要扩容但活跃分块数已达上限。
    ///
    /// - `max_chunks`：触发背压时的分块上限；
    /// - `committed`：本次调用在停顿前已经提交的字节数（底层 `prepare_write` 触发时为 0）。
    #[error(
        "control buffer is full: {max_chunks} chunks in use, {committed} bytes committed before stall"
    )]
    Backpressure { max_chunks: usize, committed: usize },

    /// 调用与缓冲游标或通道生命周期不一致。
    #[error("invalid control channel state: {detail}")]
    InvalidState { detail: Cow<'static, str> },

    /// 调用方的拷贝机制失败。
    #[error("caller transfer failed after {transferred} bytes: {source}")]
    TransferFailure {
        transferred: usize,
        #[source]
        source: io::Error,
    },

    /// 配置非法。
    #[error("invalid control channel configuration: {detail}")]
    InvalidConfig { detail: String },
}

impl ControlError {
    /// 构造状态错误，接受静态文案或运行期拼接的描述。
    pub fn invalid_state(detail: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidState {
            detail: detail.into(),
        }
    }

    /// 返回稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            Self::Backpressure { .. } => codes::BACKPRESSURE,
            Self::InvalidState { .. } => codes::INVALID_STATE,
            Self::TransferFailure { .. } => codes::TRANSFER_FAILED,
            Self::InvalidConfig { .. } => codes::INVALID_CONFIG,
        }
    }

    /// 是否建议调用方稍后重试。
    ///
    /// 仅背压可重试：读取侧排空出站缓冲或解析器消费入站数据后，同样的写入可能成功。
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Backpressure { .. })
    }

    /// 为背压错误补充本次调用已提交的字节数，其它变体原样返回。
    pub(crate) fn with_committed(self, bytes: usize) -> Self {
        match self {
            Self::Backpressure { max_chunks, .. } => Self::Backpressure {
                max_chunks,
                committed: bytes,
            },
            other => other,
        }
    }

    /// 为搬运错误补充本次调用累计搬运的字节数，其它变体原样返回。
    pub(crate) fn with_transferred(self, bytes: usize) -> Self {
        match self {
            Self::TransferFailure { source, .. } => Self::TransferFailure {
                transferred: bytes,
                source,
            },
            other => other,
        }
    }
}

impl From<ControlError> for io::Error {
    /// 供设备层把控制通道错误翻译为系统调用语义。
    ///
    /// - `Backpressure` → `WouldBlock`（用户态得到“请稍后再试”）；
    /// - `TransferFailure` 透传原始 `io::Error`，保留 `EFAULT` 等原始信息；
    /// - 其余映射为 `InvalidInput`。
    fn from(value: ControlError) -> Self {
        match value {
            ControlError::Backpressure { .. } => io::Error::new(io::ErrorKind::WouldBlock, value),
            ControlError::TransferFailure { source, .. } => source,
            ControlError::InvalidState { .. } | ControlError::InvalidConfig { .. } => {
                io::Error::new(io::ErrorKind::InvalidInput, value)
            }
        }
    }
}

/// 在搬运阶段把 `io::Error` 包装为 [`ControlError::TransferFailure`]。
pub(crate) fn transfer_failure(source: io::Error) -> ControlError {
    ControlError::TransferFailure {
        transferred: 0,
        source,
    }
}
