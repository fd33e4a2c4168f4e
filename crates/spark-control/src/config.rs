//! 控制通道的容量配置。
//!
//! # 模块定位（Why）
//! - 分块大小与分块上限共同决定每个方向的内存上界：`chunk_size * max_chunks`
//!   （超大单次写入例外，其分块按请求大小精确分配）；
//! - 默认值沿用控制设备的历史取值：每块 1024 字节、最多 4 块。
//!
//! # 使用方式（How）
//! - 代码内构造：`ConfBufConfig::default().with_chunk_size(4)`；
//! - 文件加载：[`ChannelConfig::from_toml_str`] 解析含 `[inbound]`/`[outbound]` 表的 TOML 文档，
//!   缺省字段回退到默认值。

use serde::Deserialize;

use crate::error::ControlError;

/// 默认分块大小（字节）。
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// 默认分块上限。
pub const DEFAULT_MAX_CHUNKS: usize = 4;

/// 单个 [`ConfBuf`](crate::ConfBuf) 的容量策略。
///
/// # 契约说明（What）
/// - `chunk_size`：常规分块的字节数，必须大于 0；
/// - `max_chunks`：同时存活的分块上限，必须大于 0，达到上限后继续扩容将触发背压；
/// - 通过 [`validate`](Self::validate) 校验后方可用于构造缓冲。
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ConfBufConfig {
    pub chunk_size: usize,
    pub max_chunks: usize,
}

impl Default for ConfBufConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_chunks: DEFAULT_MAX_CHUNKS,
        }
    }
}

impl ConfBufConfig {
    /// 以指定参数构造配置，不做校验。
    pub const fn new(chunk_size: usize, max_chunks: usize) -> Self {
        Self {
            chunk_size,
            max_chunks,
        }
    }

    /// 替换分块大小。
    pub const fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// 替换分块上限。
    pub const fn with_max_chunks(mut self, max_chunks: usize) -> Self {
        self.max_chunks = max_chunks;
        self
    }

    /// 校验配置是否可用。
    pub fn validate(&self) -> Result<(), ControlError> {
        if self.chunk_size == 0 {
            return Err(ControlError::InvalidConfig {
                detail: "chunk_size must be greater than zero".to_owned(),
            });
        }
        if self.max_chunks == 0 {
            return Err(ControlError::InvalidConfig {
                detail: "max_chunks must be greater than zero".to_owned(),
            });
        }
        Ok(())
    }
}

/// 通道两侧缓冲的配置。
///
/// 入站缓冲承接用户写入，出站缓冲承接解析器产出；两者独立限额，互不挤占。
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelConfig {
    pub inbound: ConfBufConfig,
    pub outbound: ConfBufConfig,
}

impl ChannelConfig {
    /// 两侧使用同一份缓冲策略。
    pub const fn symmetric(buffer: ConfBufConfig) -> Self {
        Self {
            inbound: buffer,
            outbound: buffer,
        }
    }

    /// 校验两侧配置。
    pub fn validate(&self) -> Result<(), ControlError> {
        self.inbound
            .validate()
            .map_err(|err| prefix_config_error("inbound", err))?;
        self.outbound
            .validate()
            .map_err(|err| prefix_config_error("outbound", err))
    }

    /// 从 TOML 文本解析并校验配置。
    ///
    /// ```rust
    /// use spark_control::ChannelConfig;
    ///
    /// let config = ChannelConfig::from_toml_str(
    ///     "[inbound]\nchunk_size = 256\n\n[outbound]\nmax_chunks = 8\n",
    /// )
    /// .expect("合法配置");
    /// assert_eq!(config.inbound.chunk_size, 256);
    /// assert_eq!(config.inbound.max_chunks, 4);
    /// assert_eq!(config.outbound.max_chunks, 8);
    /// ```
    pub fn from_toml_str(text: &str) -> Result<Self, ControlError> {
        let config: Self = toml::from_str(text).map_err(|err| ControlError::InvalidConfig {
            detail: err.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }
}

fn prefix_config_error(side: &str, err: ControlError) -> ControlError {
    match err {
        ControlError::InvalidConfig { detail } => ControlError::InvalidConfig {
            detail: format!("{side}: {detail}"),
        },
        other => other,
    }
}
