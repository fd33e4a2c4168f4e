//! `spark-control` 提供控制通道的缓冲引擎。
//!
//! # 模块定位（Why）
//! - 用户态进程通过类文件描述符的控制端点写入文本命令、读取响应；单次 `write()`/`read()`
//!   可能被切成任意多段，也可能被截短；
//! - 本 crate 把这些零散 I/O 组织成内存有界、可零拷贝交给解析器、可多线程安全访问的字节流。
//!
//! # 设计概要（How）
//! - `confbuf` 模块实现分块缓冲 [`ConfBuf`]：prepare/commit 写协议、prepare/consume 读协议、
//!   分块上限背压，以及面向解析器的逐字节视图 [`StreamAdapter`]；
//! - `channel` 模块实现 [`ConfigChannel`]：入站/出站两条缓冲、一个解析器钩子、一把锁，
//!   编排“写入 → 解析 → 读取”循环；
//! - `transfer` 模块以 [`ByteSource`]/[`ByteSink`] 抽象调用方的拷贝机制，`parser` 模块定义
//!   [`ConfigParser`] 钩子，命令语法本身不在本 crate 范围内。
//!
//! # 命名约定（Consistency）
//! - 错误码沿用 `spark.<域>.<语义>` 格式，见 [`error::codes`]；
//! - 日志 target 统一为 `spark_control::channel` 与 `spark_control::confbuf`。

mod channel;
mod confbuf;
mod config;
pub mod error;
mod parser;
mod sync;
mod transfer;

pub use channel::{ChannelPhase, ChannelStats, ConfigChannel};
pub use confbuf::{ConfBuf, ConfBufStats, ResponseWriter, StreamAdapter};
pub use config::{ChannelConfig, ConfBufConfig, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_CHUNKS};
pub use error::ControlError;
pub use parser::{ConfigParser, EchoParser, FnParser, NoopParser, from_fn};
pub use transfer::{ByteSink, ByteSource, ReaderSource, SliceSink, SliceSource, WriterSink};
