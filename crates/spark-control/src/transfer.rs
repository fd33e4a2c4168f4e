//! 调用方搬运机制的抽象。
//!
//! # 模块定位（Why）
//! - 设备层把用户态 `write()`/`read()` 映射为“向缓冲拷入/从缓冲拷出”的动作，
//!   拷贝本身可能失败（例如用户指针非法）；
//! - 以 [`ByteSource`]/[`ByteSink`] 两个 trait 隔离这一机制，缓冲协议只关心“还剩多少、搬一段”。
//!
//! # 契约说明（What）
//! - `remaining()` 表示尚待搬运的字节数，类似 `uio_resid`；
//! - 每次搬运要么完整搬完给定区段，要么返回 `io::Error`；失败时实现不得推进自身游标，
//!   以便缓冲侧不提交/不消费该区段。

use std::io::{self, Read, Write};

/// 向缓冲提供字节的一方（用户写入）。
pub trait ByteSource {
    /// 尚未搬运的字节数。
    fn remaining(&self) -> usize;

    /// 将接下来的 `dst.len()` 个字节填入 `dst`。
    ///
    /// 调用方保证 `dst.len() <= remaining()`。
    fn copy_to(&mut self, dst: &mut [u8]) -> io::Result<()>;
}

/// 接收缓冲字节的一方（用户读取）。
pub trait ByteSink {
    /// 仍可接收的字节数。
    fn remaining(&self) -> usize;

    /// 接收 `src` 全部字节。
    ///
    /// 调用方保证 `src.len() <= remaining()`。
    fn copy_from(&mut self, src: &[u8]) -> io::Result<()>;
}

/// 以内存切片作为写入来源。
#[derive(Debug)]
pub struct SliceSource<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> SliceSource<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// 已搬运的字节数。
    pub fn position(&self) -> usize {
        self.position
    }
}

impl ByteSource for SliceSource<'_> {
    fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    fn copy_to(&mut self, dst: &mut [u8]) -> io::Result<()> {
        let end = self.position + dst.len();
        let src = self.data.get(self.position..end).ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "slice source exhausted")
        })?;
        dst.copy_from_slice(src);
        self.position = end;
        Ok(())
    }
}

/// 以内存切片作为读取目标。
#[derive(Debug)]
pub struct SliceSink<'a> {
    data: &'a mut [u8],
    written: usize,
}

impl<'a> SliceSink<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        Self { data, written: 0 }
    }

    /// 已写入的字节数。
    pub fn written(&self) -> usize {
        self.written
    }
}

impl ByteSink for SliceSink<'_> {
    fn remaining(&self) -> usize {
        self.data.len() - self.written
    }

    fn copy_from(&mut self, src: &[u8]) -> io::Result<()> {
        let end = self.written + src.len();
        let dst = self
            .data
            .get_mut(self.written..end)
            .ok_or_else(|| io::Error::new(io::ErrorKind::WriteZero, "slice sink is full"))?;
        dst.copy_from_slice(src);
        self.written = end;
        Ok(())
    }
}

/// 以 [`Read`] 作为写入来源，长度由调用方预先声明。
///
/// # 教案式说明
/// - **意图 (Why)**：模拟“剩余量已知、逐段拷贝”的用户态写入：设备层知道本次 `write()` 的长度，
///   但数据只能按需从底层读取；
/// - **契约 (What)**：
///   - `len` 为本次写入的总字节数；
///   - [`position`](Self::position) 只计入完整搬运成功的区段；底层读取提前 EOF 或报错时返回 `io::Error`，
///     游标保持不变，而该区段内已从底层读出的部分字节随失败一并丢弃（`Read` 无法回退）。
#[derive(Debug)]
pub struct ReaderSource<R> {
    reader: R,
    remaining: usize,
    position: usize,
}

impl<R: Read> ReaderSource<R> {
    pub fn new(reader: R, len: usize) -> Self {
        Self {
            reader,
            remaining: len,
            position: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read> ByteSource for ReaderSource<R> {
    fn remaining(&self) -> usize {
        self.remaining
    }

    fn copy_to(&mut self, dst: &mut [u8]) -> io::Result<()> {
        self.reader.read_exact(dst)?;
        self.remaining -= dst.len();
        self.position += dst.len();
        Ok(())
    }
}

/// 以 [`Write`] 作为读取目标，容量由调用方预先声明。
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: W,
    remaining: usize,
    written: usize,
}

impl<W: Write> WriterSink<W> {
    pub fn new(writer: W, capacity: usize) -> Self {
        Self {
            writer,
            remaining: capacity,
            written: 0,
        }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ByteSink for WriterSink<W> {
    fn remaining(&self) -> usize {
        self.remaining
    }

    fn copy_from(&mut self, src: &[u8]) -> io::Result<()> {
        self.writer.write_all(src)?;
        self.remaining -= src.len();
        self.written += src.len();
        Ok(())
    }
}
