//! `channel_contract` 集成测试：验证 `ConfigChannel` 的写入 → 解析 → 读取循环。
//!
//! # 测试目标（Why）
//! - 通道是设备层唯一接触的入口，生命周期、后写者胜、部分读取与销毁语义必须稳定；
//! - 使用计数解析器观察解析发生的次数，确认幂等与“销毁时恰好解析一次”。
//!
//! # 结构安排（How）
//! - 回显循环与部分读取；
//! - 解析幂等与销毁冲刷；
//! - 搬运失败与多线程写入。

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
};

use spark_control::{
    ByteSink, ByteSource, ChannelConfig, ChannelPhase, ConfBufConfig, ConfigChannel, ConfigParser,
    ControlError, EchoParser, ReaderSource, ResponseWriter, StreamAdapter, WriterSink, error::codes,
    from_fn,
};

fn tiny(max_chunks: usize) -> ChannelConfig {
    ChannelConfig::symmetric(ConfBufConfig::new(4, max_chunks))
}

/// 统计调用次数的解析器：读尽输入，输出 `ok:<字节数>\n`。
#[derive(Clone, Default)]
struct CountingParser {
    calls: Arc<AtomicUsize>,
}

impl ConfigParser for CountingParser {
    fn parse(
        &mut self,
        input: &mut StreamAdapter<'_>,
        output: &mut ResponseWriter<'_>,
    ) -> Result<(), ControlError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut seen = 0;
        while input.next_byte().is_some() {
            seen += 1;
        }
        if seen > 0 {
            output.put_slice(format!("ok:{seen}\n").as_bytes())?;
        }
        Ok(())
    }
}

#[test]
fn echo_cycle_returns_written_bytes() {
    let channel = ConfigChannel::with_parser(tiny(8), EchoParser).expect("合法配置");
    assert_eq!(channel.write(b"configure:x=1").expect("写入"), 13);

    let mut out = [0u8; 32];
    let n = channel.read(&mut out).expect("读取");
    assert_eq!(&out[..n], b"configure:x=1");
    assert_eq!(channel.phase(), ChannelPhase::Idle);

    let stats = channel.stats();
    assert_eq!(stats.inbound.chunk_count, 0, "入站已被解析器读尽");
    assert_eq!(stats.outbound.chunk_count, 0, "出站已被读取方读尽");
}

#[test]
fn partial_reads_keep_remaining_response() {
    let channel = ConfigChannel::with_parser(tiny(8), EchoParser).expect("合法配置");
    channel.write(b"abcdefghij").expect("写入");

    let mut collected = Vec::new();
    let mut chunk = [0u8; 3];
    loop {
        let n = channel.read(&mut chunk).expect("读取");
        if n == 0 {
            break;
        }
        collected.extend_from_slice(&chunk[..n]);
    }
    assert_eq!(collected, b"abcdefghij");
}

#[test]
fn multi_call_writes_form_one_stream() {
    let channel = ConfigChannel::with_parser(tiny(8), EchoParser).expect("合法配置");
    for piece in [&b"con"[..], b"fig", b"ure"] {
        channel.write(piece).expect("分段写入");
    }
    let mut out = [0u8; 16];
    let n = channel.read(&mut out).expect("读取");
    assert_eq!(&out[..n], b"configure");
}

#[test]
fn parse_is_idempotent_without_new_input() {
    let parser = CountingParser::default();
    let calls = Arc::clone(&parser.calls);
    let channel = ConfigChannel::with_parser(tiny(4), parser).expect("合法配置");
    channel.write(b"set").expect("写入");

    let mut first = [0u8; 16];
    let n = channel.read(&mut first).expect("首次读取");
    assert_eq!(&first[..n], b"ok:3\n");

    let mut second = [0u8; 16];
    assert_eq!(channel.read(&mut second).expect("无新输入的读取"), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 2, "每次读取都会触发解析");
    assert_eq!(channel.stats().parse_passes, 2);
}

#[test]
fn last_write_discards_previous_response() {
    let channel = ConfigChannel::with_parser(tiny(4), CountingParser::default()).expect("合法配置");
    channel.write(b"a").expect("写入");
    let mut partial = [0u8; 1];
    channel.read(&mut partial).expect("只读出 1 字节");

    channel.write(b"bc").expect("新命令");
    let mut out = [0u8; 16];
    let n = channel.read(&mut out).expect("读取");
    assert_eq!(&out[..n], b"ok:2\n");
}

#[test]
fn destroy_flushes_parser_exactly_once() {
    let parser = CountingParser::default();
    let calls = Arc::clone(&parser.calls);
    let channel = ConfigChannel::with_parser(tiny(4), parser).expect("合法配置");
    channel.write(b"pending").expect("写入但不读取");

    channel.destroy();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let stats = channel.stats();
    assert_eq!(stats.phase, ChannelPhase::Destroyed);
    assert_eq!(stats.inbound.chunk_count, 0);
    assert_eq!(stats.outbound.chunk_count, 0);

    drop(channel);
    assert_eq!(calls.load(Ordering::SeqCst), 1, "Drop 不会重复解析");
}

#[test]
fn drop_runs_final_parse_when_not_destroyed() {
    let parser = CountingParser::default();
    let calls = Arc::clone(&parser.calls);
    {
        let channel = ConfigChannel::with_parser(tiny(4), parser).expect("合法配置");
        channel.write(b"x").expect("写入");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn destroyed_channel_rejects_io() {
    let channel = ConfigChannel::new(tiny(4)).expect("合法配置");
    channel.destroy();
    let err = channel.write(b"late").expect_err("销毁后写入");
    assert_eq!(err.code(), codes::INVALID_STATE);
    let err = channel.read(&mut [0u8; 4]).expect_err("销毁后读取");
    assert_eq!(err.code(), codes::INVALID_STATE);
    let io_err: io::Error = err.into();
    assert_eq!(io_err.kind(), io::ErrorKind::InvalidInput);
}

#[test]
fn parser_errors_surface_from_read() {
    let channel = ConfigChannel::with_parser(
        tiny(4),
        from_fn(|_, _| Err(ControlError::invalid_state("unexpected token"))),
    )
    .expect("合法配置");
    channel.write(b"{").expect("写入");
    let err = channel.read(&mut [0u8; 4]).expect_err("解析失败");
    assert!(err.to_string().contains("unexpected token"));
    assert_eq!(channel.phase(), ChannelPhase::Idle, "失败后通道仍可用");
}

/// 第 `fail_at` 次拷贝失败的来源。
struct FlakySource {
    remaining: usize,
    copies: usize,
    fail_at: usize,
}

impl ByteSource for FlakySource {
    fn remaining(&self) -> usize {
        self.remaining
    }

    fn copy_to(&mut self, dst: &mut [u8]) -> io::Result<()> {
        self.copies += 1;
        if self.copies == self.fail_at {
            return Err(io::Error::other("bad address"));
        }
        dst.fill(b'#');
        self.remaining -= dst.len();
        Ok(())
    }
}

#[test]
fn transfer_failure_keeps_prior_commits() {
    let channel = ConfigChannel::with_parser(tiny(4), EchoParser).expect("合法配置");
    let mut source = FlakySource {
        remaining: 10,
        copies: 0,
        fail_at: 2,
    };
    let err = channel.write_into(&mut source).expect_err("第二段拷贝失败");
    assert_eq!(err.code(), codes::TRANSFER_FAILED);
    assert!(matches!(
        err,
        ControlError::TransferFailure { transferred: 4, .. }
    ));
    assert_eq!(channel.stats().inbound.readable_bytes, 4);

    let mut out = [0u8; 16];
    let n = channel.read(&mut out).expect("读取");
    assert_eq!(&out[..n], b"####");
}

/// 前 `budget` 字节可写，之后报错的目标。
struct BrokenSink {
    budget: usize,
    written: Vec<u8>,
}

impl ByteSink for BrokenSink {
    fn remaining(&self) -> usize {
        64
    }

    fn copy_from(&mut self, src: &[u8]) -> io::Result<()> {
        if self.written.len() + src.len() > self.budget {
            return Err(io::Error::other("sink closed"));
        }
        self.written.extend_from_slice(src);
        Ok(())
    }
}

#[test]
fn failed_read_copy_is_redelivered() {
    let channel = ConfigChannel::with_parser(tiny(4), EchoParser).expect("合法配置");
    channel.write(b"abcdefgh").expect("写入");
    let mut sink = BrokenSink {
        budget: 5,
        written: Vec::new(),
    };
    let err = channel.read_from(&mut sink).expect_err("第二块拷贝失败");
    assert!(matches!(
        err,
        ControlError::TransferFailure { transferred: 4, .. }
    ));
    assert_eq!(sink.written, b"abcd");

    let mut out = [0u8; 8];
    let n = channel.read(&mut out).expect("重新读取");
    assert_eq!(&out[..n], b"efgh");
}

#[test]
fn reader_and_writer_adapters_bridge_std_io() {
    let channel = ConfigChannel::with_parser(tiny(8), EchoParser).expect("合法配置");
    let payload = b"list ports\n";
    let mut source = ReaderSource::new(&payload[..], payload.len());
    channel.write_into(&mut source).expect("写入");
    assert_eq!(source.position(), payload.len());

    let mut sink = WriterSink::new(Vec::new(), 64);
    assert_eq!(channel.read_from(&mut sink).expect("读取"), payload.len());
    assert_eq!(sink.into_inner(), payload.to_vec());
}

#[test]
fn backpressure_surfaces_as_would_block() {
    let channel = ConfigChannel::new(tiny(1)).expect("合法配置");
    let err = channel.write(b"too long").expect_err("单块容量不足");
    assert!(matches!(
        err,
        ControlError::Backpressure {
            max_chunks: 1,
            committed: 4
        }
    ));
    let io_err: io::Error = err.into();
    assert_eq!(io_err.kind(), io::ErrorKind::WouldBlock);
}

#[test]
fn concurrent_writers_never_interleave_within_a_call() {
    let config = ChannelConfig::symmetric(ConfBufConfig::new(16, 64));
    let channel = Arc::new(ConfigChannel::with_parser(config, EchoParser).expect("合法配置"));
    let handles: Vec<_> = (b'a'..=b'd')
        .map(|tag| {
            let channel = Arc::clone(&channel);
            thread::spawn(move || {
                channel.write(&[tag; 8]).expect("容量充足");
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("写线程不应 panic");
    }

    let mut out = [0u8; 64];
    let n = channel.read(&mut out).expect("读取");
    assert_eq!(n, 32);
    for run in out[..n].chunks(8) {
        assert!(run.iter().all(|byte| *byte == run[0]), "单次写入必须连续");
    }
}
