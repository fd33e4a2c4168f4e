//! 配置解析器的接入点。
//!
//! # 模块定位（Why）
//! - 通道本身只负责搬运字节，配置语言的语法与语义由外部解析器实现；
//! - 解析器在通道锁内被调用，从入站流逐字节读取，经 [`ResponseWriter`] 向出站缓冲追加响应；
//!   写入端不暴露读取、消费与复位，解析器无法篡改尚未交付的响应。
//!
//! # 契约说明（What）
//! - 解析器只消费它已经处理完的字节；遇到不完整的输入应停止并保留剩余字节，
//!   等待后续写入补齐；
//! - 在没有新输入的情况下再次调用必须是无副作用的（幂等），因为 `read_from` 与 `destroy`
//!   每次都会触发一次解析；
//! - 解析器返回的错误由调用路径决定去向：`read_from` 原样返回，`destroy` 只记录日志。

use crate::{
    confbuf::{ResponseWriter, StreamAdapter},
    error::ControlError,
};

/// 配置解析器。
pub trait ConfigParser: Send {
    /// 消费 `input` 中可处理的字节，并把响应写入 `output`。
    fn parse(
        &mut self,
        input: &mut StreamAdapter<'_>,
        output: &mut ResponseWriter<'_>,
    ) -> Result<(), ControlError>;
}

impl<P> ConfigParser for Box<P>
where
    P: ConfigParser + ?Sized,
{
    fn parse(
        &mut self,
        input: &mut StreamAdapter<'_>,
        output: &mut ResponseWriter<'_>,
    ) -> Result<(), ControlError> {
        (**self).parse(input, output)
    }
}

/// 不消费任何输入、不产出任何响应的解析器。
///
/// 通道未接入真实解析器时使用；此时读取只会得到空数据，写入的字节留在入站缓冲直至背压。
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopParser;

impl ConfigParser for NoopParser {
    fn parse(
        &mut self,
        _: &mut StreamAdapter<'_>,
        _: &mut ResponseWriter<'_>,
    ) -> Result<(), ControlError> {
        Ok(())
    }
}

/// 以闭包实现的解析器，便于测试与轻量集成。
#[derive(Clone, Debug)]
pub struct FnParser<F> {
    f: F,
}

/// 将闭包包装为 [`ConfigParser`]。
pub fn from_fn<F>(f: F) -> FnParser<F>
where
    F: FnMut(&mut StreamAdapter<'_>, &mut ResponseWriter<'_>) -> Result<(), ControlError> + Send,
{
    FnParser { f }
}

impl<F> ConfigParser for FnParser<F>
where
    F: FnMut(&mut StreamAdapter<'_>, &mut ResponseWriter<'_>) -> Result<(), ControlError> + Send,
{
    fn parse(
        &mut self,
        input: &mut StreamAdapter<'_>,
        output: &mut ResponseWriter<'_>,
    ) -> Result<(), ControlError> {
        (self.f)(input, output)
    }
}

/// 回显解析器：把入站字节原样搬到出站缓冲。
///
/// # 教案式说明
/// - **意图 (Why)**：作为通道自检与基准测试的参考实现，同时示范解析器如何与背压协作；
/// - **逻辑 (How)**：先 `peek`，再在出站缓冲准备 1 字节空间并提交，最后才 `consume`，
///   因而出站缓冲满时入站字节不会丢失；
/// - **契约 (What)**：出站背压时停止本轮解析并返回 `Ok(())`，剩余字节留待下一次读取后继续。
#[derive(Clone, Copy, Debug, Default)]
pub struct EchoParser;

impl ConfigParser for EchoParser {
    fn parse(
        &mut self,
        input: &mut StreamAdapter<'_>,
        output: &mut ResponseWriter<'_>,
    ) -> Result<(), ControlError> {
        while let Some(byte) = input.peek() {
            let slot = match output.prepare_write(1, true) {
                Ok(slot) => slot,
                Err(err) if err.is_retryable() => return Ok(()),
                Err(err) => return Err(err),
            };
            slot[0] = byte;
            output.commit_write(1)?;
            input.consume()?;
        }
        Ok(())
    }
}
