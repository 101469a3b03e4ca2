// 코덱 펌프 - dequeue input / dequeue output 반복 (EOS까지)
// 비디오 합성과 오디오 트랜스코딩이 같은 루프를 공유

use crate::error::{EngineError, EngineResult};
use log::{debug, warn};
use std::time::Duration;

/// 출력 버퍼 폴링 결과
#[derive(Debug)]
pub enum Dequeue<T> {
    /// 출력 버퍼 준비됨
    Ready(T),
    /// 지금은 버퍼 없음 (에러 아님, 다음 반복에서 재시도)
    TryAgainLater,
    /// 코덱이 EOS 플래그가 붙은 마지막 버퍼까지 내보냄
    EndOfStream,
}

/// 순차 코덱 자원 (디코더/인코더)
/// 입력과 출력은 반드시 이 프로토콜로만 주고받음
pub trait CodecPort {
    type Input;
    type Output;

    /// 입력 슬롯 획득 (bounded wait). false = 아직 슬롯 없음, 재시도 신호
    fn acquire_input(&mut self, wait: Duration) -> EngineResult<bool>;

    /// 획득한 슬롯에 입력 제출
    fn queue_input(&mut self, input: Self::Input) -> EngineResult<()>;

    /// 획득한 슬롯에 EOS 마커 제출 (이후 입력 금지)
    fn queue_end_of_stream(&mut self) -> EngineResult<()>;

    /// 출력 버퍼 폴링 (bounded wait)
    fn dequeue_output(&mut self, wait: Duration) -> EngineResult<Dequeue<Self::Output>>;
}

/// 생산자 한 스텝의 결과
#[derive(Debug)]
pub enum Produce<T> {
    /// 제출할 입력
    Item(T),
    /// 이번 입력은 건너뜀 (연속 실패 카운트 증가)
    Skip,
    /// 더 이상 입력 없음 → EOS 제출
    EndOfStream,
}

/// 펌프 대기/실패 정책
#[derive(Debug, Clone, Copy)]
pub struct PumpConfig {
    pub input_wait: Duration,
    pub output_wait: Duration,
    /// 연속 Skip 허용 상한 (도달 시 TooManyFrameFailures)
    pub max_consecutive_skips: u32,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            input_wait: Duration::from_millis(10),
            output_wait: Duration::from_millis(1),
            max_consecutive_skips: 5,
        }
    }
}

/// 펌프 통계
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PumpStats {
    pub submitted: u64,
    pub skipped: u64,
    pub emitted: u64,
}

/// 코덱 펌프 실행
/// - 입력 측: 슬롯이 있으면 producer 한 스텝 → 제출 / 스킵 / EOS
/// - 출력 측: 준비된 버퍼를 consumer로 전달, EOS 버퍼에서 정상 종료
/// - TryAgainLater는 어느 쪽이든 에러가 아님
pub fn pump<C, P, S>(
    codec: &mut C,
    config: &PumpConfig,
    mut producer: P,
    mut consumer: S,
) -> EngineResult<PumpStats>
where
    C: CodecPort,
    P: FnMut() -> EngineResult<Produce<C::Input>>,
    S: FnMut(C::Output) -> EngineResult<()>,
{
    let mut stats = PumpStats::default();
    let mut input_done = false;
    let mut consecutive_skips = 0u32;

    loop {
        if !input_done && codec.acquire_input(config.input_wait)? {
            match producer()? {
                Produce::Item(item) => {
                    codec.queue_input(item)?;
                    stats.submitted += 1;
                    consecutive_skips = 0;
                }
                Produce::Skip => {
                    stats.skipped += 1;
                    consecutive_skips += 1;
                    warn!("Input skipped ({} in a row)", consecutive_skips);
                    if consecutive_skips >= config.max_consecutive_skips {
                        return Err(EngineError::TooManyFrameFailures {
                            consecutive: consecutive_skips,
                        });
                    }
                }
                Produce::EndOfStream => {
                    codec.queue_end_of_stream()?;
                    input_done = true;
                    debug!("EOS queued after {} inputs", stats.submitted);
                }
            }
        }

        match codec.dequeue_output(config.output_wait)? {
            Dequeue::Ready(output) => {
                consumer(output)?;
                stats.emitted += 1;
            }
            Dequeue::TryAgainLater => {}
            Dequeue::EndOfStream => break,
        }
    }

    Ok(stats)
}

/// 남은 출력을 EOS까지 비움 (입력 측은 이미 EOS 제출된 코덱용)
pub fn drain<C, S>(codec: &mut C, config: &PumpConfig, consumer: S) -> EngineResult<PumpStats>
where
    C: CodecPort,
    S: FnMut(C::Output) -> EngineResult<()>,
{
    pump(codec, config, || Ok(Produce::EndOfStream), consumer)
}

/// 다른 코덱 출력을 이 코덱에 밀어넣기 (디코더 → 인코더 연결용)
/// 입력 슬롯이 없으면 출력을 먼저 비우고 재시도, 제출 후 준비된 출력도 전달
pub fn feed<C, S>(codec: &mut C, config: &PumpConfig, input: C::Input, mut consumer: S) -> EngineResult<()>
where
    C: CodecPort,
    S: FnMut(C::Output) -> EngineResult<()>,
{
    while !codec.acquire_input(config.input_wait)? {
        match codec.dequeue_output(config.output_wait)? {
            Dequeue::Ready(output) => consumer(output)?,
            Dequeue::TryAgainLater => {}
            Dequeue::EndOfStream => return Err(EngineError::codec("codec ended before input was accepted")),
        }
    }
    codec.queue_input(input)?;

    loop {
        match codec.dequeue_output(Duration::ZERO)? {
            Dequeue::Ready(output) => consumer(output)?,
            Dequeue::TryAgainLater => return Ok(()),
            Dequeue::EndOfStream => return Err(EngineError::codec("codec ended before end of stream was queued")),
        }
    }
}
