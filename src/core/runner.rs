use crate::domain::model::StageSetup;
use crate::domain::ports::{OutputStreams, Stage, TickSource};
use crate::utils::error::Result;
use std::marker::PhantomData;
use std::time::Instant;

/// 最簡單的 host：open → 依序處理每個 tick → close
pub struct StageRunner<S: Stage> {
    setup: StageSetup,
    _stage: PhantomData<S>,
}

impl<S: Stage> StageRunner<S> {
    pub fn new() -> Self {
        Self::with_setup(StageSetup::default())
    }

    pub fn with_setup(setup: StageSetup) -> Self {
        Self {
            setup,
            _stage: PhantomData,
        }
    }

    /// 任何錯誤都會先關閉 stage 再回傳，socket 一定會釋放
    pub async fn run<Src: TickSource>(
        &self,
        pending: S::Pending,
        source: &mut Src,
        outputs: &mut dyn OutputStreams,
    ) -> Result<S::Summary> {
        S::declare_contract(&pending)?;

        let mut stage = S::open(pending, &self.setup, outputs).await?;
        let started = Instant::now();
        let mut ticks = 0usize;

        loop {
            let tick = match source.next_tick().await {
                Ok(Some(tick)) => tick,
                Ok(None) => {
                    tracing::debug!("Tick source exhausted after {} ticks", ticks);
                    break;
                }
                Err(e) => {
                    tracing::error!("❌ Tick source failed after {} ticks: {}", ticks, e);
                    stage.close().await;
                    return Err(e);
                }
            };

            match stage.process(&tick, outputs).await {
                Ok(report) => {
                    ticks += 1;
                    if S::wants_stop(&report) {
                        tracing::info!("⏹️ Stage requested stop at tick {}", tick.timestamp);
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("❌ Tick {} failed: {}", tick.timestamp, e);
                    stage.close().await;
                    return Err(e);
                }
            }
        }

        tracing::info!("✅ Processed {} ticks in {:?}", ticks, started.elapsed());
        Ok(stage.close().await)
    }
}

impl<S: Stage> Default for StageRunner<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{CollectedOutputs, MemoryTickSource};
    use crate::domain::model::Tick;
    use crate::utils::error::RelayError;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<String>>>;

    /// 只記錄呼叫順序的 stage；log 共用，失敗時也看得到
    struct RecordingStage {
        log: Log,
        stop_at: Option<i64>,
    }

    impl RecordingStage {
        fn push(&self, entry: impl Into<String>) {
            self.log.lock().unwrap().push(entry.into());
        }
    }

    #[async_trait]
    impl Stage for RecordingStage {
        type Pending = (Log, Option<i64>);
        type Report = bool;
        type Summary = ();

        fn declare_contract(_pending: &(Log, Option<i64>)) -> Result<()> {
            Ok(())
        }

        async fn open(
            pending: (Log, Option<i64>),
            _setup: &StageSetup,
            _outputs: &mut dyn OutputStreams,
        ) -> Result<Self> {
            let (log, stop_at) = pending;
            let stage = Self { log, stop_at };
            stage.push("open");
            Ok(stage)
        }

        async fn process(
            &mut self,
            tick: &Tick,
            _outputs: &mut dyn OutputStreams,
        ) -> Result<bool> {
            if tick.timestamp < 0 {
                return Err(RelayError::TickShape {
                    timestamp: tick.timestamp,
                    expected: 0,
                    actual: tick.width(),
                });
            }
            self.push(format!("tick {}", tick.timestamp));
            Ok(self.stop_at == Some(tick.timestamp))
        }

        fn wants_stop(report: &bool) -> bool {
            *report
        }

        async fn close(self) {
            self.push("close");
        }
    }

    /// 送出幾個 tick 之後回報讀取失敗
    struct FailingSource {
        remaining: MemoryTickSource,
        line: usize,
    }

    #[async_trait]
    impl TickSource for FailingSource {
        async fn next_tick(&mut self) -> Result<Option<Tick>> {
            match self.remaining.next_tick().await? {
                Some(tick) => Ok(Some(tick)),
                None => Err(RelayError::ReplayError {
                    line: self.line,
                    message: "truncated line".to_string(),
                }),
            }
        }
    }

    fn ticks(timestamps: &[i64]) -> MemoryTickSource {
        MemoryTickSource::new(timestamps.iter().map(|t| Tick::empty(*t, 0)))
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_runs_every_tick_then_closes() {
        let log = Log::default();
        let mut outputs = CollectedOutputs::default();

        StageRunner::<RecordingStage>::new()
            .run((log.clone(), None), &mut ticks(&[1, 2, 3]), &mut outputs)
            .await
            .unwrap();

        assert_eq!(entries(&log), vec!["open", "tick 1", "tick 2", "tick 3", "close"]);
    }

    #[tokio::test]
    async fn test_stop_request_ends_run() {
        let log = Log::default();
        let mut outputs = CollectedOutputs::default();

        StageRunner::<RecordingStage>::new()
            .run((log.clone(), Some(2)), &mut ticks(&[1, 2, 3]), &mut outputs)
            .await
            .unwrap();

        assert_eq!(entries(&log), vec!["open", "tick 1", "tick 2", "close"]);
    }

    #[tokio::test]
    async fn test_tick_error_closes_stage() {
        let log = Log::default();
        let mut outputs = CollectedOutputs::default();

        let result = StageRunner::<RecordingStage>::new()
            .run((log.clone(), None), &mut ticks(&[1, -1, 2]), &mut outputs)
            .await;

        assert!(matches!(result, Err(RelayError::TickShape { .. })));
        assert_eq!(entries(&log), vec!["open", "tick 1", "close"]);
    }

    #[tokio::test]
    async fn test_source_error_closes_stage() {
        let log = Log::default();
        let mut outputs = CollectedOutputs::default();
        let mut source = FailingSource {
            remaining: ticks(&[1]),
            line: 2,
        };

        let result = StageRunner::<RecordingStage>::new()
            .run((log.clone(), None), &mut source, &mut outputs)
            .await;

        assert!(matches!(result, Err(RelayError::ReplayError { line: 2, .. })));
        assert_eq!(entries(&log), vec!["open", "tick 1", "close"]);
    }
}
