use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::model::DashboardResult;
use crate::ticker::{TickFlow, Ticker};

const STEP: u8 = 10;
// The indicator waits here until the real answer arrives.
const CAP: u8 = 90;

/// Progress shown while the backend trains; it only reflects elapsed time.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub struct SyntheticProgress {
    percent: u8,
}

impl SyntheticProgress {
    pub fn percent(&self) -> u8 {
        self.percent
    }

    pub fn tick(&mut self) {
        if self.percent < CAP {
            self.percent = (self.percent + STEP).min(CAP);
        }
    }

    pub fn complete(&mut self) {
        self.percent = 100;
    }

    pub fn fail(&mut self) {
        self.percent = 0;
    }

    pub fn stage_label(&self) -> &'static str {
        match self.percent {
            p if p < 30 => "Preparando datos...",
            p if p < 60 => "Entrenando modelo...",
            p if p < 90 => "Validando modelo...",
            p if p < 100 => "Finalizando...",
            _ => "Entrenamiento completado",
        }
    }
}

/// Receives progress updates, from the ticker thread while waiting.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, progress: SyntheticProgress);
}

impl<F> ProgressSink for F
where
    F: Fn(SyntheticProgress) + Send + Sync,
{
    fn on_progress(&self, progress: SyntheticProgress) {
        self(progress)
    }
}

/// Discards every update.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&self, _progress: SyntheticProgress) {}
}

/// Runs `work` while a ticker advances the synthetic progress every `period`.
/// Ends at 100 on success and back at 0 on failure.
pub fn run_with_progress<T, W>(
    period: Duration,
    sink: Arc<dyn ProgressSink>,
    work: W,
) -> DashboardResult<T>
where
    W: FnOnce() -> DashboardResult<T>,
{
    let progress = Arc::new(Mutex::new(SyntheticProgress::default()));
    sink.on_progress(SyntheticProgress::default());

    let ticker = {
        let progress = progress.clone();
        let sink = sink.clone();
        Ticker::spawn("training-progress", period, false, move || {
            let snapshot = match progress.lock() {
                Ok(mut p) => {
                    p.tick();
                    *p
                }
                Err(_) => return TickFlow::Stop,
            };
            sink.on_progress(snapshot);
            TickFlow::Continue
        })
    };
    let res = work();
    ticker.stop();

    let mut last = progress.lock().map(|p| *p).unwrap_or_default();
    match res {
        Ok(_) => last.complete(),
        Err(_) => last.fail(),
    }
    sink.on_progress(last);
    res
}
