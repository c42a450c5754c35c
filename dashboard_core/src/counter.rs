use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::ticker::{TickFlow, Ticker};

pub const DEFAULT_DURATION: Duration = Duration::from_millis(2000);
/// Roughly one display refresh.
pub const FRAME_PERIOD: Duration = Duration::from_millis(16);

pub fn ease_out_cubic(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t).powi(3)
}

/// Whether the counter wants another frame.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum FrameRequest {
    Next,
    Done,
}

#[derive(PartialEq, Debug, Clone, Copy)]
struct Tween {
    from: i64,
    to: i64,
    // Set by the first frame after the target changed.
    started_at: Option<Duration>,
}

/// A displayed integer that eases towards its target over a fixed duration.
///
/// Frames carry a timestamp, and the animation starts at the first frame it
/// sees. Every frame driver reads the same clock, [`AnimatedCounter::frame_now`],
/// so a tween stamped by one driver stays valid for the next.
#[derive(PartialEq, Debug, Clone)]
pub struct AnimatedCounter {
    displayed: i64,
    duration: Duration,
    tween: Option<Tween>,
    origin: Instant,
}

impl Default for AnimatedCounter {
    fn default() -> AnimatedCounter {
        AnimatedCounter::new(0, DEFAULT_DURATION)
    }
}

impl AnimatedCounter {
    pub fn new(initial: i64, duration: Duration) -> AnimatedCounter {
        AnimatedCounter {
            displayed: initial,
            duration,
            tween: None,
            origin: Instant::now(),
        }
    }

    /// Time since the counter was created, the timestamp for live frames.
    pub fn frame_now(&self) -> Duration {
        self.origin.elapsed()
    }

    pub fn value(&self) -> i64 {
        self.displayed
    }

    pub fn target(&self) -> i64 {
        self.tween.map(|t| t.to).unwrap_or(self.displayed)
    }

    pub fn is_animating(&self) -> bool {
        self.tween.is_some()
    }

    /// Starts a new animation from whatever is displayed right now.
    pub fn set_target(&mut self, target: i64) {
        if self.tween.is_none() && target == self.displayed {
            return;
        }
        self.tween = Some(Tween {
            from: self.displayed,
            to: target,
            started_at: None,
        });
    }

    pub fn on_frame(&mut self, now: Duration) -> FrameRequest {
        let tween = match self.tween.as_mut() {
            Some(t) => t,
            None => return FrameRequest::Done,
        };
        let start = *tween.started_at.get_or_insert(now);
        let elapsed = now.saturating_sub(start);
        if elapsed >= self.duration {
            self.displayed = tween.to;
            self.tween = None;
            return FrameRequest::Done;
        }
        let t = elapsed.as_secs_f64() / self.duration.as_secs_f64();
        let span = (tween.to - tween.from) as f64;
        self.displayed = (tween.from as f64 + span * ease_out_cubic(t)).floor() as i64;
        FrameRequest::Next
    }

    /// Freezes the counter on its current value.
    pub fn cancel(&mut self) {
        self.tween = None;
    }
}

/// Feeds frames to `counter` every `frame_period` until it reaches its target,
/// reporting each displayed value. Dropping the returned ticker stops the frames.
pub fn animate<C>(counter: Arc<Mutex<AnimatedCounter>>, frame_period: Duration, mut on_value: C) -> Ticker
where
    C: FnMut(i64) + Send + 'static,
{
    Ticker::spawn("counter-frames", frame_period, true, move || {
        let (request, value) = match counter.lock() {
            Ok(mut c) => {
                let now = c.frame_now();
                (c.on_frame(now), c.value())
            }
            Err(_) => return TickFlow::Stop,
        };
        on_value(value);
        match request {
            FrameRequest::Next => TickFlow::Continue,
            FrameRequest::Done => TickFlow::Stop,
        }
    })
}
