use std::time::{Duration, Instant};

/// Redraw rate used until a preferred rate is set.
pub const DEFAULT_FRAMES_PER_SECOND: u32 = 30;

/// Frame timing snapshot.
#[derive(Debug, Copy, Clone)]
pub struct FrameTime {
    /// Time elapsed since the previous tick, in seconds.
    pub dt: f32,

    /// Timestamp the tick was polled at.
    pub now: Instant,

    /// Monotonic tick counter.
    pub frame_index: u64,
}

/// Refresh timer that fires at a preferred rate and can be paused.
///
/// The link does not own a thread or a loop. The event loop asks
/// [`poll`](Self::poll) whether a frame is due and sleeps until
/// [`next_deadline`](Self::next_deadline) otherwise.
///
/// Ticks missed while the loop was busy or the link was paused are dropped,
/// never replayed. Delta time is clamped to keep consumers stable across
/// stalls.
#[derive(Debug, Clone)]
pub struct DisplayLink {
    preferred_fps: u32,
    paused: bool,
    next: Option<Instant>,
    last: Option<Instant>,
    frame_index: u64,
    dt_min: Duration,
    dt_max: Duration,
}

impl DisplayLink {
    /// Creates a running link ticking at `frames_per_second`.
    #[track_caller]
    pub fn new(frames_per_second: u32) -> Self {
        assert!(frames_per_second > 0, "frames per second must be positive");
        Self {
            preferred_fps: frames_per_second,
            paused: false,
            next: None,
            last: None,
            frame_index: 0,
            dt_min: Duration::from_micros(100),
            dt_max: Duration::from_millis(250),
        }
    }

    pub fn preferred_frames_per_second(&self) -> u32 {
        self.preferred_fps
    }

    /// Changes the rate; takes effect from the next tick.
    #[track_caller]
    pub fn set_preferred_frames_per_second(&mut self, frames_per_second: u32) {
        assert!(frames_per_second > 0, "frames per second must be positive");
        self.preferred_fps = frames_per_second;
        if let Some(last) = self.last {
            self.next = Some(last + self.frame_interval());
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Pauses or resumes ticking. Resuming starts a fresh baseline so the
    /// first tick after a pause neither fires a backlog nor reports the
    /// paused time as `dt`.
    pub fn set_paused(&mut self, paused: bool) {
        if self.paused == paused {
            return;
        }
        self.paused = paused;
        if !paused {
            self.next = None;
            self.last = None;
        }
        log::debug!("display link {}", if paused { "paused" } else { "resumed" });
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.preferred_fps
    }

    /// Returns the tick due at `now`, if any.
    ///
    /// `None` while paused or before the next deadline. After a tick the
    /// next deadline is one interval after `now`.
    pub fn poll(&mut self, now: Instant) -> Option<FrameTime> {
        if self.paused {
            return None;
        }
        if self.next.is_some_and(|next| now < next) {
            return None;
        }

        let dt = self
            .last
            .map_or(self.frame_interval(), |last| now.saturating_duration_since(last))
            .clamp(self.dt_min, self.dt_max);

        let frame = FrameTime {
            dt: dt.as_secs_f32(),
            now,
            frame_index: self.frame_index,
        };

        self.frame_index = self.frame_index.wrapping_add(1);
        self.last = Some(now);
        self.next = Some(now + self.frame_interval());
        Some(frame)
    }

    /// When the next tick is due; `None` while paused.
    ///
    /// A running link that has not ticked yet is due immediately.
    pub fn next_deadline(&self, now: Instant) -> Option<Instant> {
        if self.paused {
            return None;
        }
        Some(self.next.unwrap_or(now))
    }
}

impl Default for DisplayLink {
    fn default() -> Self {
        Self::new(DEFAULT_FRAMES_PER_SECOND)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rate_is_thirty() {
        let link = DisplayLink::default();
        assert_eq!(link.preferred_frames_per_second(), 30);
        assert!(!link.is_paused());
    }

    #[test]
    fn ticks_once_per_interval() {
        let mut link = DisplayLink::new(10);
        let t0 = Instant::now();

        let first = link.poll(t0).unwrap();
        assert_eq!(first.frame_index, 0);
        assert!(link.poll(t0 + Duration::from_millis(50)).is_none());

        let second = link.poll(t0 + Duration::from_millis(100)).unwrap();
        assert_eq!(second.frame_index, 1);
        assert!((second.dt - 0.1).abs() < 1e-6);
    }

    #[test]
    fn missed_ticks_are_not_replayed() {
        let mut link = DisplayLink::new(10);
        let t0 = Instant::now();
        link.poll(t0).unwrap();

        // A full second late: one tick, then the schedule restarts from now.
        let late = t0 + Duration::from_secs(1);
        let frame = link.poll(late).unwrap();
        assert_eq!(frame.frame_index, 1);
        assert!((frame.dt - 0.25).abs() < 1e-6);
        assert!(link.poll(late).is_none());
        assert_eq!(link.next_deadline(late), Some(late + Duration::from_millis(100)));
    }

    #[test]
    fn paused_link_never_ticks() {
        let mut link = DisplayLink::new(60);
        let t0 = Instant::now();
        link.poll(t0).unwrap();

        link.set_paused(true);
        assert!(link.next_deadline(t0).is_none());
        for ms in [20, 100, 1000] {
            assert!(link.poll(t0 + Duration::from_millis(ms)).is_none());
        }

        let resume = t0 + Duration::from_secs(5);
        link.set_paused(false);
        let frame = link.poll(resume).unwrap();
        assert_eq!(frame.frame_index, 1);
        assert!(frame.dt < 0.02);
    }

    #[test]
    fn rate_change_reschedules() {
        let mut link = DisplayLink::new(10);
        let t0 = Instant::now();
        link.poll(t0).unwrap();
        link.set_preferred_frames_per_second(20);
        assert_eq!(link.next_deadline(t0), Some(t0 + Duration::from_millis(50)));
    }

    #[test]
    #[should_panic(expected = "positive")]
    fn zero_rate_is_rejected() {
        DisplayLink::default().set_preferred_frames_per_second(0);
    }
}
