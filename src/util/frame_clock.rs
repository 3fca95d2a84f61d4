use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClockSource {
    /// Wall-clock time between ticks.
    Real,
    /// Every tick advances by the same step, for reproducible runs.
    Fixed(Duration),
}

/// Produces the per-frame elapsed time fed into `Renderer::advance_frame`.
pub struct FrameClock {
    source: ClockSource,
    last_tick: Instant,
    dt: f32,
    total: f32,
    frame_index: u64,
    fps_window: f32,
    fps_accumulator: f32,
    fps_frames: u32,
    display_fps: f32,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new(ClockSource::Real)
    }
}

impl FrameClock {
    pub fn new(source: ClockSource) -> Self {
        Self {
            source,
            last_tick: Instant::now(),
            dt: 0.0,
            total: 0.0,
            frame_index: 0,
            fps_window: 0.5,
            fps_accumulator: 0.0,
            fps_frames: 0,
            display_fps: 0.0,
        }
    }

    /// Advances to the next frame and returns its delta time in seconds.
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        self.dt = match self.source {
            ClockSource::Real => (now - self.last_tick).as_secs_f32(),
            ClockSource::Fixed(step) => step.as_secs_f32(),
        };
        self.last_tick = now;
        self.total += self.dt;
        self.frame_index += 1;

        self.fps_accumulator += self.dt;
        self.fps_frames += 1;
        if self.fps_accumulator >= self.fps_window {
            self.display_fps = self.fps_frames as f32 / self.fps_accumulator;
            self.fps_accumulator = 0.0;
            self.fps_frames = 0;
        }
        self.dt
    }

    pub fn delta_time(&self) -> f32 {
        self.dt
    }

    pub fn total_time(&self) -> f32 {
        self.total
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Frames per second averaged over the last half second.
    pub fn display_fps(&self) -> f32 {
        self.display_fps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_is_deterministic() {
        let mut clock = FrameClock::new(ClockSource::Fixed(Duration::from_millis(100)));
        for _ in 0..10 {
            assert!((clock.tick() - 0.1).abs() < 1e-6);
        }
        assert_eq!(clock.frame_index(), 10);
        assert!((clock.total_time() - 1.0).abs() < 1e-5);
        assert!((clock.display_fps() - 10.0).abs() < 1e-3);
    }
}
