use std::time::Instant;

/// Wall-clock timer for one statement or meta-command.
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    pub fn format(&self) -> String {
        format!("Time: {:.3} ms", self.elapsed_ms())
    }
}

/// Whether `\timing` is on.
#[derive(Debug, Default)]
pub struct TimingState {
    pub enabled: bool,
}

impl TimingState {
    pub fn toggle(&mut self) -> bool {
        self.enabled = !self.enabled;
        self.enabled
    }

    pub fn maybe_start(&self) -> Option<Timer> {
        self.enabled.then(Timer::start)
    }

    pub fn maybe_print(&self, timer: Option<Timer>) {
        if let Some(t) = timer {
            println!("{}", t.format());
        }
    }
}
