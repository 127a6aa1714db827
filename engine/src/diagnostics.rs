// Counters are plain atomics: the JACK process thread only ever calls
// `record`, the mainloop thread may `report` and log on the spot.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Playback,
    Capture,
    Monitor,
}

impl Direction {
    pub const ALL: [Direction; 3] = [Direction::Playback, Direction::Capture, Direction::Monitor];

    fn index(self) -> usize {
        match self {
            Direction::Playback => 0,
            Direction::Capture => 1,
            Direction::Monitor => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Direction::Playback => "Playback",
            Direction::Capture => "Record",
            Direction::Monitor => "Monitor",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Xrun {
    /// Producer outran the consumer: `required` bytes did not fit in `available`.
    Overflow {
        direction: Direction,
        available: usize,
        required: usize,
    },
    /// Consumer outran the producer: `required` bytes wanted, `available` present.
    Underflow {
        direction: Direction,
        available: usize,
        required: usize,
    },
    /// PulseAudio reported lost data. Counted as an overflow.
    Hole { direction: Direction, bytes: usize },
}

impl Xrun {
    pub fn direction(self) -> Direction {
        match self {
            Xrun::Overflow { direction, .. }
            | Xrun::Underflow { direction, .. }
            | Xrun::Hole { direction, .. } => direction,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub overflows: u64,
    pub underflows: u64,
    pub holes: u64,
}

impl Tally {
    fn since(self, earlier: Tally) -> Tally {
        Tally {
            overflows: self.overflows.saturating_sub(earlier.overflows),
            underflows: self.underflows.saturating_sub(earlier.underflows),
            holes: self.holes.saturating_sub(earlier.holes),
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Tally::default()
    }
}

#[derive(Debug, Default)]
struct Counters {
    overflows: AtomicU64,
    underflows: AtomicU64,
    holes: AtomicU64,
}

#[derive(Debug, Default)]
pub struct Diagnostics {
    counters: [Counters; 3],
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bumps the counter for `xrun` without logging.
    pub fn record(&self, xrun: Xrun) {
        let counters = &self.counters[xrun.direction().index()];
        match xrun {
            Xrun::Overflow { .. } => {
                counters.overflows.fetch_add(1, Ordering::Relaxed);
            }
            Xrun::Underflow { .. } => {
                counters.underflows.fetch_add(1, Ordering::Relaxed);
            }
            Xrun::Hole { .. } => {
                counters.overflows.fetch_add(1, Ordering::Relaxed);
                counters.holes.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Records `xrun` and logs it. Not for the JACK process thread.
    pub fn report(&self, xrun: Xrun) {
        self.record(xrun);
        match xrun {
            Xrun::Overflow {
                direction,
                available,
                required,
            } => warn!("{direction} buffer overflow: {available} < {required}"),
            Xrun::Underflow {
                direction,
                available,
                required,
            } => warn!("{direction} buffer underflow: {available} < {required}"),
            Xrun::Hole { direction, bytes } => {
                warn!("{direction} buffer overflow: {bytes} bytes hole")
            }
        }
    }

    pub fn tally(&self, direction: Direction) -> Tally {
        Tally {
            overflows: self.overflows(direction),
            underflows: self.underflows(direction),
            holes: self.holes(direction),
        }
    }

    /// Overflows reported for `direction`, holes included.
    pub fn overflows(&self, direction: Direction) -> u64 {
        self.counters[direction.index()]
            .overflows
            .load(Ordering::Relaxed)
    }

    pub fn underflows(&self, direction: Direction) -> u64 {
        self.counters[direction.index()]
            .underflows
            .load(Ordering::Relaxed)
    }

    pub fn holes(&self, direction: Direction) -> u64 {
        self.counters[direction.index()].holes.load(Ordering::Relaxed)
    }

    pub fn summary(&self) -> String {
        Direction::ALL
            .iter()
            .map(|&d| {
                format!(
                    "{}: {} overflows ({} holes), {} underflows",
                    d,
                    self.overflows(d),
                    self.holes(d),
                    self.underflows(d)
                )
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Turns counter growth into log lines from a non-realtime thread.
#[derive(Debug, Default)]
pub struct XrunReporter {
    last: [Tally; 3],
}

impl XrunReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directions whose counters moved since the previous call, with the deltas.
    pub fn poll(&mut self, diagnostics: &Diagnostics) -> Vec<(Direction, Tally)> {
        let mut moved = Vec::new();
        for direction in Direction::ALL {
            let now = diagnostics.tally(direction);
            let delta = now.since(self.last[direction.index()]);
            self.last[direction.index()] = now;
            if !delta.is_zero() {
                moved.push((direction, delta));
            }
        }
        moved
    }

    pub fn log(&mut self, diagnostics: &Diagnostics) {
        for (direction, delta) in self.poll(diagnostics) {
            warn!(
                "{direction}: {} overflows ({} holes), {} underflows",
                delta.overflows, delta.holes, delta.underflows
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_per_direction() {
        let diag = Diagnostics::new();
        diag.report(Xrun::Overflow {
            direction: Direction::Playback,
            available: 100,
            required: 2048,
        });
        diag.report(Xrun::Underflow {
            direction: Direction::Monitor,
            available: 0,
            required: 2048,
        });
        assert_eq!(diag.overflows(Direction::Playback), 1);
        assert_eq!(diag.overflows(Direction::Capture), 0);
        assert_eq!(diag.underflows(Direction::Monitor), 1);
        assert_eq!(diag.underflows(Direction::Playback), 0);
    }

    #[test]
    fn holes_count_as_overflows() {
        let diag = Diagnostics::new();
        diag.report(Xrun::Hole {
            direction: Direction::Capture,
            bytes: 512,
        });
        assert_eq!(diag.overflows(Direction::Capture), 1);
        assert_eq!(diag.holes(Direction::Capture), 1);
    }

    #[test]
    fn record_counts_like_report() {
        let diag = Diagnostics::new();
        diag.record(Xrun::Underflow {
            direction: Direction::Capture,
            available: 8,
            required: 2048,
        });
        diag.record(Xrun::Hole {
            direction: Direction::Monitor,
            bytes: 64,
        });
        assert_eq!(diag.underflows(Direction::Capture), 1);
        assert_eq!(diag.overflows(Direction::Monitor), 1);
        assert_eq!(diag.holes(Direction::Monitor), 1);
    }

    #[test]
    fn reporter_yields_only_new_xruns() {
        let diag = Diagnostics::new();
        let mut reporter = XrunReporter::new();
        assert!(reporter.poll(&diag).is_empty());

        for _ in 0..3 {
            diag.record(Xrun::Overflow {
                direction: Direction::Playback,
                available: 0,
                required: 2048,
            });
        }
        diag.record(Xrun::Underflow {
            direction: Direction::Monitor,
            available: 0,
            required: 2048,
        });
        assert_eq!(
            reporter.poll(&diag),
            vec![
                (
                    Direction::Playback,
                    Tally {
                        overflows: 3,
                        underflows: 0,
                        holes: 0,
                    }
                ),
                (
                    Direction::Monitor,
                    Tally {
                        overflows: 0,
                        underflows: 1,
                        holes: 0,
                    }
                ),
            ]
        );
        assert!(reporter.poll(&diag).is_empty());

        diag.record(Xrun::Overflow {
            direction: Direction::Playback,
            available: 0,
            required: 2048,
        });
        let again = reporter.poll(&diag);
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].1.overflows, 1);
    }

    #[test]
    fn summary_lists_every_direction() {
        let diag = Diagnostics::new();
        let summary = diag.summary();
        assert!(summary.starts_with("Playback: 0 overflows"));
        assert!(summary.contains("Record: "));
        assert!(summary.contains("Monitor: "));
    }
}
