// Runs inside the process callback: no allocation, no blocking, no logging.

use crate::audio::frame::{interleave, period_bytes};
use crate::audio::ring::RingReader;
use crate::audio::transport::GraphEnds;
use crate::diagnostics::{Diagnostics, Direction, Xrun};
use std::sync::Arc;

#[derive(Debug)]
pub struct PeriodIo {
    ends: GraphEnds,
    period_frames: usize,
    scratch: Vec<u8>,
    diagnostics: Arc<Diagnostics>,
}

impl PeriodIo {
    pub fn new(ends: GraphEnds, period_frames: usize, diagnostics: Arc<Diagnostics>) -> Self {
        Self {
            ends,
            period_frames,
            scratch: vec![0; period_bytes(period_frames)],
            diagnostics,
        }
    }

    pub fn period_frames(&self) -> usize {
        self.period_frames
    }

    pub fn ring_capacity(&self) -> usize {
        self.ends.capacity()
    }

    /// Swaps in freshly allocated rings for a new period size. The old rings,
    /// and whatever they still held, are dropped.
    pub fn replace_ends(&mut self, ends: GraphEnds, period_frames: usize) {
        self.ends = ends;
        self.period_frames = period_frames;
        self.scratch.clear();
        self.scratch.resize(period_bytes(period_frames), 0);
    }

    /// Interleaves one period of `inputs` into the playback ring. The period is
    /// written whole or not at all; on a short ring it is dropped and an
    /// overflow is reported.
    pub fn push_playback(&mut self, inputs: &[&[f32]], frames: usize) -> bool {
        let required = period_bytes(frames);
        let available = self.ends.playback.write_space();
        if available < required || required > self.scratch.len() {
            self.diagnostics.record(Xrun::Overflow {
                direction: Direction::Playback,
                available,
                required,
            });
            return false;
        }
        let bytes = &mut self.scratch[..required];
        interleave(inputs, frames, bytes);
        self.ends.playback.write(bytes);
        true
    }

    /// Takes one period of interleaved capture data out of its ring. `None`
    /// means an underflow was recorded and nothing was consumed.
    pub fn pull_capture(&mut self, frames: usize) -> Option<&[u8]> {
        pull_period(
            &mut self.ends.capture,
            &mut self.scratch,
            &self.diagnostics,
            Direction::Capture,
            frames,
        )
    }

    pub fn pull_monitor(&mut self, frames: usize) -> Option<&[u8]> {
        pull_period(
            &mut self.ends.monitor,
            &mut self.scratch,
            &self.diagnostics,
            Direction::Monitor,
            frames,
        )
    }
}

fn pull_period<'a>(
    reader: &mut RingReader,
    scratch: &'a mut [u8],
    diagnostics: &Diagnostics,
    direction: Direction,
    frames: usize,
) -> Option<&'a [u8]> {
    let required = period_bytes(frames);
    let available = reader.read_space();
    if available < required || required > scratch.len() {
        diagnostics.record(Xrun::Underflow {
            direction,
            available,
            required,
        });
        return None;
    }
    let bytes = &mut scratch[..required];
    reader.read(bytes);
    Some(bytes)
}
