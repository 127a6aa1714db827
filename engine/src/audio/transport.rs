use super::frame::ring_capacity;
use super::ring::{RingReader, RingWriter, sample_ring};
use crate::error::BridgeError;

#[derive(Debug)]
pub struct GraphEnds {
    pub playback: RingWriter,
    pub capture: RingReader,
    pub monitor: RingReader,
}

#[derive(Debug)]
pub struct StreamEnds {
    pub playback: RingReader,
    pub capture: RingWriter,
    pub monitor: RingWriter,
}

/// Allocates all three rings sized for `period_frames`.
pub fn allocate(period_frames: usize) -> Result<(GraphEnds, StreamEnds), BridgeError> {
    let bytes = ring_capacity(period_frames);
    let (playback_w, playback_r) = sample_ring(bytes)?;
    let (capture_w, capture_r) = sample_ring(bytes)?;
    let (monitor_w, monitor_r) = sample_ring(bytes)?;
    Ok((
        GraphEnds {
            playback: playback_w,
            capture: capture_r,
            monitor: monitor_r,
        },
        StreamEnds {
            playback: playback_r,
            capture: capture_w,
            monitor: monitor_w,
        },
    ))
}

impl GraphEnds {
    pub fn capacity(&self) -> usize {
        self.playback.capacity()
    }
}

impl StreamEnds {
    pub fn capacity(&self) -> usize {
        self.playback.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::frame::FRAME_BYTES;

    #[test]
    fn ends_are_paired_per_direction() {
        let (mut graph, mut stream) = allocate(4).unwrap();
        assert_eq!(graph.capacity(), 4 * FRAME_BYTES * 2);
        assert_eq!(stream.capacity(), graph.capacity());

        graph.playback.write(&[1, 2, 3, 4]);
        let mut out = [0_u8; 4];
        assert_eq!(stream.playback.read(&mut out), 4);
        assert_eq!(out, [1, 2, 3, 4]);

        stream.capture.write(&[5; 8]);
        stream.monitor.write(&[6; 16]);
        assert_eq!(graph.capture.read_space(), 8);
        assert_eq!(graph.monitor.read_space(), 16);
    }

    #[test]
    fn empty_period_cannot_be_allocated() {
        assert!(allocate(0).is_err());
    }
}
