pub const CHANNELS: usize = 2;
pub const SAMPLE_BYTES: usize = std::mem::size_of::<f32>();
pub const FRAME_BYTES: usize = CHANNELS * SAMPLE_BYTES;
/// Periods of slack each ring holds.
pub const RING_FRAGMENTS: usize = 2;

pub fn period_bytes(period_frames: usize) -> usize {
    period_frames * FRAME_BYTES
}

pub fn ring_capacity(period_frames: usize) -> usize {
    period_bytes(period_frames) * RING_FRAGMENTS
}

/// Rounds a byte count down to whole frames.
pub fn whole_frames(bytes: usize) -> usize {
    bytes - bytes % FRAME_BYTES
}

pub fn frames_to_ms(frames: usize, sample_rate: usize) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }
    1000.0 * frames as f64 / sample_rate as f64
}

/// Writes `frames` interleaved frames into `dst`, pulling each sample from
/// `channels[ch][frame]`. Missing channels or short slices produce silence.
pub fn interleave(channels: &[&[f32]], frames: usize, dst: &mut [u8]) {
    for frame in 0..frames {
        for ch in 0..CHANNELS {
            let sample = channels
                .get(ch)
                .and_then(|samples| samples.get(frame))
                .copied()
                .unwrap_or(0.0);
            let o = (frame * CHANNELS + ch) * SAMPLE_BYTES;
            if let Some(slot) = dst.get_mut(o..o + SAMPLE_BYTES) {
                slot.copy_from_slice(&sample.to_ne_bytes());
            }
        }
    }
}

/// Extracts channel `ch` of the interleaved frames in `src` into `dst`.
pub fn deinterleave_channel(src: &[u8], ch: usize, dst: &mut [f32]) {
    let frames = (src.len() / FRAME_BYTES).min(dst.len());
    for (frame, sample) in dst.iter_mut().enumerate().take(frames) {
        let o = (frame * CHANNELS + ch) * SAMPLE_BYTES;
        *sample = f32::from_ne_bytes([src[o], src[o + 1], src[o + 2], src[o + 3]]);
    }
}
