use crate::audio::frame::{RING_FRAGMENTS, frames_to_ms, period_bytes};
use crate::audio::transport::{self, StreamEnds};
use crate::error::BridgeError;
use crate::period::PeriodIo;
use tracing::info;

/// Let the server pick this attribute.
pub const SERVER_DEFAULT: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamRole {
    Playback,
    Record,
    Monitor,
}

impl StreamRole {
    pub const ALL: [StreamRole; 3] = [StreamRole::Playback, StreamRole::Record, StreamRole::Monitor];

    pub fn label(self) -> &'static str {
        match self {
            StreamRole::Playback => "playback",
            StreamRole::Record => "record",
            StreamRole::Monitor => "monitor",
        }
    }

    pub fn stream_name(self) -> &'static str {
        match self {
            StreamRole::Playback => "JACK playback",
            StreamRole::Record => "JACK record",
            StreamRole::Monitor => "JACK monitor",
        }
    }

    pub fn is_record(self) -> bool {
        !matches!(self, StreamRole::Playback)
    }
}

/// Negotiated PulseAudio buffer metrics, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferAttributes {
    pub max_length: u32,
    pub target_length: u32,
    pub prebuf: u32,
    pub min_request: u32,
    pub fragment_size: u32,
}

impl BufferAttributes {
    /// Playback asks for one JACK period of target latency; record and monitor
    /// ask for one period per fragment. Everything else is left to the server.
    pub fn for_role(role: StreamRole, period_frames: usize) -> Self {
        let period = period_len(period_frames);
        let (target_length, fragment_size) = if role.is_record() {
            (SERVER_DEFAULT, period)
        } else {
            (period, SERVER_DEFAULT)
        };
        Self {
            max_length: SERVER_DEFAULT,
            target_length,
            prebuf: SERVER_DEFAULT,
            min_request: SERVER_DEFAULT,
            fragment_size,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphParams {
    pub period_frames: usize,
    pub sample_rate: u32,
}

/// The streaming side as seen with its event loop locked.
pub trait LockedStreams {
    fn params(&self) -> GraphParams;
    fn set_params(&mut self, params: GraphParams);
    fn is_ready(&self, role: StreamRole) -> bool;
    fn apply_buffer_attributes(
        &mut self,
        role: StreamRole,
        attrs: &BufferAttributes,
    ) -> Result<(), BridgeError>;
    fn update_sample_rate(&mut self, role: StreamRole, rate: u32) -> Result<(), BridgeError>;
    fn replace_ends(&mut self, ends: StreamEnds);
}

/// Access to the streaming side under its event-loop lock.
pub trait StreamingControl: Send + Sync {
    type Locked: LockedStreams;

    /// Runs `f` with the event loop locked. The lock is released on every
    /// exit path of `f`, including unwinding.
    fn with_locked<R>(&self, f: impl FnOnce(&mut Self::Locked) -> R) -> R;
}

/// Applies a JACK block-size change.
///
/// Under the lock: recompute attributes for every ready stream, then replace
/// all three rings. Data queued before the change does not survive it.
pub fn change_block_size<C: StreamingControl>(
    control: &C,
    period: &mut PeriodIo,
    period_frames: usize,
) -> Result<(), BridgeError> {
    let sample_rate = control.with_locked(|streams| -> Result<u32, BridgeError> {
        let mut params = streams.params();
        params.period_frames = period_frames;
        streams.set_params(params);

        for role in StreamRole::ALL {
            if streams.is_ready(role) {
                streams.apply_buffer_attributes(role, &BufferAttributes::for_role(role, period_frames))?;
            }
        }

        let (graph_ends, stream_ends) = transport::allocate(period_frames)?;
        streams.replace_ends(stream_ends);
        period.replace_ends(graph_ends, period_frames);
        Ok(params.sample_rate)
    })?;

    let rate = sample_rate as usize;
    info!(
        "JACK buffer size is {} samples ({:.2} ms).",
        period_frames,
        frames_to_ms(period_frames, rate)
    );
    info!(
        "Bridge buffer size is {} samples ({:.2} ms).",
        period_frames * RING_FRAGMENTS,
        frames_to_ms(period_frames * RING_FRAGMENTS, rate)
    );
    info!(
        "PulseAudio buffer size is {} samples ({:.2} ms).",
        period_frames,
        frames_to_ms(period_frames, rate)
    );
    Ok(())
}

/// Applies a JACK sample-rate change. Ring capacity is in frames, so the
/// rings stay as they are.
pub fn change_sample_rate<C: StreamingControl>(control: &C, sample_rate: u32) -> Result<(), BridgeError> {
    control.with_locked(|streams| -> Result<(), BridgeError> {
        let mut params = streams.params();
        params.sample_rate = sample_rate;
        streams.set_params(params);
        for role in StreamRole::ALL {
            if streams.is_ready(role) {
                streams.update_sample_rate(role, sample_rate)?;
            }
        }
        Ok(())
    })?;
    info!("Sample rate is {} Hz.", sample_rate);
    Ok(())
}

/// Re-applies attributes after PulseAudio moved a stream to another device,
/// which resets whatever was negotiated. Called from the mainloop thread, so
/// the lock is already held.
pub fn stream_moved<L: LockedStreams>(streams: &mut L, role: StreamRole) -> Result<(), BridgeError> {
    if !streams.is_ready(role) {
        return Ok(());
    }
    let attrs = BufferAttributes::for_role(role, streams.params().period_frames);
    info!(
        "PulseAudio {} stream moved, requesting {} byte buffers again.",
        role.label(),
        if role.is_record() {
            attrs.fragment_size
        } else {
            attrs.target_length
        }
    );
    streams.apply_buffer_attributes(role, &attrs)
}

pub fn period_len(period_frames: usize) -> u32 {
    u32::try_from(period_bytes(period_frames)).unwrap_or(SERVER_DEFAULT)
}
