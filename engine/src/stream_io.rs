use crate::audio::frame::whole_frames;
use crate::audio::ring::{RingReader, RingWriter};
use crate::diagnostics::{Diagnostics, Direction, Xrun};

/// Fills `out` completely for a write-ready request.
///
/// Whole frames are taken from the playback ring; whatever the ring cannot
/// supply is zero-filled and reported as one underflow. Returns the number of
/// bytes that came from the ring.
pub fn fill_playback(reader: &mut RingReader, out: &mut [u8], diagnostics: &Diagnostics) -> usize {
    let available = reader.read_space();
    let wanted = out.len();
    let take = whole_frames(available.min(wanted));
    let got = reader.read(&mut out[..take]);
    if got < wanted {
        out[got..].fill(0);
        diagnostics.report(Xrun::Underflow {
            direction: Direction::Playback,
            available,
            required: wanted,
        });
    }
    got
}

/// One unit of data handed out by a record stream.
#[derive(Debug, PartialEq, Eq)]
pub enum Packet<'a> {
    /// Nothing buffered right now.
    Empty,
    /// Lost data of the given length; carries no payload.
    Hole(usize),
    Data(&'a [u8]),
}

pub trait PacketSource {
    type Error;

    fn readable_size(&self) -> usize;
    fn peek(&mut self) -> Result<Packet<'_>, Self::Error>;
    /// Drops the packet returned by the last `peek`.
    fn discard(&mut self) -> Result<(), Self::Error>;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainStats {
    pub packets: usize,
    pub bytes_written: usize,
    pub dropped: usize,
    pub holes: usize,
}

/// Moves every available packet from `source` into `writer`.
///
/// A packet that does not fit is discarded whole and reported as an overflow;
/// a hole is skipped and reported once.
pub fn drain_packets<S: PacketSource>(
    source: &mut S,
    writer: &mut RingWriter,
    direction: Direction,
    diagnostics: &Diagnostics,
) -> Result<DrainStats, S::Error> {
    let mut stats = DrainStats::default();
    while source.readable_size() > 0 {
        match source.peek()? {
            Packet::Empty => break,
            Packet::Hole(bytes) => {
                diagnostics.report(Xrun::Hole { direction, bytes });
                stats.holes += 1;
            }
            Packet::Data(data) => {
                let available = writer.write_space();
                if available >= data.len() {
                    stats.bytes_written += writer.write(data);
                } else {
                    diagnostics.report(Xrun::Overflow {
                        direction,
                        available,
                        required: data.len(),
                    });
                    stats.dropped += 1;
                }
            }
        }
        source.discard()?;
        stats.packets += 1;
    }
    Ok(stats)
}
