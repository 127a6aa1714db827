//! Single-producer/single-consumer byte ring.
//!
//! [`sample_ring`] hands out exactly one [`RingWriter`] and one [`RingReader`].
//! Neither half is `Clone`, so the one-writer/one-reader discipline is enforced
//! by ownership. Both halves are wait-free.

use crate::error::BridgeError;
use ringbuf::{
    HeapCons, HeapProd, HeapRb,
    traits::{Consumer, Observer, Producer, Split},
};

pub struct RingWriter {
    inner: HeapProd<u8>,
}

pub struct RingReader {
    inner: HeapCons<u8>,
}

/// Allocates a ring of `capacity` bytes.
pub fn sample_ring(capacity: usize) -> Result<(RingWriter, RingReader), BridgeError> {
    if capacity == 0 {
        return Err(BridgeError::RingAllocation { bytes: 0 });
    }
    let rb = HeapRb::<u8>::try_new(capacity)
        .map_err(|_| BridgeError::RingAllocation { bytes: capacity })?;
    let (inner_w, inner_r) = rb.split();
    Ok((RingWriter { inner: inner_w }, RingReader { inner: inner_r }))
}

impl RingWriter {
    pub fn capacity(&self) -> usize {
        self.inner.capacity().get()
    }

    pub fn write_space(&self) -> usize {
        self.inner.vacant_len()
    }

    /// Copies as much of `src` as fits and returns the number of bytes taken.
    pub fn write(&mut self, src: &[u8]) -> usize {
        self.inner.push_slice(src)
    }
}

impl RingReader {
    pub fn capacity(&self) -> usize {
        self.inner.capacity().get()
    }

    pub fn read_space(&self) -> usize {
        self.inner.occupied_len()
    }

    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        self.inner.pop_slice(dst)
    }
}

impl std::fmt::Debug for RingWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingWriter")
            .field("capacity", &self.capacity())
            .field("write_space", &self.write_space())
            .finish()
    }
}

impl std::fmt::Debug for RingReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingReader")
            .field("capacity", &self.capacity())
            .field("read_space", &self.read_space())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(7).wrapping_add(seed)).collect()
    }

    #[test]
    fn full_and_empty_accounting() {
        let (mut writer, mut reader) = sample_ring(64).unwrap();
        assert_eq!(writer.write_space(), 64);
        assert_eq!(reader.read_space(), 0);

        assert_eq!(writer.write(&pattern(64, 1)), 64);
        assert_eq!(writer.write_space(), 0);
        assert_eq!(reader.read_space(), 64);
        assert_eq!(writer.write(&[1, 2, 3]), 0);

        let mut out = vec![0_u8; 64];
        assert_eq!(reader.read(&mut out), 64);
        assert_eq!(out, pattern(64, 1));
        assert_eq!(writer.write_space(), 64);
        assert_eq!(reader.read_space(), 0);
    }

    #[test]
    fn both_halves_report_requested_capacity() {
        let (writer, reader) = sample_ring(4096).unwrap();
        assert_eq!(writer.capacity(), 4096);
        assert_eq!(reader.capacity(), 4096);
        assert_eq!(writer.write_space(), 4096);
    }

    #[test]
    fn space_always_sums_to_capacity() {
        let (mut writer, mut reader) = sample_ring(40).unwrap();
        let mut out = vec![0_u8; 40];
        for step in 0..50 {
            writer.write(&pattern(13, step));
            assert_eq!(writer.write_space() + reader.read_space(), 40);
            reader.read(&mut out[..9]);
            assert_eq!(writer.write_space() + reader.read_space(), 40);
        }
    }

    #[test]
    fn straddling_the_wrap_point_keeps_bytes_in_order() {
        let (mut writer, mut reader) = sample_ring(48).unwrap();
        let mut expected = Vec::new();
        let mut received = Vec::new();
        let mut scratch = vec![0_u8; 48];
        for round in 0..40_u8 {
            let chunk = pattern(5 + (round as usize * 11) % 37, round);
            let written = writer.write(&chunk);
            expected.extend_from_slice(&chunk[..written]);
            let want = 3 + (round as usize * 17) % 41;
            let got = reader.read(&mut scratch[..want]);
            received.extend_from_slice(&scratch[..got]);
        }
        let got = reader.read(&mut scratch);
        received.extend_from_slice(&scratch[..got]);
        assert_eq!(received, expected);
    }

    #[test]
    fn partial_operations_are_clamped() {
        let (mut writer, mut reader) = sample_ring(10).unwrap();
        assert_eq!(writer.write(&pattern(16, 0)), 10);
        let mut out = [0_u8; 4];
        assert_eq!(reader.read(&mut out), 4);
        assert_eq!(out, pattern(4, 0)[..]);
        assert_eq!(writer.write(&pattern(8, 3)), 4);
        let mut rest = [0_u8; 32];
        assert_eq!(reader.read(&mut rest), 10);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(
            sample_ring(0),
            Err(BridgeError::RingAllocation { bytes: 0 })
        ));
    }

    #[test]
    fn halves_move_across_threads() {
        let (mut writer, mut reader) = sample_ring(256).unwrap();
        let total = 64 * 1024;
        let data = pattern(total, 5);
        let src = data.clone();
        let producer = std::thread::spawn(move || {
            let mut sent = 0;
            while sent < total {
                let end = (sent + 96).min(total);
                sent += writer.write(&src[sent..end]);
                std::hint::spin_loop();
            }
        });
        let mut received = Vec::with_capacity(total);
        let mut buf = [0_u8; 80];
        while received.len() < total {
            let n = reader.read(&mut buf);
            received.extend_from_slice(&buf[..n]);
            std::hint::spin_loop();
        }
        producer.join().unwrap();
        assert_eq!(received, data);
    }
}
