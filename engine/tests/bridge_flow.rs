#[cfg(test)]
mod tests {
    use pulsejack_engine::audio::frame::{
        FRAME_BYTES, deinterleave_channel, interleave, period_bytes, ring_capacity,
    };
    use pulsejack_engine::audio::transport::{self, StreamEnds};
    use pulsejack_engine::diagnostics::{Diagnostics, Direction};
    use pulsejack_engine::error::BridgeError;
    use pulsejack_engine::period::PeriodIo;
    use pulsejack_engine::reconfig::{
        BufferAttributes, GraphParams, LockedStreams, StreamRole, StreamingControl,
        change_block_size,
    };
    use pulsejack_engine::stream_io::{Packet, PacketSource, drain_packets, fill_playback};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    struct Streams {
        params: GraphParams,
        ends: StreamEnds,
        attrs: Vec<(StreamRole, BufferAttributes)>,
    }

    impl LockedStreams for Streams {
        fn params(&self) -> GraphParams {
            self.params
        }
        fn set_params(&mut self, params: GraphParams) {
            self.params = params;
        }
        fn is_ready(&self, _role: StreamRole) -> bool {
            true
        }
        fn apply_buffer_attributes(
            &mut self,
            role: StreamRole,
            attrs: &BufferAttributes,
        ) -> Result<(), BridgeError> {
            self.attrs.push((role, *attrs));
            Ok(())
        }
        fn update_sample_rate(&mut self, _role: StreamRole, _rate: u32) -> Result<(), BridgeError> {
            Ok(())
        }
        fn replace_ends(&mut self, ends: StreamEnds) {
            self.ends = ends;
        }
    }

    struct EventLoop(Mutex<Streams>);

    impl StreamingControl for EventLoop {
        type Locked = Streams;
        fn with_locked<R>(&self, f: impl FnOnce(&mut Streams) -> R) -> R {
            let mut guard = self.0.lock().unwrap();
            f(&mut guard)
        }
    }

    #[test]
    fn one_period_of_256_frames_reaches_pulse_unchanged() {
        let frames = 256;
        let diag = Arc::new(Diagnostics::new());
        let (graph, mut stream) = transport::allocate(frames).unwrap();
        let mut io = PeriodIo::new(graph, frames, diag.clone());

        let left: Vec<f32> = (0..frames).map(|i| i as f32 / frames as f32).collect();
        let right: Vec<f32> = (0..frames).map(|i| -(i as f32) / 7.0).collect();
        assert!(io.push_playback(&[&left, &right], frames));

        let mut expected = vec![0_u8; 2048];
        interleave(&[&left, &right], frames, &mut expected);

        let mut out = vec![0_u8; 2048];
        assert_eq!(fill_playback(&mut stream.playback, &mut out, &diag), 2048);
        assert_eq!(out, expected);
        assert_eq!(diag.underflows(Direction::Playback), 0);
        assert_eq!(diag.overflows(Direction::Playback), 0);
    }

    #[test]
    fn block_size_change_resets_rings_under_a_running_stream_thread() {
        let diag = Arc::new(Diagnostics::new());
        let (graph, stream) = transport::allocate(256).unwrap();
        let mut io = PeriodIo::new(graph, 256, diag.clone());
        let control = Arc::new(EventLoop(Mutex::new(Streams {
            params: GraphParams {
                period_frames: 256,
                sample_rate: 48_000,
            },
            ends: stream,
            attrs: Vec::new(),
        })));
        let stop = Arc::new(AtomicBool::new(false));

        // Record side: tags every chunk with the period size it was written under.
        let worker = {
            let control = control.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                let mut sink = vec![0_u8; 1024];
                while !stop.load(Ordering::Acquire) {
                    control.with_locked(|streams| {
                        let tag = (streams.params.period_frames / 256) as u8;
                        streams.ends.playback.read(&mut sink);
                        let chunk = [tag; 8 * FRAME_BYTES];
                        if streams.ends.capture.write_space() >= chunk.len() {
                            streams.ends.capture.write(&chunk);
                        }
                    });
                    thread::sleep(Duration::from_micros(50));
                }
            })
        };

        let silence = vec![0.0_f32; 512];
        for _ in 0..20 {
            io.push_playback(&[&silence, &silence], 256);
            io.pull_capture(256);
            thread::sleep(Duration::from_micros(200));
        }

        change_block_size(&*control, &mut io, 512).unwrap();
        assert_eq!(io.ring_capacity(), ring_capacity(512));
        control.with_locked(|streams| {
            assert_eq!(streams.ends.capture.capacity(), ring_capacity(512));
            assert_eq!(streams.params.period_frames, 512);
            assert_eq!(streams.attrs.len(), 3);
        });

        let mut seen = None;
        for _ in 0..2000 {
            if let Some(data) = io.pull_capture(512) {
                seen = Some(data.to_vec());
                break;
            }
            thread::sleep(Duration::from_micros(500));
        }
        stop.store(true, Ordering::Release);
        worker.join().unwrap();

        let data = seen.expect("record side never filled a 512 frame period");
        assert_eq!(data.len(), period_bytes(512));
        assert!(data.iter().all(|&b| b == 2));
    }

    enum Queued {
        Hole(usize),
        Data(Vec<u8>),
    }

    struct Recorded(VecDeque<Queued>);

    impl PacketSource for Recorded {
        type Error = ();

        fn readable_size(&self) -> usize {
            self.0.len()
        }
        fn peek(&mut self) -> Result<Packet<'_>, ()> {
            Ok(match self.0.front() {
                None => Packet::Empty,
                Some(Queued::Hole(n)) => Packet::Hole(*n),
                Some(Queued::Data(d)) => Packet::Data(d),
            })
        }
        fn discard(&mut self) -> Result<(), ()> {
            self.0.pop_front().map(|_| ()).ok_or(())
        }
    }

    #[test]
    fn holes_do_not_corrupt_the_following_period() {
        let frames = 64;
        let diag = Arc::new(Diagnostics::new());
        let (graph, mut stream) = transport::allocate(frames).unwrap();
        let mut io = PeriodIo::new(graph, frames, diag.clone());

        let left: Vec<f32> = (0..frames).map(|i| i as f32).collect();
        let right: Vec<f32> = (0..frames).map(|i| 0.5 * i as f32).collect();
        let mut bytes = vec![0_u8; period_bytes(frames)];
        interleave(&[&left, &right], frames, &mut bytes);
        let (first, second) = bytes.split_at(period_bytes(frames) / 2);

        let mut source = Recorded(VecDeque::from([
            Queued::Hole(128),
            Queued::Data(first.to_vec()),
            Queued::Hole(64),
            Queued::Data(second.to_vec()),
        ]));
        let stats =
            drain_packets(&mut source, &mut stream.capture, Direction::Capture, &diag).unwrap();
        assert_eq!(stats.holes, 2);
        assert_eq!(diag.overflows(Direction::Capture), 2);
        assert_eq!(diag.holes(Direction::Capture), 2);

        let data = io.pull_capture(frames).unwrap();
        let mut out_left = vec![0.0_f32; frames];
        let mut out_right = vec![0.0_f32; frames];
        deinterleave_channel(data, 0, &mut out_left);
        deinterleave_channel(data, 1, &mut out_right);
        assert_eq!(out_left, left);
        assert_eq!(out_right, right);
        assert_eq!(diag.underflows(Direction::Capture), 0);
    }
}
