//! PulseAudio side of the bridge.
//!
//! Everything PulseAudio owns lives in [`PulseState`] inside a [`LoopCell`]
//! and is touched either from a mainloop callback or under [`LoopGuard`].
//! Callbacks hold a `Weak` to the shared state so a late callback after
//! shutdown finds nothing instead of freed memory.
//!
//! State callbacks are installed only after the matching `connect` call,
//! because libpulse reports the first state change synchronously from
//! inside `connect`.

use crate::{
    audio::{frame::CHANNELS, transport::StreamEnds},
    config::BridgeConfig,
    diagnostics::{Diagnostics, Direction},
    discovery::{MonitorAction, MonitorDiscovery, SinkLookup, monitor_action},
    error::BridgeError,
    hw::rt::promote_current_thread,
    message::{BridgeEvent, EventSender, send_fatal},
    mutex::LoopCell,
    reconfig::{
        BufferAttributes, GraphParams, LockedStreams, StreamRole, StreamingControl, stream_moved,
    },
    stream_io::{Packet, PacketSource, drain_packets, fill_playback},
};
use libpulse_binding::{
    callbacks::ListResult,
    context::{self, Context},
    def::BufferAttr,
    error::PAErr,
    mainloop::threaded::Mainloop,
    sample::{Format, Spec},
    stream::{self, PeekResult, SeekMode, Stream},
};
use std::sync::{Arc, Weak};
use tracing::{info, warn};

fn stream_flags() -> stream::FlagSet {
    stream::FlagSet::VARIABLE_RATE | stream::FlagSet::ADJUST_LATENCY
}

fn buffer_attr(attrs: &BufferAttributes) -> BufferAttr {
    BufferAttr {
        maxlength: attrs.max_length,
        tlength: attrs.target_length,
        prebuf: attrs.prebuf,
        minreq: attrs.min_request,
        fragsize: attrs.fragment_size,
    }
}

fn slot(role: StreamRole) -> usize {
    match role {
        StreamRole::Playback => 0,
        StreamRole::Record => 1,
        StreamRole::Monitor => 2,
    }
}

/// Record and monitor packets as seen by the drain loop.
struct PulseSource<'a>(&'a mut Stream);

impl PacketSource for PulseSource<'_> {
    type Error = PAErr;

    fn readable_size(&self) -> usize {
        self.0.readable_size().unwrap_or(0)
    }

    fn peek(&mut self) -> Result<Packet<'_>, PAErr> {
        Ok(match self.0.peek()? {
            PeekResult::Empty => Packet::Empty,
            PeekResult::Hole(bytes) => Packet::Hole(bytes),
            PeekResult::Data(data) => Packet::Data(data),
        })
    }

    fn discard(&mut self) -> Result<(), PAErr> {
        self.0.discard()
    }
}

pub struct PulseState {
    context: Context,
    streams: [Option<Stream>; 3],
    ends: StreamEnds,
    params: GraphParams,
    scratch: Vec<u8>,
    diagnostics: Arc<Diagnostics>,
    events: EventSender,
    realtime_priority: i32,
    promoted: bool,
    discovery: MonitorDiscovery,
    shared: Weak<PulseLoop>,
}

impl PulseState {
    fn errno(&self) -> String {
        format!("{}", self.context.errno())
    }

    fn fail(&self, err: BridgeError) {
        send_fatal(&self.events, err);
    }

    fn stream_failed(&self, role: StreamRole, err: impl std::fmt::Display) {
        self.fail(BridgeError::StreamFailed {
            role: role.label(),
            reason: err.to_string(),
        });
    }

    fn on_context_state(&mut self) {
        if !self.promoted {
            self.promoted = true;
            if self.realtime_priority > 0 {
                match promote_current_thread(self.realtime_priority) {
                    Ok(priority) => info!("PulseAudio mainloop running SCHED_FIFO at {priority}."),
                    Err(e) => warn!("Cannot use real-time scheduling: {e}"),
                }
            }
        }

        match self.context.get_state() {
            context::State::Ready => {
                info!("Connected to the PulseAudio server.");
                if let Err(e) = self.create_streams() {
                    self.fail(e);
                }
            }
            context::State::Failed => {
                self.fail(BridgeError::StreamingFailed(self.errno()));
            }
            context::State::Terminated => {
                info!("PulseAudio connection terminated.");
                let _ = self.events.send(BridgeEvent::Terminated);
            }
            _ => {}
        }
    }

    fn create_streams(&mut self) -> Result<(), BridgeError> {
        let spec = Spec {
            format: Format::FLOAT32NE,
            channels: CHANNELS as u8,
            rate: self.params.sample_rate,
        };
        if !spec.is_valid() {
            return Err(BridgeError::streaming_setup(
                "Invalid PulseAudio sample spec",
                format!("{} Hz, {} channels", spec.rate, spec.channels),
            ));
        }

        for role in StreamRole::ALL {
            let mut stream = Stream::new(&mut self.context, role.stream_name(), &spec, None)
                .ok_or_else(|| {
                    BridgeError::streaming_setup("Unable to create a PulseAudio stream", self.errno())
                })?;
            self.install_data_callbacks(&mut stream, role);
            self.streams[slot(role)] = Some(stream);
        }

        let playback_attr = buffer_attr(&BufferAttributes::for_role(
            StreamRole::Playback,
            self.params.period_frames,
        ));
        let record_attr = buffer_attr(&BufferAttributes::for_role(
            StreamRole::Record,
            self.params.period_frames,
        ));

        if let Some(stream) = self.streams[slot(StreamRole::Playback)].as_mut() {
            stream
                .connect_playback(None, Some(&playback_attr), stream_flags(), None, None)
                .map_err(|e| {
                    BridgeError::streaming_setup(
                        "Unable to connect to PulseAudio playback stream",
                        format!("{e}"),
                    )
                })?;
        }
        if let Some(stream) = self.streams[slot(StreamRole::Record)].as_mut() {
            stream
                .connect_record(None, Some(&record_attr), stream_flags())
                .map_err(|e| {
                    BridgeError::streaming_setup(
                        "Unable to connect to PulseAudio record stream",
                        format!("{e}"),
                    )
                })?;
        }
        self.install_state_callback(StreamRole::Playback);
        self.install_state_callback(StreamRole::Record);
        Ok(())
    }

    fn install_data_callbacks(&self, stream: &mut Stream, role: StreamRole) {
        let weak = self.shared.clone();
        match role {
            StreamRole::Playback => {
                stream.set_write_callback(Some(Box::new(move |nbytes: usize| {
                    if let Some(shared) = weak.upgrade() {
                        unsafe { shared.state.get() }.on_writable(nbytes);
                    }
                })));
            }
            StreamRole::Record | StreamRole::Monitor => {
                stream.set_read_callback(Some(Box::new(move |_: usize| {
                    if let Some(shared) = weak.upgrade() {
                        unsafe { shared.state.get() }.on_readable(role);
                    }
                })));
            }
        }

        let weak = self.shared.clone();
        stream.set_moved_callback(Some(Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                let state = unsafe { shared.state.get() };
                if let Err(e) = stream_moved(state, role) {
                    state.fail(e);
                }
            }
        })));
    }

    fn install_state_callback(&mut self, role: StreamRole) {
        let weak = self.shared.clone();
        if let Some(stream) = self.streams[slot(role)].as_mut() {
            stream.set_state_callback(Some(Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    unsafe { shared.state.get() }.on_stream_state(role);
                }
            })));
        }
    }

    fn on_writable(&mut self, nbytes: usize) {
        if self.scratch.len() < nbytes {
            self.scratch.resize(nbytes, 0);
        }
        let out = &mut self.scratch[..nbytes];
        fill_playback(&mut self.ends.playback, out, &self.diagnostics);
        let Some(stream) = self.streams[slot(StreamRole::Playback)].as_mut() else {
            return;
        };
        if let Err(e) = stream.write_copy(out, 0, SeekMode::Relative) {
            self.stream_failed(StreamRole::Playback, format!("write failed: {e}"));
        }
    }

    fn on_readable(&mut self, role: StreamRole) {
        let (writer, direction) = match role {
            StreamRole::Record => (&mut self.ends.capture, Direction::Capture),
            StreamRole::Monitor => (&mut self.ends.monitor, Direction::Monitor),
            StreamRole::Playback => return,
        };
        let Some(stream) = self.streams[slot(role)].as_mut() else {
            return;
        };
        let result = drain_packets(&mut PulseSource(stream), writer, direction, &self.diagnostics);
        if let Err(e) = result {
            self.stream_failed(role, format!("read failed: {e}"));
        }
    }

    fn on_stream_state(&mut self, role: StreamRole) {
        let Some(stream) = self.streams[slot(role)].as_ref() else {
            return;
        };
        match stream.get_state() {
            stream::State::Ready => {
                info!("PulseAudio {} stream ready.", role.label());
                if self.discovery.on_ready(role) {
                    self.query_monitor_source();
                }
            }
            stream::State::Failed => {
                let reason = self.errno();
                self.stream_failed(role, reason);
            }
            _ => {}
        }
    }

    /// Looks up the sink the playback stream ended up on and connects the
    /// monitor stream to that sink's monitor source.
    fn query_monitor_source(&mut self) {
        let index = self.streams[slot(StreamRole::Playback)]
            .as_ref()
            .and_then(|stream| stream.get_device_index());
        let Some(index) = index else {
            self.fail(BridgeError::SinkQuery(
                "playback stream has no device".to_string(),
            ));
            return;
        };

        let weak = self.shared.clone();
        let _ = self
            .context
            .introspect()
            .get_sink_info_by_index(index, move |result| {
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                let state = unsafe { shared.state.get() };
                let lookup = match &result {
                    ListResult::Item(info) => SinkLookup::Item {
                        monitor_source: info.monitor_source_name.as_deref(),
                    },
                    ListResult::End => SinkLookup::End,
                    ListResult::Error => SinkLookup::Error,
                };
                match monitor_action(lookup, || state.errno()) {
                    MonitorAction::Connect(source) => state.connect_monitor(source),
                    MonitorAction::Fail(err) => state.fail(err),
                    MonitorAction::Wait => {}
                }
            });
    }

    fn connect_monitor(&mut self, source: String) {
        let attr = buffer_attr(&BufferAttributes::for_role(
            StreamRole::Monitor,
            self.params.period_frames,
        ));
        let Some(stream) = self.streams[slot(StreamRole::Monitor)].as_mut() else {
            return;
        };
        match stream.connect_record(Some(&source), Some(&attr), stream_flags()) {
            Ok(()) => {
                info!("Monitoring {source}.");
                self.install_state_callback(StreamRole::Monitor);
            }
            Err(e) => self.stream_failed(StreamRole::Monitor, format!("connect failed: {e}")),
        }
    }

    /// Silences every callback, then disconnects streams and context.
    fn release(&mut self) {
        for stream in self.streams.iter_mut().flatten() {
            stream.set_state_callback(None);
            stream.set_write_callback(None);
            stream.set_read_callback(None);
            stream.set_moved_callback(None);
            if stream.get_state().is_good()
                && let Err(e) = stream.disconnect()
            {
                warn!("Failed to disconnect PulseAudio stream: {e}");
            }
        }
        self.streams = [None, None, None];
        self.context.set_state_callback(None);
        self.context.disconnect();
    }
}

impl LockedStreams for PulseState {
    fn params(&self) -> GraphParams {
        self.params
    }

    fn set_params(&mut self, params: GraphParams) {
        self.params = params;
    }

    fn is_ready(&self, role: StreamRole) -> bool {
        self.streams[slot(role)]
            .as_ref()
            .is_some_and(|stream| stream.get_state() == stream::State::Ready)
    }

    fn apply_buffer_attributes(
        &mut self,
        role: StreamRole,
        attrs: &BufferAttributes,
    ) -> Result<(), BridgeError> {
        let Some(stream) = self.streams[slot(role)].as_mut() else {
            return Ok(());
        };
        let _ = stream.set_buffer_attr(
            &buffer_attr(attrs),
            move |success: bool| {
                if !success {
                    warn!("PulseAudio rejected new {} buffer attributes", role.label());
                }
            },
        );
        Ok(())
    }

    fn update_sample_rate(&mut self, role: StreamRole, rate: u32) -> Result<(), BridgeError> {
        let Some(stream) = self.streams[slot(role)].as_mut() else {
            return Ok(());
        };
        let _ = stream.update_sample_rate(
            rate,
            move |success: bool| {
                if !success {
                    warn!("PulseAudio rejected {} Hz on the {} stream", rate, role.label());
                }
            },
        );
        Ok(())
    }

    fn replace_ends(&mut self, ends: StreamEnds) {
        self.ends = ends;
    }
}

/// The threaded mainloop and the state it protects. Field order matters:
/// the context and streams go before the mainloop they are attached to.
pub struct PulseLoop {
    state: LoopCell<PulseState>,
    mainloop: LoopCell<Mainloop>,
}

/// Holds the mainloop lock until dropped.
pub struct LoopGuard<'a> {
    mainloop: &'a LoopCell<Mainloop>,
}

impl<'a> LoopGuard<'a> {
    fn lock(mainloop: &'a LoopCell<Mainloop>) -> Self {
        // pa_threaded_mainloop_lock is itself thread-safe.
        unsafe { mainloop.get() }.lock();
        Self { mainloop }
    }
}

impl Drop for LoopGuard<'_> {
    fn drop(&mut self) {
        unsafe { self.mainloop.get() }.unlock();
    }
}

impl StreamingControl for PulseLoop {
    type Locked = PulseState;

    fn with_locked<R>(&self, f: impl FnOnce(&mut PulseState) -> R) -> R {
        let _guard = LoopGuard::lock(&self.mainloop);
        f(unsafe { self.state.get() })
    }
}

pub struct PulseRuntime {
    shared: Arc<PulseLoop>,
    closed: bool,
}

impl PulseRuntime {
    /// Connects the context and starts the mainloop thread. Streams are
    /// created once the context reports Ready.
    pub fn start(
        config: &BridgeConfig,
        params: GraphParams,
        ends: StreamEnds,
        diagnostics: Arc<Diagnostics>,
        events: EventSender,
    ) -> Result<Self, BridgeError> {
        let mainloop = Mainloop::new().ok_or_else(|| {
            BridgeError::streaming_setup("Unable to create a PulseAudio mainloop", "out of memory")
        })?;
        let mut context = Context::new(&mainloop, &config.client_name).ok_or_else(|| {
            BridgeError::streaming_setup("Unable to create a PulseAudio context", "out of memory")
        })?;
        context
            .connect(config.pulse_server.as_deref(), context::FlagSet::NOFLAGS, None)
            .map_err(|e| {
                BridgeError::streaming_setup(
                    "Unable to connect to the PulseAudio server",
                    format!("{e}"),
                )
            })?;

        let shared = Arc::new_cyclic(|weak| PulseLoop {
            state: LoopCell::new(PulseState {
                context,
                streams: [None, None, None],
                ends,
                params,
                scratch: Vec::new(),
                diagnostics,
                events,
                realtime_priority: config.realtime_priority,
                promoted: false,
                discovery: MonitorDiscovery::new(),
                shared: weak.clone(),
            }),
            mainloop: LoopCell::new(mainloop),
        });

        // The mainloop thread is not running yet, nothing else can reach the state.
        let weak = Arc::downgrade(&shared);
        unsafe { shared.state.get() }
            .context
            .set_state_callback(Some(Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    unsafe { shared.state.get() }.on_context_state();
                }
            })));

        unsafe { shared.mainloop.get() }.start().map_err(|e| {
            BridgeError::streaming_setup("Unable to start the PulseAudio mainloop", format!("{e}"))
        })?;

        Ok(Self {
            shared,
            closed: false,
        })
    }

    pub fn control(&self) -> Arc<PulseLoop> {
        self.shared.clone()
    }

    /// Disconnects streams and context, then stops the mainloop thread.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        {
            let _guard = LoopGuard::lock(&self.shared.mainloop);
            unsafe { self.shared.state.get() }.release();
        }
        unsafe { self.shared.mainloop.get() }.stop();
        info!("PulseAudio connection closed.");
    }
}

impl Drop for PulseRuntime {
    fn drop(&mut self) {
        self.close();
    }
}
