use crate::{
    audio::{
        frame::{CHANNELS, deinterleave_channel},
        transport::GraphEnds,
    },
    config::BridgeConfig,
    diagnostics::Diagnostics,
    error::BridgeError,
    message::{EventSender, send_fatal},
    mirror::{ConnectionOp, LinkAction, MirrorPolicy, PendingOps},
    period::PeriodIo,
    reconfig::{StreamingControl, change_block_size, change_sample_rate},
};
use jack::{
    Client, ClientOptions, ClientStatus, Control, Frames, NotificationHandler, Port, PortFlags,
    PortId, PortSpec, ProcessHandler, ProcessScope,
};
use std::{os::raw::c_ulong, sync::Arc, time::Duration};
use tracing::{debug, info, warn};

pub const PLAYBACK_PREFIX: &str = "playback";
pub const CAPTURE_PREFIX: &str = "capture";
pub const MONITOR_PREFIX: &str = "monitor";

const FLOAT_MONO_AUDIO: &str = "32 bit float mono audio";

// Playback and capture stand in for hardware, so they are terminal like the
// system ports. Monitor is a plain output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgePort {
    flags: PortFlags,
}

impl BridgePort {
    pub fn playback() -> Self {
        Self {
            flags: PortFlags::IS_INPUT | PortFlags::IS_TERMINAL,
        }
    }

    pub fn capture() -> Self {
        Self {
            flags: PortFlags::IS_OUTPUT | PortFlags::IS_TERMINAL,
        }
    }

    pub fn monitor() -> Self {
        Self {
            flags: PortFlags::IS_OUTPUT,
        }
    }
}

unsafe impl PortSpec for BridgePort {
    fn jack_port_type(&self) -> &'static str {
        FLOAT_MONO_AUDIO
    }

    fn jack_flags(&self) -> PortFlags {
        self.flags
    }

    fn jack_buffer_size(&self) -> c_ulong {
        0
    }
}

fn input_samples<'a>(port: &'a Port<BridgePort>, ps: &'a ProcessScope) -> &'a [f32] {
    let frames = ps.n_frames();
    // Float audio ports hold exactly `frames` samples for this cycle.
    unsafe { std::slice::from_raw_parts(port.buffer(frames) as *const f32, frames as usize) }
}

fn output_samples<'a>(port: &'a mut Port<BridgePort>, ps: &'a ProcessScope) -> &'a mut [f32] {
    let frames = ps.n_frames();
    unsafe { std::slice::from_raw_parts_mut(port.buffer(frames) as *mut f32, frames as usize) }
}
pub fn port_names(prefix: &str) -> Vec<String> {
    (1..=CHANNELS).map(|ch| format!("{prefix}_{ch}")).collect()
}
pub fn open_client(config: &BridgeConfig) -> Result<Client, BridgeError> {
    bootstrap(
        config,
        || {
            Client::new(&config.client_name, ClientOptions::NO_START_SERVER)
                .map(|(client, _status)| client)
                .map_err(|e| e.to_string())
        },
        spawn_server,
        std::thread::sleep,
    )
}

fn spawn_server(command: &[String]) -> Result<(), String> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| "empty server command".to_string())?;
    let child = std::process::Command::new(program)
        .args(args)
        .spawn()
        .map_err(|e| format!("{program}: {e}"))?;
    info!("Started JACK server `{}` (pid {}).", command.join(" "), child.id());
    Ok(())
}

fn bootstrap<T>(
    config: &BridgeConfig,
    mut open: impl FnMut() -> Result<T, String>,
    spawn: impl FnOnce(&[String]) -> Result<(), String>,
    mut sleep: impl FnMut(Duration),
) -> Result<T, BridgeError> {
    let mut last_error = match open() {
        Ok(client) => return Ok(client),
        Err(e) => e,
    };
    if !config.start_server {
        return Err(BridgeError::GraphConnect(last_error));
    }
    info!("No JACK server running ({last_error}), starting one.");
    spawn(&config.server_command).map_err(BridgeError::GraphSpawn)?;
    for _ in 0..config.server_retries {
        match open() {
            Ok(client) => return Ok(client),
            Err(e) => last_error = e,
        }
        sleep(Duration::from_millis(config.server_retry_delay_ms));
    }
    Err(BridgeError::GraphConnect(last_error))
}

fn register(
    client: &Client,
    names: &[String],
    spec: BridgePort,
) -> Result<Vec<Port<BridgePort>>, BridgeError> {
    names
        .iter()
        .map(|name| {
            client
                .register_port(name, spec)
                .map_err(|e| BridgeError::PortRegistration {
                    port: name.clone(),
                    reason: e.to_string(),
                })
        })
        .collect()
}

fn apply_op(client: &Client, op: &ConnectionOp) {
    let result = match op.action {
        LinkAction::Connect => client.connect_ports_by_name(&op.source, &op.destination),
        LinkAction::Disconnect => client.disconnect_ports_by_name(&op.source, &op.destination),
    };
    if let Err(e) = result {
        debug!("Mirroring {:?} {} -> {} failed: {e}", op.action, op.source, op.destination);
    }
}

struct Notifications<C> {
    control: Arc<C>,
    policy: Option<MirrorPolicy>,
    pending: Arc<PendingOps>,
    events: EventSender,
}

impl<C: StreamingControl + 'static> NotificationHandler for Notifications<C> {
    unsafe fn shutdown(&mut self, status: ClientStatus, reason: &str) {
        send_fatal(
            &self.events,
            BridgeError::GraphShutdown(format!("{reason} ({status:?})")),
        );
    }

    fn sample_rate(&mut self, _: &Client, srate: Frames) -> Control {
        match change_sample_rate(&*self.control, srate) {
            Ok(()) => Control::Continue,
            Err(e) => {
                send_fatal(&self.events, e);
                Control::Quit
            }
        }
    }

    fn ports_connected(&mut self, client: &Client, a: PortId, b: PortId, connected: bool) {
        let (Some(port_a), Some(port_b)) = (client.port_by_id(a), client.port_by_id(b)) else {
            return;
        };
        let (Ok(source), Ok(destination)) = (port_a.name(), port_b.name()) else {
            return;
        };

        if let Some(policy) = &self.policy {
            for op in policy.mirror(&source, &destination, connected) {
                debug!("Scheduling {:?} {} -> {}", op.action, op.source, op.destination);
                self.pending.push(op);
            }
        }

        if connected {
            info!("{source} =====> {destination}");
        } else {
            info!("{source} ==X==> {destination}");
        }
    }
}

struct Process<C> {
    playback: Vec<Port<BridgePort>>,
    capture: Vec<Port<BridgePort>>,
    monitor: Vec<Port<BridgePort>>,
    period: PeriodIo,
    pending: Arc<PendingOps>,
    control: Arc<C>,
    events: EventSender,
}

impl<C> Process<C> {
    fn copy_playback(&mut self, ps: &ProcessScope, frames: usize) {
        let inputs: [&[f32]; CHANNELS] = std::array::from_fn(|ch| {
            self.playback
                .get(ch)
                .map(|port| input_samples(port, ps))
                .unwrap_or(&[])
        });
        self.period.push_playback(&inputs, frames);
    }

    fn copy_capture(&mut self, ps: &ProcessScope, frames: usize) {
        let data = self.period.pull_capture(frames);
        write_ports(&mut self.capture, data, ps);
    }

    fn copy_monitor(&mut self, ps: &ProcessScope, frames: usize) {
        let data = self.period.pull_monitor(frames);
        write_ports(&mut self.monitor, data, ps);
    }
}

fn write_ports(ports: &mut [Port<BridgePort>], data: Option<&[u8]>, ps: &ProcessScope) {
    for (ch, port) in ports.iter_mut().enumerate() {
        let dst = output_samples(port, ps);
        match data {
            Some(bytes) => deinterleave_channel(bytes, ch, dst),
            None => dst.fill(0.0),
        }
    }
}

impl<C: StreamingControl + 'static> ProcessHandler for Process<C> {
    fn process(&mut self, client: &Client, ps: &ProcessScope) -> Control {
        self.pending.drain(|op| apply_op(client, op));
        let frames = ps.n_frames() as usize;
        self.copy_playback(ps, frames);
        self.copy_capture(ps, frames);
        self.copy_monitor(ps, frames);
        Control::Continue
    }

    fn buffer_size(&mut self, _: &Client, size: Frames) -> Control {
        match change_block_size(&*self.control, &mut self.period, size as usize) {
            Ok(()) => Control::Continue,
            Err(e) => {
                send_fatal(&self.events, e);
                Control::Quit
            }
        }
    }
}
pub struct JackRuntime<C: StreamingControl + 'static> {
    client: Option<jack::AsyncClient<Notifications<C>, Process<C>>>,
    pub client_name: String,
}

impl<C: StreamingControl + 'static> JackRuntime<C> {
    pub fn activate(
        client: Client,
        config: &BridgeConfig,
        ends: GraphEnds,
        control: Arc<C>,
        diagnostics: Arc<Diagnostics>,
        events: EventSender,
    ) -> Result<Self, BridgeError> {
        let client_name = client.name().to_string();
        let period_frames = client.buffer_size() as usize;
        let playback_names = port_names(PLAYBACK_PREFIX);
        let capture_names = port_names(CAPTURE_PREFIX);

        let playback = register(&client, &playback_names, BridgePort::playback())?;
        let capture = register(&client, &capture_names, BridgePort::capture())?;
        let monitor = register(&client, &port_names(MONITOR_PREFIX), BridgePort::monitor())?;

        let pending = Arc::new(PendingOps::new());
        let policy = config.mirror_connections.then(|| {
            MirrorPolicy::new(
                &client_name,
                &config.system_client,
                playback_names,
                capture_names,
            )
        });

        let notifications = Notifications {
            control: control.clone(),
            policy,
            pending: pending.clone(),
            events: events.clone(),
        };
        let process = Process {
            playback,
            capture,
            monitor,
            period: PeriodIo::new(ends, period_frames, diagnostics),
            pending,
            control,
            events,
        };

        let client = client
            .activate_async(notifications, process)
            .map_err(|e| BridgeError::GraphActivate(e.to_string()))?;
        info!("JACK client `{client_name}` active.");

        Ok(Self {
            client: Some(client),
            client_name,
        })
    }
    pub fn close(&mut self) {
        if let Some(client) = self.client.take()
            && let Err(e) = client.deactivate()
        {
            warn!("Failed to deactivate JACK client: {e}");
        }
    }
}

impl<C: StreamingControl + 'static> Drop for JackRuntime<C> {
    fn drop(&mut self) {
        self.close();
    }
}
