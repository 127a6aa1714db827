use crate::{
    audio::transport,
    config::BridgeConfig,
    diagnostics::{Diagnostics, XrunReporter},
    error::BridgeError,
    hw::{
        jack::{JackRuntime, open_client},
        pulse::{PulseLoop, PulseRuntime},
    },
    message::BridgeEvent,
    reconfig::GraphParams,
};
use std::{future::Future, sync::Arc, time::Duration};
use tokio::{
    sync::mpsc::{UnboundedReceiver, unbounded_channel},
    time::{MissedTickBehavior, interval},
};
use tracing::{info, warn};

pub const XRUN_REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// A running bridge: the active JACK client and the PulseAudio connection.
pub struct Bridge {
    jack: JackRuntime<PulseLoop>,
    pulse: PulseRuntime,
    events: UnboundedReceiver<BridgeEvent>,
    diagnostics: Arc<Diagnostics>,
}

impl Bridge {
    /// Opens JACK, allocates the rings for its current period, connects to
    /// PulseAudio and finally activates the JACK client. Anything built
    /// before a failing step is released on the way out.
    pub fn start(config: &BridgeConfig) -> Result<Self, BridgeError> {
        let (tx, events) = unbounded_channel();

        let client = open_client(config)?;
        let params = GraphParams {
            period_frames: client.buffer_size() as usize,
            sample_rate: client.sample_rate() as u32,
        };
        info!(
            "JACK server at {} Hz, {} frames per period.",
            params.sample_rate, params.period_frames
        );

        let (graph_ends, stream_ends) = transport::allocate(params.period_frames)?;
        let diagnostics = Arc::new(Diagnostics::new());
        let pulse = PulseRuntime::start(
            config,
            params,
            stream_ends,
            diagnostics.clone(),
            tx.clone(),
        )?;
        let jack = JackRuntime::activate(
            client,
            config,
            graph_ends,
            pulse.control(),
            diagnostics.clone(),
            tx,
        )?;
        info!("Bridging PulseAudio through JACK client `{}`.", jack.client_name);

        Ok(Self {
            jack,
            pulse,
            events,
            diagnostics,
        })
    }

    /// Runs until a fatal event, a clean PulseAudio termination or Ctrl-C,
    /// then releases both sides.
    pub async fn run(mut self) -> Result<(), BridgeError> {
        let mut reporter = XrunReporter::new();
        let outcome = wait_for_exit(
            &mut self.events,
            tokio::signal::ctrl_c(),
            &self.diagnostics,
            &mut reporter,
        )
        .await;
        self.shutdown();
        outcome
    }

    fn shutdown(&mut self) {
        self.pulse.close();
        self.jack.close();
        info!("{}", self.diagnostics.summary());
    }
}

/// Waits for whatever ends the bridge first, logging xrun counts that the
/// process thread accumulated in the meantime.
pub async fn wait_for_exit(
    events: &mut UnboundedReceiver<BridgeEvent>,
    interrupt: impl Future<Output = std::io::Result<()>>,
    diagnostics: &Diagnostics,
    reporter: &mut XrunReporter,
) -> Result<(), BridgeError> {
    tokio::pin!(interrupt);
    let mut ticker = interval(XRUN_REPORT_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let outcome = loop {
        tokio::select! {
            _ = ticker.tick() => reporter.log(diagnostics),
            event = events.recv() => break match event {
                Some(BridgeEvent::Fatal(err)) => Err(err),
                Some(BridgeEvent::Terminated) | None => Ok(()),
            },
            signal = &mut interrupt => {
                if let Err(e) = signal {
                    warn!("Failed to listen for Ctrl-C: {e}");
                }
                info!("Interrupted, shutting down.");
                break Ok(());
            }
        }
    };
    reporter.log(diagnostics);
    outcome
}
