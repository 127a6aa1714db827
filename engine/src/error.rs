/// When in the bridge lifetime an error can occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Raised while starting; nothing is running yet.
    Setup,
    /// Raised by a subsystem callback after startup.
    Runtime,
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unable to start a JACK server: {0}")]
    GraphSpawn(String),

    #[error("unable to connect to the JACK server: {0}")]
    GraphConnect(String),

    #[error("unable to register JACK port {port}: {reason}")]
    PortRegistration { port: String, reason: String },

    #[error("unable to activate the JACK client: {0}")]
    GraphActivate(String),

    #[error("unable to allocate a {bytes} byte ring buffer")]
    RingAllocation { bytes: usize },

    #[error("{what}: {reason}")]
    StreamingSetup { what: &'static str, reason: String },

    #[error("PulseAudio connection failed: {0}")]
    StreamingFailed(String),

    #[error("PulseAudio {role} stream failed: {reason}")]
    StreamFailed { role: &'static str, reason: String },

    #[error("unable to query PulseAudio sink information: {0}")]
    SinkQuery(String),

    #[error("JACK server shut the client down: {0}")]
    GraphShutdown(String),
}

impl BridgeError {
    pub fn streaming_setup(what: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::StreamingSetup {
            what,
            reason: reason.to_string(),
        }
    }

    pub fn phase(&self) -> Phase {
        match self {
            Self::Config(_)
            | Self::GraphSpawn(_)
            | Self::GraphConnect(_)
            | Self::PortRegistration { .. }
            | Self::GraphActivate(_)
            | Self::RingAllocation { .. }
            | Self::StreamingSetup { .. } => Phase::Setup,
            Self::StreamingFailed(_)
            | Self::StreamFailed { .. }
            | Self::SinkQuery(_)
            | Self::GraphShutdown(_) => Phase::Runtime,
        }
    }
}
