#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("Window max size has to be greater than zero.")]
    ZeroMaxSize,
}

#[derive(Debug, thiserror::Error)]
pub enum StatsMonitorError {
    #[error("Invalid default window options.")]
    InvalidWindowOptions(#[from] WindowError),

    #[error("Sweep interval has to be greater than zero.")]
    ZeroSweepInterval,

    #[error("Failed to spawn the stats processor thread.")]
    ProcessorSpawnFailed(#[source] std::io::Error),
}
