pub mod clock;

pub use clock::{Clock, MonotonicClock, TestClock};

/// Analog input channels, in acquisition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Mains voltage (the phase reference).
    Voltage,
    /// Current transformer on the grid connection.
    GridCurrent,
    /// Current transformer on the diverted-load feed.
    DivertCurrent,
}

impl Channel {
    /// Next channel in the fixed voltage -> grid -> divert rotation.
    pub fn next(self) -> Self {
        match self {
            Channel::Voltage => Channel::GridCurrent,
            Channel::GridCurrent => Channel::DivertCurrent,
            Channel::DivertCurrent => Channel::Voltage,
        }
    }
}

/// Multiplexed analog frontend. One conversion is in flight at a time:
/// `read_conversion` returns the result of the last `start_conversion`.
pub trait AnalogFrontend {
    fn start_conversion(
        &mut self,
        channel: Channel,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    fn read_conversion(&mut self) -> Result<i32, Box<dyn std::error::Error + Send + Sync>>;
}

/// Digital output driving the resistive load (triac/SSR trigger).
pub trait LoadSwitch {
    fn set_on(&mut self, on: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Digital input selecting the threshold mode (anti-flicker when high).
pub trait ModeInput {
    fn anti_flicker_selected(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;
}

/// Liveness mechanism. `feed` must be called within the hardware period or
/// the system restarts; that restart is the only recovery from a hung loop.
pub trait Watchdog {
    fn feed(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
