use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum DriveError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid state: {0}")]
    State(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;

/// Map any boxed trait-object error to a typed DriveError, with special
/// handling for hardware backend errors.
pub(crate) fn map_hw_error_dyn(e: &(dyn std::error::Error + 'static)) -> DriveError {
    #[cfg(feature = "hardware-errors")]
    {
        use linebot_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return DriveError::HardwareFault(hw.to_string());
        }
    }
    DriveError::Hardware(e.to_string())
}
