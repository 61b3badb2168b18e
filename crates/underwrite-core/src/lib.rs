pub mod error;
pub mod time_value;
pub mod types;

#[cfg(feature = "underwriting")]
pub mod underwriting;

#[cfg(feature = "waterfall")]
pub mod waterfall;

#[cfg(feature = "scenarios")]
pub mod scenarios;

pub use error::UnderwriteError;
pub use types::*;

/// Standard result type for all underwriting computations
pub type UnderwriteResult<T> = Result<T, UnderwriteError>;
