#![forbid(unsafe_code)]

pub mod error;
pub mod format;
pub mod guard;
pub mod model;
pub mod time;
pub mod timer;

pub use error::Error;
pub use time::Clock;
