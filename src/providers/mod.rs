//! External data providers.

pub mod daylight;
