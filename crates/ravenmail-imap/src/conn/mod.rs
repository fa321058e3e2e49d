//! Connection layer: transport, framing, driver, and IDLE.

pub mod config;
pub mod driver;
pub mod framed;
pub mod idle;
pub mod stream;
