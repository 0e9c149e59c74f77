//! Domain types of the consent flow and the ports the application layer talks through.

pub mod context;
pub mod environment;
pub mod exchange;
pub mod ports;
pub mod session;
pub mod step;
pub mod template;
