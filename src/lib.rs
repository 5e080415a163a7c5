use std::error::Error;

pub type DynError = Box<dyn Error + Send + Sync>;

pub mod strategy;

// Venue connectors and the operator HTTP surface
pub mod gate;
pub mod http;
pub mod mexc;
pub mod utils;
