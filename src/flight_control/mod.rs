//! The connection to the flight controller: the `FlightLink` abstraction,
//! the JSON-lines bridge transport and the bounded-retry takeoff machine.

pub mod bridge;
pub mod link;
pub mod takeoff;
#[cfg(test)]
mod tests;
