mod coordinator;
mod generator;
mod publisher;
mod state;
#[cfg(test)]
mod tests;

pub use coordinator::*;
pub use generator::*;
pub use publisher::*;
pub use state::*;
