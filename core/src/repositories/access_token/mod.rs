pub mod r#trait {
    pub use super::trait_::*;
}
#[path = "trait.rs"]
mod trait_;
pub mod clock;
pub mod memory;

pub use clock::{Clock, ManualClock, SystemClock};
pub use memory::InMemoryTokenStorage;
pub use r#trait::TokenStorage;

#[cfg(test)]
mod tests;
