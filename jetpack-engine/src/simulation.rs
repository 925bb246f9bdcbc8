mod resting;
pub use resting::*;
mod scheduler;
pub use scheduler::*;
