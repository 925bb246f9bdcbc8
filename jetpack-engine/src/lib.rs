mod error;
pub use error::*;
mod config;
pub use config::*;
mod geometry;
pub use geometry::*;
mod polynomial;
pub use polynomial::*;
mod motion;
pub use motion::*;
mod object;
pub use object::*;
mod toi;
pub use toi::*;
mod resolver;
pub use resolver::*;
mod clock;
pub use clock::*;
mod event;
pub use event::*;
mod event_queue;
pub use event_queue::*;
mod world_state;
pub use world_state::*;
mod simulation;
pub use simulation::*;
pub mod scenes;

pub(crate) fn default<T: Default>() -> T {
    T::default()
}
