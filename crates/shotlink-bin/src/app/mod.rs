//! Application wiring and lifecycle management.

mod demo;
mod inspect;
mod produce;
mod receive;
mod supervisor;

pub use demo::run_demo;
pub use inspect::print_backlog;
pub use produce::run_producer;
pub use receive::run_receiver;
