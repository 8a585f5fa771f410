mod coordinator;
mod message;
mod thread;
mod worker;

pub use coordinator::*;
pub use message::*;
pub use worker::*;
