pub mod buffer;
pub mod delay;
pub mod server;
pub mod sink;

pub use buffer::{Buffer, BufferConfig, BufferNotice, PutOptions, SelectionPolicy};
pub use delay::{Delay, DelayStats};
pub use server::{Server, ServerBuilder, ServerNotice, ServerOptions, ServerPhase, ServerStats};
pub use sink::Sink;
