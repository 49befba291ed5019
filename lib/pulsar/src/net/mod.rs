pub mod acceptor;
pub mod buffer;
pub mod channel;
pub mod consumer;
pub mod frame;
pub mod support;
