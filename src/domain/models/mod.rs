mod backend;
mod connection;
mod connector;
mod event;
mod message;
mod session;

pub use backend::*;
pub use connection::*;
pub use connector::*;
pub use event::*;
pub use message::*;
pub use session::*;
