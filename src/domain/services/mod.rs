mod relay;
mod session;

pub use relay::*;
pub use session::*;
