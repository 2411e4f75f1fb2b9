mod clock;
mod session;

pub use clock::*;
pub use session::*;
