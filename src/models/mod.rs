pub mod session;
pub mod wire;

pub use session::{Session, SessionStatus, User};
