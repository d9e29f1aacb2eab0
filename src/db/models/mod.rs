//! Database models split into domain-specific modules.

pub mod case;
pub mod session;
pub mod user;
pub mod verification;

pub use case::*;
pub use session::*;
pub use user::*;
pub use verification::*;
