//! Credentials, verification codes, sessions and access control.

mod access;
mod clock;
mod error;
mod password;
mod session;
mod verification;

pub use access::AccessControl;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{AuthError, AuthResult};
pub use password::{hash_password, verify_password, verify_unknown_account};
pub use session::{hash_token, SessionManager, SessionPolicy};
pub use verification::VerificationCodeIssuer;
