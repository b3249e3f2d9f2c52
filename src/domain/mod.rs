//! Domain policy code for the authentication core.
//!
//! Everything in here is pure: lockout tier evaluation, OTP issue/verify
//! verdicts, the permission map, and audit actor attribution. Persistence
//! side effects are applied by the repositories from the values these
//! functions return, which keeps the policies unit-testable with an explicit
//! `now` parameter.

pub mod actor;
pub mod lockout;
pub mod otp;
pub mod permissions;

pub use actor::Actor;
pub use permissions::Permissions;
