//! Authentication state and the guard protecting views.
//!
//! The [`TokenStore`] is the single live credential slot; the gate in
//! [`gate`] decides, as a pure function of (credential, requested path),
//! whether a protected view may render or must redirect to the login entry
//! point.

mod gate;
mod token;

pub use gate::{gate, AuthGate, GateDecision, GateView, LOGIN_PATH};
pub use token::TokenStore;
