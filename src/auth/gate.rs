//! Guard invoked before a protected view is constructed.

use std::sync::atomic::{AtomicBool, Ordering};

use super::token::TokenStore;

/// Login entry point the gate redirects to.
pub const LOGIN_PATH: &str = "/login";

/// Outcome of the pure gate check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateDecision {
    /// A credential is live; the protected view may render.
    Allow,
    /// No credential; redirect to the login entry point. `to` carries the
    /// originally requested path so the login flow can return the user there.
    Redirect { to: String },
}

/// What a gated view instance should show right now.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateView {
    /// Render the protected content.
    Content,
    /// Render a transient placeholder. `redirect` is set on the first
    /// unauthenticated evaluation only; later evaluations of the same
    /// instance yield `None` so a re-render never re-triggers navigation.
    Placeholder { redirect: Option<String> },
}

/// Decide whether a view at `requested_path` may render.
///
/// Pure function of (credential, requested path): no side effects, safe to
/// call on every paint.
pub fn gate(credential: Option<&str>, requested_path: &str) -> GateDecision {
    match credential {
        Some(_) => GateDecision::Allow,
        None => GateDecision::Redirect {
            to: format!(
                "{}?redirectUrl={}",
                LOGIN_PATH,
                urlencoding::encode(requested_path)
            ),
        },
    }
}

/// Per-view-instance gate.
///
/// Wraps the pure [`gate`] check with a one-shot redirect latch: the redirect
/// instruction is a single side effect tied to this instance's transition
/// into the unauthenticated state, not a condition re-evaluated per paint.
pub struct AuthGate {
    tokens: TokenStore,
    path: String,
    redirected: AtomicBool,
}

impl AuthGate {
    /// Create a gate for one view instance at `path`.
    pub fn new(tokens: TokenStore, path: impl Into<String>) -> Self {
        Self {
            tokens,
            path: path.into(),
            redirected: AtomicBool::new(false),
        }
    }

    /// Evaluate the gate for a (re-)render of this view instance.
    pub fn evaluate(&self) -> GateView {
        let credential = self.tokens.get();
        match gate(credential.as_deref(), &self.path) {
            GateDecision::Allow => GateView::Content,
            GateDecision::Redirect { to } => {
                let first = !self.redirected.swap(true, Ordering::SeqCst);
                if first {
                    tracing::debug!(path = %self.path, %to, "unauthenticated, redirecting");
                }
                GateView::Placeholder {
                    redirect: first.then_some(to),
                }
            }
        }
    }
}
