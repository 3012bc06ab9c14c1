//! Caller-side cancellation handles.

use tokio_util::sync::CancellationToken;

/// Owns the right to abort one or more requests.
#[derive(Debug, Clone, Default)]
pub struct AbortController {
    token: CancellationToken,
}

impl AbortController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal to hand to [`FetchInit`](crate::client::FetchInit).
    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            token: self.token.clone(),
        }
    }

    pub fn abort(&self) {
        self.token.cancel();
    }
}

/// Observes an [`AbortController`].
#[derive(Debug, Clone)]
pub struct AbortSignal {
    token: CancellationToken,
}

impl AbortSignal {
    /// A signal that is already aborted.
    pub fn aborted() -> Self {
        let token = CancellationToken::new();
        token.cancel();
        Self { token }
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the signal is aborted.
    pub async fn wait(&self) {
        self.token.cancelled().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn abort_reaches_every_signal() {
        let controller = AbortController::new();
        let a = controller.signal();
        let b = controller.signal();
        assert!(!a.is_aborted());

        controller.abort();
        a.wait().await;
        assert!(b.is_aborted());
        assert!(AbortSignal::aborted().is_aborted());
    }
}
