use crate::domain::ports::AuthorizationCodeStoreBox;
use crate::error::Result;
use crate::interfaces::callback::CallbackRoutes;
use tokio::sync::watch;
use tracing::{info, warn};

/// Single-slot inbox for authorization codes delivered by external redirects.
///
/// One instance is shared (behind an `Arc`) by everything in the process. It
/// assumes a single authorization in flight: the slot always holds the most
/// recent code. Codes are also written to a durable store so a flow resumed
/// after a restart can still pick them up.
pub struct CallbackCorrelator {
    latest: watch::Sender<Option<String>>,
    durable: AuthorizationCodeStoreBox,
    routes: CallbackRoutes,
}

impl CallbackCorrelator {
    pub fn new(durable: AuthorizationCodeStoreBox, routes: CallbackRoutes) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            latest,
            durable,
            routes,
        }
    }

    pub fn routes(&self) -> &CallbackRoutes {
        &self.routes
    }

    /// Stores the code durably, then notifies every subscriber.
    pub async fn publish(&self, code: &str) -> Result<()> {
        self.durable.save_code(code).await?;
        self.latest.send_replace(Some(code.to_string()));
        info!(subscribers = self.latest.receiver_count(), "authorization code published");
        Ok(())
    }

    /// The most recent code: the in-memory slot first, then the durable store.
    pub async fn consume(&self) -> Result<Option<String>> {
        let cached = self.latest.borrow().clone();
        if let Some(code) = cached {
            return Ok(Some(code));
        }
        self.durable.load_code().await
    }

    /// A receiver that only reports codes published after this call.
    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.latest.subscribe()
    }

    /// Feeds a redirect URL into the inbox. Returns the code when one was published.
    pub async fn handle_redirect(&self, url: &str) -> Result<Option<String>> {
        match self.routes.extract_code(url) {
            Some(code) => {
                self.publish(&code).await?;
                Ok(Some(code))
            }
            None => {
                warn!("redirect did not produce an authorization code");
                Ok(None)
            }
        }
    }
}

/// Waits on a subscription until a code arrives.
///
/// Resolves to `None` only if the correlator itself is dropped.
pub async fn next_code(receiver: &mut watch::Receiver<Option<String>>) -> Option<String> {
    loop {
        if receiver.changed().await.is_err() {
            return None;
        }
        let current = receiver.borrow_and_update().clone();
        if current.is_some() {
            return current;
        }
    }
}
