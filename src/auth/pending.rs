//! OAuth flows awaiting their callback, keyed by state token.
//!
//! `/oauth/start` registers a flow under a fresh random state token and the
//! callback consumes it. Several operators (or browser tabs) can have flows
//! in flight at once; each resolves only against its own token.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// Context remembered between the authorization redirect and the callback.
#[derive(Debug, Clone)]
pub struct PendingFlow {
    pub redirect_uri: String,
    created_at: Instant,
}

impl PendingFlow {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() >= ttl
    }
}

/// In-memory keyed store of started OAuth flows.
pub struct PendingFlows {
    ttl: Duration,
    flows: RwLock<HashMap<String, PendingFlow>>,
}

impl PendingFlows {
    pub fn new(ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            ttl,
            flows: RwLock::new(HashMap::new()),
        })
    }

    /// Register a new flow and return its state token.
    pub async fn start(&self, redirect_uri: impl Into<String>) -> String {
        let state = Uuid::new_v4().simple().to_string();
        let flow = PendingFlow {
            redirect_uri: redirect_uri.into(),
            created_at: Instant::now(),
        };
        debug!(redirect_uri = %flow.redirect_uri, "OAuth flow registered");
        self.flows.write().await.insert(state.clone(), flow);
        state
    }

    /// Consume the flow for `state`. Unknown and expired tokens yield `None`.
    pub async fn take(&self, state: &str) -> Option<PendingFlow> {
        let flow = self.flows.write().await.remove(state)?;
        if flow.is_expired(self.ttl) {
            debug!("OAuth state expired");
            return None;
        }
        Some(flow)
    }

    /// Drop expired flows. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut flows = self.flows.write().await;
        let before = flows.len();
        flows.retain(|_, flow| !flow.is_expired(self.ttl));
        let purged = before - flows.len();
        if purged > 0 {
            info!(count = purged, "Expired pending OAuth flows");
        }
        purged
    }

    pub async fn len(&self) -> usize {
        self.flows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.flows.read().await.is_empty()
    }
}

/// Periodically purge expired flows.
pub fn spawn_sweep_task(flows: Arc<PendingFlows>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            flows.purge_expired().await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_then_take_once() {
        let flows = PendingFlows::new(Duration::from_secs(600));
        let state = flows.start("http://localhost:8000/oauth/callback").await;

        let flow = flows.take(&state).await.unwrap();
        assert_eq!(flow.redirect_uri, "http://localhost:8000/oauth/callback");
        assert!(flows.take(&state).await.is_none());
        assert!(flows.is_empty().await);
    }

    #[tokio::test]
    async fn concurrent_flows_do_not_clobber_each_other() {
        let flows = PendingFlows::new(Duration::from_secs(600));
        let a = flows.start("http://a/oauth/callback").await;
        let b = flows.start("http://b/oauth/callback").await;
        assert_ne!(a, b);
        assert_eq!(flows.len().await, 2);

        assert_eq!(flows.take(&b).await.unwrap().redirect_uri, "http://b/oauth/callback");
        assert_eq!(flows.take(&a).await.unwrap().redirect_uri, "http://a/oauth/callback");
    }

    #[tokio::test]
    async fn unknown_state_is_rejected() {
        let flows = PendingFlows::new(Duration::from_secs(600));
        flows.start("http://a/oauth/callback").await;
        assert!(flows.take("forged").await.is_none());
        assert_eq!(flows.len().await, 1);
    }

    #[tokio::test]
    async fn expired_flows_are_rejected_and_purged() {
        let flows = PendingFlows::new(Duration::ZERO);
        let state = flows.start("http://a/oauth/callback").await;
        flows.start("http://b/oauth/callback").await;

        assert!(flows.take(&state).await.is_none());
        assert_eq!(flows.purge_expired().await, 1);
        assert!(flows.is_empty().await);
    }
}
