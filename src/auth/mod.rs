//! Gmail account connection: OAuth consent flow, pending-flow tracking and
//! the stored credential file.

pub mod credentials;
pub mod flow;
pub mod pending;

pub use credentials::{CredentialStore, StoredCredentials};
pub use flow::OAuthClient;
pub use pending::{PendingFlow, PendingFlows, spawn_sweep_task};
