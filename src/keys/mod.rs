//! Outline access-key provisioning: records, durable store, and the
//! per-requester conversation that drives issuance.

pub mod conversation;
pub mod models;
pub mod store;

pub use conversation::{ConversationEvent, ConversationState, Provisioner};
pub use models::{CipherSuite, CredentialRecord, NewCredential};
pub use store::{CredentialStore, FileStore, StoreError};
