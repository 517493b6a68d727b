//! External collaborators.
//!
//! The transport, wallet login and delegation signing live outside this
//! crate. The session only sees these traits, so tests and the CLI can
//! plug in in-memory implementations.

use async_trait::async_trait;
use serde_json::Value;

use ith_core::{Principal, RegistrationId};
use ith_state::GetDelegationRequest;

use crate::error::{CallError, TransportError};

/// Calls on the holder contract.
///
/// Every method settles as `Ok`, a structured contract error
/// ([`CallError::Api`]) or a transport failure ([`CallError::Transport`]).
#[async_trait]
pub trait HolderChannel: Send + Sync {
    /// Read the holder snapshot as a decoded structured value.
    async fn fetch_holder_information(&self) -> Result<Value, CallError>;

    // Capture
    async fn start_capture_identity(&self) -> Result<(), CallError>;
    async fn confirm_holder_authn_method_registration(&self) -> Result<(), CallError>;
    async fn protected_authn_method_deleted(&self) -> Result<(), CallError>;

    // Sale deal
    async fn set_sale_intention(&self) -> Result<(), CallError>;
    async fn set_sale_offer(&self, price: u64) -> Result<(), CallError>;
    async fn change_sale_intention(&self) -> Result<(), CallError>;
    async fn cancel_sale_intention(&self) -> Result<(), CallError>;
    async fn accept_buyer_offer(&self, buyer: &Principal, price: u64) -> Result<(), CallError>;
    async fn set_buyer_offer(&self, price: u64) -> Result<(), CallError>;
    async fn accept_seller_offer(&self, price: u64) -> Result<(), CallError>;
    async fn cancel_buyer_offer(&self) -> Result<(), CallError>;

    // Release
    async fn start_release_identity(&self) -> Result<(), CallError>;
    async fn confirm_owner_authn_method_registration(&self) -> Result<(), CallError>;
    async fn restart_release_identity(
        &self,
        registration_id: Option<&RegistrationId>,
    ) -> Result<(), CallError>;
    async fn delete_holder_authn_method(&self) -> Result<(), CallError>;

    async fn add_contract_controller(&self, controller: &Principal) -> Result<(), CallError>;

    // Automatic processing
    async fn receive_delegation(&self, delegation: Vec<u8>) -> Result<(), CallError>;
    async fn retry_prepare_delegation(&self) -> Result<(), CallError>;
}

/// The authenticated caller.
pub trait IdentityProvider: Send + Sync {
    /// Principal of the caller, `None` when not logged in.
    fn caller(&self) -> Option<Principal>;
}

/// Runs a presigned read request and returns the raw reply.
#[async_trait]
pub trait PresignedQueryExecutor: Send + Sync {
    async fn execute(&self, request: &GetDelegationRequest) -> Result<Vec<u8>, TransportError>;
}

/// An identity provider with a fixed caller.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity(pub Option<Principal>);

impl IdentityProvider for StaticIdentity {
    fn caller(&self) -> Option<Principal> {
        self.0.clone()
    }
}
