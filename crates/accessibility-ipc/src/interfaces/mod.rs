//! Trait, proxy and stub for every interface in the family.
//!
//! Operation codes are grouped in bands of one hundred per interface.

pub mod ability_channel;
pub mod ability_client;
pub mod element_operator;
pub mod element_operator_callback;
pub mod manager_service;
pub mod observers;

pub use ability_channel::{AbilityChannel, AbilityChannelProxy, AbilityChannelStub};
pub use ability_client::{AbilityClient, AbilityClientProxy, AbilityClientStub};
pub use element_operator::{ElementOperator, ElementOperatorProxy, ElementOperatorStub};
pub use element_operator_callback::{
    ElementOperatorCallback, ElementOperatorCallbackProxy, ElementOperatorCallbackStub,
};
pub use manager_service::{ManagerService, ManagerServiceProxy, ManagerServiceStub};
pub use observers::{
    CaptionObserver, CaptionObserverProxy, CaptionObserverStub, ConfigChange, ConfigObserver,
    ConfigObserverProxy, ConfigObserverStub, EnableAbilityListsObserver,
    EnableAbilityListsObserverProxy, EnableAbilityListsObserverStub, StateObserver,
    StateObserverProxy, StateObserverStub,
};
