//! The system-wide accessibility manager as seen by applications, settings
//! and accessibility services.

use std::sync::Arc;

use ipc_transport::{CallContext, CallMode, Parcel, RemoteObject, StubError};
use tracing::debug;

use super::ability_client::{AbilityClient, AbilityClientProxy};
use super::element_operator::{ElementOperator, ElementOperatorProxy};
use super::observers::{
    CaptionObserver, CaptionObserverProxy, ConfigObserver, ConfigObserverProxy,
    EnableAbilityListsObserver, EnableAbilityListsObserverProxy, StateObserver, StateObserverProxy,
};
use crate::codec::{ParcelExt, MAX_ALLOW_SIZE};
use crate::dispatch::{
    object_of, read_required_object, write_result, write_ret, InterfaceStub, ProxyCore, RouteSpec,
};
use crate::error::RetResult;
use crate::model::{AbilityInfo, AbilityStateType, CaptionProperty, EventInfo, RegistrationPara};
use crate::permission::{Capability, READ_ACCESSIBILITY_CONFIG, WRITE_ACCESSIBILITY_CONFIG};

pub const DESCRIPTOR: &str = "OHOS.Accessibility.IAccessibleAbilityManagerService";

pub mod codes {
    pub const SEND_EVENT: u32 = 800;
    pub const REGISTER_STATE_OBSERVER: u32 = 801;
    pub const GET_ABILITY_LIST: u32 = 802;
    pub const REGISTER_ELEMENT_OPERATOR: u32 = 803;
    pub const REGISTER_ELEMENT_OPERATOR_WITH_PARAMETER: u32 = 804;
    pub const DEREGISTER_ELEMENT_OPERATOR: u32 = 805;
    pub const GET_ENABLED_ABILITIES: u32 = 806;
    pub const ENABLE_ABILITIES: u32 = 807;
    pub const DISABLE_ABILITY: u32 = 808;
    pub const ENABLE_UI_TEST_ABILITY: u32 = 809;
    pub const DISABLE_UI_TEST_ABILITY: u32 = 810;
    pub const GET_ACTIVE_WINDOW: u32 = 811;
    pub const REGISTER_CONFIG_OBSERVER: u32 = 812;
    pub const REGISTER_ENABLE_ABILITY_LISTS_OBSERVER: u32 = 813;
    pub const REGISTER_CAPTION_OBSERVER: u32 = 814;
    pub const GET_CAPTION_PROPERTY: u32 = 815;
    pub const SET_CAPTION_PROPERTY: u32 = 816;
    pub const GET_FOCUSED_WINDOW_ID: u32 = 817;
}

pub trait ManagerService: Send + Sync + 'static {
    fn send_event(&self, event: EventInfo) -> RetResult<()>;

    /// Returns the current state bits.
    fn register_state_observer(&self, observer: Arc<dyn StateObserver>) -> RetResult<u32>;

    /// `ability_types` is a type mask; `u32::MAX` matches every type.
    fn get_ability_list(
        &self,
        ability_types: u32,
        state: AbilityStateType,
    ) -> RetResult<Vec<AbilityInfo>>;

    fn register_element_operator(
        &self,
        window_id: i32,
        operator: Arc<dyn ElementOperator>,
    ) -> RetResult<()>;

    /// Registers an operator for a tree embedded in another window and returns
    /// the tree id allocated for it.
    fn register_element_operator_with_parameter(
        &self,
        parameter: RegistrationPara,
        operator: Arc<dyn ElementOperator>,
    ) -> RetResult<i32>;

    fn deregister_element_operator(&self, window_id: i32) -> RetResult<()>;

    fn get_enabled_abilities(&self) -> RetResult<Vec<String>>;

    fn enable_abilities(&self, name: &str, capabilities: u32) -> RetResult<()>;

    fn disable_ability(&self, name: &str) -> RetResult<()>;

    fn enable_ui_test_ability(&self, client: Arc<dyn AbilityClient>) -> RetResult<()>;

    fn disable_ui_test_ability(&self) -> RetResult<()>;

    fn get_active_window(&self) -> RetResult<i32>;

    fn register_config_observer(&self, observer: Arc<dyn ConfigObserver>) -> RetResult<()>;

    fn register_enable_ability_lists_observer(
        &self,
        observer: Arc<dyn EnableAbilityListsObserver>,
    ) -> RetResult<()>;

    fn register_caption_observer(&self, observer: Arc<dyn CaptionObserver>) -> RetResult<()>;

    fn get_caption_property(&self) -> RetResult<CaptionProperty>;

    fn set_caption_property(&self, property: CaptionProperty) -> RetResult<()>;

    fn get_focused_window_id(&self) -> RetResult<i32>;
}

#[derive(Debug, Clone)]
pub struct ManagerServiceProxy {
    core: ProxyCore,
}

impl ManagerServiceProxy {
    pub fn new(remote: RemoteObject) -> Self {
        Self {
            core: ProxyCore::new(remote, DESCRIPTOR),
        }
    }

    fn register(&self, code: u32, name: &'static str, object: Option<RemoteObject>) -> RetResult<()> {
        let object = object_of(object)?;
        self.core
            .call_ret(code, name, |data| data.write_remote_object(Some(&object)))
    }
}

impl ManagerService for ManagerServiceProxy {
    fn send_event(&self, event: EventInfo) -> RetResult<()> {
        self.core
            .send(codes::SEND_EVENT, "send_event", CallMode::OneWay, |data| {
                data.write_parcelable(&event)
            })
    }

    fn register_state_observer(&self, observer: Arc<dyn StateObserver>) -> RetResult<u32> {
        let observer = object_of(observer.as_object())?;
        self.core.call(
            codes::REGISTER_STATE_OBSERVER,
            "register_state_observer",
            |data| data.write_remote_object(Some(&observer)),
            |reply| reply.read_u32(),
        )
    }

    fn get_ability_list(
        &self,
        ability_types: u32,
        state: AbilityStateType,
    ) -> RetResult<Vec<AbilityInfo>> {
        self.core.call(
            codes::GET_ABILITY_LIST,
            "get_ability_list",
            |data| {
                data.write_u32(ability_types)?;
                data.write_enum(state)
            },
            |reply| reply.read_parcelable_vec(MAX_ALLOW_SIZE),
        )
    }

    fn register_element_operator(
        &self,
        window_id: i32,
        operator: Arc<dyn ElementOperator>,
    ) -> RetResult<()> {
        let operator = object_of(operator.as_object())?;
        self.core.call_ret(
            codes::REGISTER_ELEMENT_OPERATOR,
            "register_element_operator",
            |data| {
                data.write_i32(window_id)?;
                data.write_remote_object(Some(&operator))
            },
        )
    }

    fn register_element_operator_with_parameter(
        &self,
        parameter: RegistrationPara,
        operator: Arc<dyn ElementOperator>,
    ) -> RetResult<i32> {
        let operator = object_of(operator.as_object())?;
        self.core.call(
            codes::REGISTER_ELEMENT_OPERATOR_WITH_PARAMETER,
            "register_element_operator_with_parameter",
            |data| {
                data.write_parcelable(&parameter)?;
                data.write_remote_object(Some(&operator))
            },
            |reply| reply.read_i32(),
        )
    }

    fn deregister_element_operator(&self, window_id: i32) -> RetResult<()> {
        self.core.call_ret(
            codes::DEREGISTER_ELEMENT_OPERATOR,
            "deregister_element_operator",
            |data| data.write_i32(window_id),
        )
    }

    fn get_enabled_abilities(&self) -> RetResult<Vec<String>> {
        self.core.call(
            codes::GET_ENABLED_ABILITIES,
            "get_enabled_abilities",
            |_| Ok(()),
            |reply| reply.read_string_vec(MAX_ALLOW_SIZE),
        )
    }

    fn enable_abilities(&self, name: &str, capabilities: u32) -> RetResult<()> {
        self.core
            .call_ret(codes::ENABLE_ABILITIES, "enable_abilities", |data| {
                data.write_string(name)?;
                data.write_u32(capabilities)
            })
    }

    fn disable_ability(&self, name: &str) -> RetResult<()> {
        self.core
            .call_ret(codes::DISABLE_ABILITY, "disable_ability", |data| {
                data.write_string(name)
            })
    }

    fn enable_ui_test_ability(&self, client: Arc<dyn AbilityClient>) -> RetResult<()> {
        self.register(
            codes::ENABLE_UI_TEST_ABILITY,
            "enable_ui_test_ability",
            client.as_object(),
        )
    }

    fn disable_ui_test_ability(&self) -> RetResult<()> {
        self.core.call_ret(
            codes::DISABLE_UI_TEST_ABILITY,
            "disable_ui_test_ability",
            |_| Ok(()),
        )
    }

    fn get_active_window(&self) -> RetResult<i32> {
        self.core.call(
            codes::GET_ACTIVE_WINDOW,
            "get_active_window",
            |_| Ok(()),
            |reply| reply.read_i32(),
        )
    }

    fn register_config_observer(&self, observer: Arc<dyn ConfigObserver>) -> RetResult<()> {
        self.register(
            codes::REGISTER_CONFIG_OBSERVER,
            "register_config_observer",
            observer.as_object(),
        )
    }

    fn register_enable_ability_lists_observer(
        &self,
        observer: Arc<dyn EnableAbilityListsObserver>,
    ) -> RetResult<()> {
        self.register(
            codes::REGISTER_ENABLE_ABILITY_LISTS_OBSERVER,
            "register_enable_ability_lists_observer",
            observer.as_object(),
        )
    }

    fn register_caption_observer(&self, observer: Arc<dyn CaptionObserver>) -> RetResult<()> {
        self.register(
            codes::REGISTER_CAPTION_OBSERVER,
            "register_caption_observer",
            observer.as_object(),
        )
    }

    fn get_caption_property(&self) -> RetResult<CaptionProperty> {
        self.core.call(
            codes::GET_CAPTION_PROPERTY,
            "get_caption_property",
            |_| Ok(()),
            |reply| reply.read_parcelable(),
        )
    }

    fn set_caption_property(&self, property: CaptionProperty) -> RetResult<()> {
        self.core.call_ret(
            codes::SET_CAPTION_PROPERTY,
            "set_caption_property",
            |data| data.write_parcelable(&property),
        )
    }

    fn get_focused_window_id(&self) -> RetResult<i32> {
        self.core.call(
            codes::GET_FOCUSED_WINDOW_ID,
            "get_focused_window_id",
            |_| Ok(()),
            |reply| reply.read_i32(),
        )
    }
}

pub struct ManagerServiceStub<T: ?Sized> {
    inner: Arc<T>,
}

impl<T: ManagerService + ?Sized> ManagerServiceStub<T> {
    pub fn new(inner: Arc<T>) -> Self {
        Self { inner }
    }
}

const WRITE_CONFIG: Capability = Capability::SystemAppWithPermission(WRITE_ACCESSIBILITY_CONFIG);

impl<T: ManagerService + ?Sized> InterfaceStub for ManagerServiceStub<T> {
    const DESCRIPTOR: &'static str = DESCRIPTOR;
    const ROUTES: &'static [RouteSpec] = &[
        RouteSpec::open(codes::SEND_EVENT, "send_event"),
        RouteSpec::open(codes::REGISTER_STATE_OBSERVER, "register_state_observer"),
        RouteSpec::open(codes::GET_ABILITY_LIST, "get_ability_list"),
        RouteSpec::open(codes::REGISTER_ELEMENT_OPERATOR, "register_element_operator"),
        RouteSpec::open(
            codes::REGISTER_ELEMENT_OPERATOR_WITH_PARAMETER,
            "register_element_operator_with_parameter",
        ),
        RouteSpec::open(codes::DEREGISTER_ELEMENT_OPERATOR, "deregister_element_operator"),
        RouteSpec::open(codes::GET_ENABLED_ABILITIES, "get_enabled_abilities"),
        RouteSpec::guarded(codes::ENABLE_ABILITIES, "enable_abilities", WRITE_CONFIG),
        RouteSpec::guarded(codes::DISABLE_ABILITY, "disable_ability", WRITE_CONFIG),
        RouteSpec::guarded(
            codes::ENABLE_UI_TEST_ABILITY,
            "enable_ui_test_ability",
            Capability::DebugHarness,
        ),
        RouteSpec::guarded(
            codes::DISABLE_UI_TEST_ABILITY,
            "disable_ui_test_ability",
            Capability::DebugHarness,
        ),
        RouteSpec::open(codes::GET_ACTIVE_WINDOW, "get_active_window"),
        RouteSpec::open(codes::REGISTER_CONFIG_OBSERVER, "register_config_observer"),
        RouteSpec::open(
            codes::REGISTER_ENABLE_ABILITY_LISTS_OBSERVER,
            "register_enable_ability_lists_observer",
        ),
        RouteSpec::open(codes::REGISTER_CAPTION_OBSERVER, "register_caption_observer"),
        RouteSpec::guarded(
            codes::GET_CAPTION_PROPERTY,
            "get_caption_property",
            Capability::Permission(READ_ACCESSIBILITY_CONFIG),
        ),
        RouteSpec::guarded(codes::SET_CAPTION_PROPERTY, "set_caption_property", WRITE_CONFIG),
        RouteSpec::open(codes::GET_FOCUSED_WINDOW_ID, "get_focused_window_id"),
    ];

    fn handle(
        &self,
        code: u32,
        data: &mut Parcel,
        reply: &mut Parcel,
        _ctx: &CallContext,
    ) -> Result<(), StubError> {
        let inner = &self.inner;
        match code {
            codes::SEND_EVENT => {
                let event = data.read_parcelable()?;
                if let Err(err) = inner.send_event(event) {
                    debug!(target: "a11y::dispatch", interface = DESCRIPTOR, code, error = %err, "one-way call failed");
                }
                Ok(())
            }
            codes::REGISTER_STATE_OBSERVER => {
                let observer = StateObserverProxy::shared(read_required_object(data)?);
                write_result(reply, inner.register_state_observer(observer), |reply, state| {
                    reply.write_u32(state)
                })
            }
            codes::GET_ABILITY_LIST => {
                let ability_types = data.read_u32()?;
                let state = data.read_enum()?;
                write_result(
                    reply,
                    inner.get_ability_list(ability_types, state),
                    |reply, abilities| reply.write_parcelable_vec(&abilities),
                )
            }
            codes::REGISTER_ELEMENT_OPERATOR => {
                let window_id = data.read_i32()?;
                let operator = ElementOperatorProxy::shared(read_required_object(data)?);
                write_ret(reply, inner.register_element_operator(window_id, operator))
            }
            codes::REGISTER_ELEMENT_OPERATOR_WITH_PARAMETER => {
                let parameter = data.read_parcelable()?;
                let operator = ElementOperatorProxy::shared(read_required_object(data)?);
                write_result(
                    reply,
                    inner.register_element_operator_with_parameter(parameter, operator),
                    |reply, tree_id| reply.write_i32(tree_id),
                )
            }
            codes::DEREGISTER_ELEMENT_OPERATOR => {
                let window_id = data.read_i32()?;
                write_ret(reply, inner.deregister_element_operator(window_id))
            }
            codes::GET_ENABLED_ABILITIES => {
                write_result(reply, inner.get_enabled_abilities(), |reply, names| {
                    reply.write_string_vec(&names)
                })
            }
            codes::ENABLE_ABILITIES => {
                let name = data.read_string()?;
                let capabilities = data.read_u32()?;
                write_ret(reply, inner.enable_abilities(&name, capabilities))
            }
            codes::DISABLE_ABILITY => {
                let name = data.read_string()?;
                write_ret(reply, inner.disable_ability(&name))
            }
            codes::ENABLE_UI_TEST_ABILITY => {
                let client = AbilityClientProxy::shared(read_required_object(data)?);
                write_ret(reply, inner.enable_ui_test_ability(client))
            }
            codes::DISABLE_UI_TEST_ABILITY => write_ret(reply, inner.disable_ui_test_ability()),
            codes::GET_ACTIVE_WINDOW => write_result(reply, inner.get_active_window(), |reply, id| {
                reply.write_i32(id)
            }),
            codes::REGISTER_CONFIG_OBSERVER => {
                let observer = ConfigObserverProxy::shared(read_required_object(data)?);
                write_ret(reply, inner.register_config_observer(observer))
            }
            codes::REGISTER_ENABLE_ABILITY_LISTS_OBSERVER => {
                let observer = EnableAbilityListsObserverProxy::shared(read_required_object(data)?);
                write_ret(reply, inner.register_enable_ability_lists_observer(observer))
            }
            codes::REGISTER_CAPTION_OBSERVER => {
                let observer = CaptionObserverProxy::shared(read_required_object(data)?);
                write_ret(reply, inner.register_caption_observer(observer))
            }
            codes::GET_CAPTION_PROPERTY => {
                write_result(reply, inner.get_caption_property(), |reply, property| {
                    reply.write_parcelable(&property)
                })
            }
            codes::SET_CAPTION_PROPERTY => {
                let property = data.read_parcelable()?;
                write_ret(reply, inner.set_caption_property(property))
            }
            codes::GET_FOCUSED_WINDOW_ID => {
                write_result(reply, inner.get_focused_window_id(), |reply, id| {
                    reply.write_i32(id)
                })
            }
            other => Err(StubError::UnknownTransaction(other)),
        }
    }
}
