use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use accessibility_ipc::codec::MAX_ALLOW_SIZE;
use accessibility_ipc::dispatch::host;
use accessibility_ipc::error::{RetError, RetResult};
use accessibility_ipc::interfaces::{
    element_operator_callback, manager_service, AbilityClientProxy, ElementOperator,
    ElementOperatorCallback, ElementOperatorCallbackProxy, ElementOperatorCallbackStub,
    ElementOperatorProxy, ElementOperatorStub, ManagerService,
};
use accessibility_ipc::model::{
    capability, AbilityInfo, ActionType, ElementBasicInfo, ElementInfo, FocusMoveDirection,
    FocusType, SearchMode,
};
use accessibility_ipc::permission::WRITE_ACCESSIBILITY_CONFIG;
use accessibility_ipc::{AbilitySession, AccessibilityManager, IpcConfig};
use ipc_transport::{
    CallMode, CallerIdentity, IdentityScope, Parcel, ParcelError, StubError, TransportConfig,
    TransportError, PING_TRANSACTION,
};
use parking_lot::Mutex;

const WINDOW: i32 = 8;
const ABILITY: &str = "com.example.reader/ScreenReader";

fn system() -> CallerIdentity {
    CallerIdentity::new(1, 1000).with_system_app()
}

fn settings_app() -> CallerIdentity {
    CallerIdentity::new(10, 1000)
        .with_system_app()
        .with_permission(WRITE_ACCESSIBILITY_CONFIG)
}

fn enable_request(descriptor: &str, name: &str) -> Parcel {
    let mut data = Parcel::new();
    data.write_interface_token(descriptor).unwrap();
    data.write_string(name).unwrap();
    data.write_u32(capability::RETRIEVE).unwrap();
    data
}

fn installed_manager() -> Arc<AccessibilityManager> {
    let manager = AccessibilityManager::new(system(), IpcConfig::default());
    manager.install_ability(AbilityInfo::new(
        "com.example.reader",
        "ScreenReader",
        capability::RETRIEVE,
    ));
    manager
}

#[test_timeout::timeout]
fn mismatched_descriptor_is_rejected_before_any_handler() {
    let manager = installed_manager();
    let endpoint = manager.host();
    let _settings = IdentityScope::enter(settings_app());

    let mut reply = Parcel::new();
    let status = endpoint.remote().send_request(
        manager_service::codes::ENABLE_ABILITIES,
        enable_request(element_operator_callback::DESCRIPTOR, ABILITY),
        &mut reply,
        CallMode::Blocking,
    );
    assert_eq!(status, Err(TransportError::Remote(StubError::InvalidState)));
    assert!(manager.get_enabled_abilities().unwrap().is_empty());

    endpoint
        .remote()
        .send_request(
            manager_service::codes::ENABLE_ABILITIES,
            enable_request(manager_service::DESCRIPTOR, ABILITY),
            &mut reply,
            CallMode::Blocking,
        )
        .unwrap();
    assert_eq!(reply.read_i32().unwrap(), 0);
    assert_eq!(manager.get_enabled_abilities().unwrap(), vec![ABILITY.to_string()]);
}

#[test_timeout::timeout]
fn unknown_codes_fall_back_to_base_transactions() {
    let manager = installed_manager();
    let endpoint = manager.host();
    let remote = endpoint.remote();

    let mut reply = Parcel::new();
    let mut data = Parcel::new();
    data.write_interface_token(manager_service::DESCRIPTOR).unwrap();
    assert_eq!(
        remote.send_request(9_999, data, &mut reply, CallMode::Blocking),
        Err(TransportError::Remote(StubError::UnknownTransaction(9_999)))
    );

    let mut data = Parcel::new();
    data.write_interface_token(manager_service::DESCRIPTOR).unwrap();
    remote
        .send_request(PING_TRANSACTION, data, &mut reply, CallMode::Blocking)
        .unwrap();

    // the endpoint keeps serving afterwards
    assert_eq!(manager.get_active_window().unwrap(), -1);
    assert!(remote.is_alive());
}

#[test_timeout::timeout]
fn permission_is_checked_before_arguments_are_decoded() {
    let manager = installed_manager();
    let endpoint = manager.host();
    let garbage = || {
        let mut data = Parcel::new();
        data.write_interface_token(manager_service::DESCRIPTOR).unwrap();
        data.write_u32(u32::MAX).unwrap();
        data
    };

    let mut reply = Parcel::new();
    {
        let _caller = IdentityScope::enter(CallerIdentity::new(70, 20010070));
        endpoint
            .remote()
            .send_request(
                manager_service::codes::ENABLE_ABILITIES,
                garbage(),
                &mut reply,
                CallMode::Blocking,
            )
            .unwrap();
        assert_eq!(reply.read_i32().unwrap(), RetError::NotSystemApp.code());
    }
    {
        let _caller = IdentityScope::enter(CallerIdentity::new(71, 1000).with_system_app());
        endpoint
            .remote()
            .send_request(
                manager_service::codes::ENABLE_ABILITIES,
                garbage(),
                &mut reply,
                CallMode::Blocking,
            )
            .unwrap();
        assert_eq!(reply.read_i32().unwrap(), RetError::NoPermission.code());
    }

    let _settings = IdentityScope::enter(settings_app());
    let status = endpoint.remote().send_request(
        manager_service::codes::ENABLE_ABILITIES,
        garbage(),
        &mut reply,
        CallMode::Blocking,
    );
    assert!(matches!(
        status,
        Err(TransportError::Remote(StubError::InvalidValue(_)))
    ));
    assert!(manager.get_enabled_abilities().unwrap().is_empty());
}

/// Counts answers; used to prove hostile batches never reach the handler.
struct CountingCallback(AtomicUsize);

impl CountingCallback {
    fn hit(&self) -> RetResult<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl ElementOperatorCallback for CountingCallback {
    fn set_search_element_info_by_accessibility_id_result(&self, _: Vec<ElementInfo>, _: i32) -> RetResult<()> {
        self.hit()
    }
    fn set_search_element_info_by_text_result(&self, _: Vec<ElementInfo>, _: i32) -> RetResult<()> {
        self.hit()
    }
    fn set_find_focused_element_info_result(&self, _: ElementInfo, _: i32) -> RetResult<()> {
        self.hit()
    }
    fn set_focus_move_search_result(&self, _: ElementInfo, _: i32) -> RetResult<()> {
        self.hit()
    }
    fn set_execute_action_result(&self, _: bool, _: i32) -> RetResult<()> {
        self.hit()
    }
    fn set_cursor_result(&self, _: i32, _: i32) -> RetResult<()> {
        self.hit()
    }
    fn set_search_default_focus_by_window_id_result(&self, _: Vec<ElementInfo>, _: i32) -> RetResult<()> {
        self.hit()
    }
}

#[test_timeout::timeout]
fn oversized_batch_count_never_reaches_handler() {
    let callback = Arc::new(CountingCallback(AtomicUsize::new(0)));
    let endpoint = host(
        ElementOperatorCallbackStub::new(Arc::clone(&callback)),
        CallerIdentity::new(30, 20010030),
        TransportConfig::default(),
    );

    let mut data = Parcel::new();
    data.write_interface_token(element_operator_callback::DESCRIPTOR).unwrap();
    data.write_i32(7).unwrap();
    data.write_u32(MAX_ALLOW_SIZE as u32 + 1).unwrap();
    let mut reply = Parcel::new();
    let status = endpoint.remote().send_request(
        element_operator_callback::codes::SET_SEARCH_ELEMENT_INFO_BY_ACCESSIBILITY_ID_RESULT,
        data,
        &mut reply,
        CallMode::Blocking,
    );
    assert_eq!(
        status,
        Err(TransportError::Remote(StubError::InvalidValue(
            ParcelError::CountOutOfBounds {
                count: MAX_ALLOW_SIZE as u32 + 1,
                max: MAX_ALLOW_SIZE,
            }
        )))
    );

    let mut data = Parcel::new();
    data.write_interface_token(element_operator_callback::DESCRIPTOR).unwrap();
    data.write_i32(7).unwrap();
    data.write_u32(0).unwrap();
    endpoint
        .remote()
        .send_request(
            element_operator_callback::codes::SET_SEARCH_ELEMENT_INFO_BY_ACCESSIBILITY_ID_RESULT,
            data,
            &mut reply,
            CallMode::Blocking,
        )
        .unwrap();
    assert_eq!(callback.0.load(Ordering::SeqCst), 1);
}

#[derive(Debug, Clone, PartialEq)]
enum Seen {
    Search(i32),
    Touch,
}

/// Records calls in arrival order and keeps callbacks so answers can be
/// sent whenever the test decides.
#[derive(Default)]
struct HoldingOperator {
    seen: Mutex<Vec<Seen>>,
    held: Mutex<Vec<(i32, Arc<dyn ElementOperatorCallback>)>>,
}

impl HoldingOperator {
    fn wait_for(&self, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.held.lock().len() < count {
            assert!(Instant::now() < deadline, "search never arrived");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    fn answer(&self, index: usize, infos: Vec<ElementInfo>) -> RetResult<()> {
        let (request_id, callback) = {
            let held = self.held.lock();
            let (request_id, callback) = &held[index];
            (*request_id, Arc::clone(callback))
        };
        callback.set_search_element_info_by_accessibility_id_result(infos, request_id)
    }
}

impl ElementOperator for HoldingOperator {
    fn search_element_info_by_accessibility_id(
        &self,
        _element_id: i64,
        request_id: i32,
        callback: Arc<dyn ElementOperatorCallback>,
        _mode: SearchMode,
        _is_filter: bool,
    ) -> RetResult<()> {
        self.seen.lock().push(Seen::Search(request_id));
        self.held.lock().push((request_id, callback));
        Ok(())
    }

    fn search_element_infos_by_text(
        &self,
        _element_id: i64,
        _text: &str,
        _request_id: i32,
        _callback: Arc<dyn ElementOperatorCallback>,
    ) -> RetResult<()> {
        Ok(())
    }

    fn find_focused_element_info(
        &self,
        _element_id: i64,
        _focus_type: FocusType,
        _request_id: i32,
        _callback: Arc<dyn ElementOperatorCallback>,
    ) -> RetResult<()> {
        Ok(())
    }

    fn focus_move_search(
        &self,
        _element_id: i64,
        _direction: FocusMoveDirection,
        _request_id: i32,
        _callback: Arc<dyn ElementOperatorCallback>,
    ) -> RetResult<()> {
        Ok(())
    }

    fn execute_action(
        &self,
        _element_id: i64,
        _action: ActionType,
        _arguments: &BTreeMap<String, String>,
        _request_id: i32,
        _callback: Arc<dyn ElementOperatorCallback>,
    ) -> RetResult<()> {
        Ok(())
    }

    fn get_cursor_position(
        &self,
        _element_id: i64,
        _request_id: i32,
        _callback: Arc<dyn ElementOperatorCallback>,
    ) -> RetResult<()> {
        Ok(())
    }

    fn clear_focus(&self) -> RetResult<()> {
        Ok(())
    }

    fn outside_touch(&self) -> RetResult<()> {
        self.seen.lock().push(Seen::Touch);
        Ok(())
    }

    fn set_child_tree_id_and_win_id(&self, _element_id: i64, _tree_id: i32, _child_window_id: i32) -> RetResult<()> {
        Ok(())
    }

    fn set_belong_tree_id(&self, _tree_id: i32) -> RetResult<()> {
        Ok(())
    }

    fn set_parent_window_id(&self, _parent_window_id: i32) -> RetResult<()> {
        Ok(())
    }

    fn search_default_focus_by_window_id(
        &self,
        _window_id: i32,
        _request_id: i32,
        _callback: Arc<dyn ElementOperatorCallback>,
        _page_id: i32,
    ) -> RetResult<()> {
        Ok(())
    }
}

#[test_timeout::timeout]
fn deferred_searches_keep_send_order_with_one_way_calls() {
    let operator = Arc::new(HoldingOperator::default());
    let endpoint = host(
        ElementOperatorStub::new(Arc::clone(&operator)),
        CallerIdentity::new(20, 20010020),
        TransportConfig::default(),
    );
    let callback_endpoint = host(
        ElementOperatorCallbackStub::new(Arc::new(CountingCallback(AtomicUsize::new(0)))),
        CallerIdentity::new(30, 20010030),
        TransportConfig::default(),
    );
    let callback = ElementOperatorCallbackProxy::shared(callback_endpoint.remote());
    let proxy = ElementOperatorProxy::new(endpoint.remote());

    for request_id in 1..=3 {
        proxy
            .search_element_info_by_accessibility_id(
                -1,
                request_id,
                Arc::clone(&callback),
                SearchMode::NONE,
                false,
            )
            .unwrap();
    }
    proxy.outside_touch().unwrap();
    proxy
        .search_element_info_by_accessibility_id(-1, 4, callback, SearchMode::NONE, false)
        .unwrap();

    operator.wait_for(4);
    assert_eq!(
        *operator.seen.lock(),
        vec![
            Seen::Search(1),
            Seen::Search(2),
            Seen::Search(3),
            Seen::Touch,
            Seen::Search(4),
        ]
    );
}

#[test_timeout::timeout]
fn null_callback_fails_before_sending() {
    let operator = Arc::new(HoldingOperator::default());
    let endpoint = host(
        ElementOperatorStub::new(Arc::clone(&operator)),
        CallerIdentity::new(20, 20010020),
        TransportConfig::default(),
    );
    let proxy = ElementOperatorProxy::new(endpoint.remote());
    let local: Arc<dyn ElementOperatorCallback> = Arc::new(CountingCallback(AtomicUsize::new(0)));

    assert_eq!(
        proxy.execute_action(3, ActionType::Click, &BTreeMap::new(), 1, Arc::clone(&local)),
        Err(RetError::NullPtr)
    );
    assert_eq!(
        proxy.search_element_info_by_accessibility_id(3, 2, local, SearchMode::NONE, false),
        Err(RetError::NullPtr)
    );
    std::thread::sleep(Duration::from_millis(20));
    assert!(operator.seen.lock().is_empty());
}

#[test_timeout::timeout]
fn dead_endpoint_surfaces_as_ipc_failure() {
    let operator = Arc::new(HoldingOperator::default());
    let endpoint = host(
        ElementOperatorStub::new(Arc::clone(&operator)),
        CallerIdentity::new(20, 20010020),
        TransportConfig::default(),
    );
    let proxy = ElementOperatorProxy::new(endpoint.remote());
    endpoint.shutdown();
    assert_eq!(proxy.clear_focus(), Err(RetError::IpcFailed));
}

#[test_timeout::timeout]
fn silent_operator_times_out_and_late_answer_is_dropped() {
    let timeout = Duration::from_millis(300);
    let config = IpcConfig::default().with_search_timeout(timeout);
    let manager = AccessibilityManager::new(system(), config.clone());
    let operator = Arc::new(HoldingOperator::default());
    let operator_endpoint = host(
        ElementOperatorStub::new(Arc::clone(&operator)),
        CallerIdentity::new(20, 20010020),
        config.transport(),
    );
    manager
        .register_element_operator(WINDOW, ElementOperatorProxy::shared(operator_endpoint.remote()))
        .unwrap();
    manager.install_ability(AbilityInfo::new(
        "com.example.reader",
        "ScreenReader",
        capability::RETRIEVE,
    ));
    manager.enable_abilities(ABILITY, capability::RETRIEVE).unwrap();

    let session = AbilitySession::new(CallerIdentity::new(30, 20010030), config);
    let client_endpoint = session.host();
    manager
        .connect_ability(ABILITY, AbilityClientProxy::shared(client_endpoint.remote()))
        .unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while !session.is_connected() {
        assert!(Instant::now() < deadline, "channel never reached the session");
        std::thread::sleep(Duration::from_millis(5));
    }

    let target = ElementBasicInfo::root(WINDOW, -1);
    let started = Instant::now();
    assert_eq!(
        session.search_element_info_by_accessibility_id(target, SearchMode::NONE),
        Err(RetError::TimeOut)
    );
    assert!(started.elapsed() >= timeout);
    assert_eq!(session.outstanding_queries(), 0);

    // the first callback endpoint went away with its query
    operator.wait_for(1);
    assert_eq!(
        operator.answer(0, vec![ElementInfo::new(WINDOW, 1)]),
        Err(RetError::IpcFailed)
    );

    let second = {
        let session = Arc::clone(&session);
        std::thread::spawn(move || session.search_element_info_by_accessibility_id(target, SearchMode::NONE))
    };
    operator.wait_for(2);
    operator.answer(1, vec![ElementInfo::new(WINDOW, 2)]).unwrap();
    let infos = second.join().unwrap().unwrap();
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].element_id, 2);
    assert_eq!(session.outstanding_queries(), 0);
}
