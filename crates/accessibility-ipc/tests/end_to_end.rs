use std::collections::BTreeMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use accessibility_ipc::dispatch::host;
use accessibility_ipc::error::{RetError, RetResult};
use accessibility_ipc::interfaces::{
    AbilityClientProxy, ElementOperator, ElementOperatorCallback, ElementOperatorCallbackProxy,
    ElementOperatorCallbackStub, ElementOperatorProxy, ManagerService, ManagerServiceProxy,
};
use accessibility_ipc::model::{
    capability, AbilityInfo, AccessibleAction, ActionType, ElementBasicInfo, ElementInfo,
    FocusMoveDirection, FocusType, GridInfo, RangeInfo, Rect, SearchMode, SpanInfo, WindowInfo,
    UNDEFINED_ID,
};
use accessibility_ipc::permission::WRITE_ACCESSIBILITY_CONFIG;
use accessibility_ipc::snapshot::action_args;
use accessibility_ipc::{AbilitySession, AccessibilityManager, IpcConfig, SnapshotOperator};
use ipc_transport::{CallerIdentity, Endpoint, IdentityScope, TransportConfig};
use parking_lot::Mutex;

const WINDOW: i32 = 3;
const ABILITY: &str = "com.example.reader/ScreenReader";

fn system() -> CallerIdentity {
    CallerIdentity::new(1, 1000).with_system_app()
}

fn app() -> CallerIdentity {
    CallerIdentity::new(20, 20010020).with_bundle_name("com.example.app")
}

fn reader() -> CallerIdentity {
    CallerIdentity::new(30, 20010030).with_bundle_name("com.example.reader")
}

fn settings_app() -> CallerIdentity {
    CallerIdentity::new(10, 1000)
        .with_system_app()
        .with_permission(WRITE_ACCESSIBILITY_CONFIG)
}

fn element(id: i64, parent: i64, children: &[i64], text: &str) -> ElementInfo {
    let mut node = ElementInfo::new(WINDOW, id);
    node.parent_id = parent;
    node.child_ids = children.to_vec();
    node.text = text.to_string();
    node.bundle_name = "com.example.app".into();
    node.component_type = "Button".into();
    node.focusable = true;
    node.rect = Rect::new(0, id as i32 * 10, 200, id as i32 * 10 + 8);
    node.actions = vec![
        AccessibleAction::new(ActionType::Click, "tap"),
        AccessibleAction::new(ActionType::AccessibilityFocus, ""),
    ];
    node
}

/// 42 -> [43, 44]; 44 -> [45]
fn page() -> Vec<ElementInfo> {
    let mut root = element(42, UNDEFINED_ID, &[43, 44], "Settings");
    root.range = RangeInfo {
        min: 0.0,
        max: 100.0,
        current: 40.0,
    };
    root.grid = GridInfo {
        row_count: 2,
        column_count: 1,
        selection_mode: 0,
    };
    let mut label = element(43, 42, &[], "Wi-Fi");
    label.spans = vec![SpanInfo {
        span_id: 1,
        span_text: "Wi".into(),
        accessibility_text: "wireless".into(),
        ..SpanInfo::default()
    }];
    let mut field = element(44, 42, &[45], "Name");
    field.editable = true;
    field.actions.push(AccessibleAction::new(ActionType::SetText, ""));
    field.actions.push(AccessibleAction::new(ActionType::SetCursorPosition, ""));
    let hint = element(45, 44, &[], "hint");
    vec![root, label, field, hint]
}

/// Manager, one application window and one connected screen reader, each on
/// its own endpoint.
struct Stack {
    manager: Arc<AccessibilityManager>,
    manager_endpoint: Endpoint,
    operator: Arc<SnapshotOperator>,
    operator_endpoint: Endpoint,
    session: Arc<AbilitySession>,
    _client_endpoint: Endpoint,
}

impl Stack {
    fn start(config: IpcConfig) -> Self {
        Self::serving(config, page())
    }

    fn serving(config: IpcConfig, nodes: Vec<ElementInfo>) -> Self {
        let manager = AccessibilityManager::new(system(), config.clone());
        let manager_endpoint = manager.host();
        let service = ManagerServiceProxy::new(manager_endpoint.remote());
        manager.update_window(WindowInfo::application(
            WINDOW,
            "com.example.app",
            Rect::new(0, 0, 200, 400),
        ));

        let operator = SnapshotOperator::new(WINDOW, nodes);
        let operator_endpoint = operator.host(app(), &config);
        {
            let _app = IdentityScope::enter(app());
            service
                .register_element_operator(
                    WINDOW,
                    ElementOperatorProxy::shared(operator_endpoint.remote()),
                )
                .unwrap();
        }

        manager.install_ability(AbilityInfo::new(
            "com.example.reader",
            "ScreenReader",
            capability::RETRIEVE | capability::GESTURE,
        ));
        {
            let _settings = IdentityScope::enter(settings_app());
            service
                .enable_abilities(ABILITY, capability::RETRIEVE | capability::GESTURE)
                .unwrap();
        }

        let session = AbilitySession::new(reader(), config);
        let client_endpoint = session.host();
        manager
            .connect_ability(ABILITY, AbilityClientProxy::shared(client_endpoint.remote()))
            .unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !session.is_connected() {
            assert!(Instant::now() < deadline, "channel never reached the session");
            std::thread::sleep(Duration::from_millis(5));
        }

        Self {
            manager,
            manager_endpoint,
            operator,
            operator_endpoint,
            session,
            _client_endpoint: client_endpoint,
        }
    }
}

#[test_timeout::timeout]
fn search_by_id_returns_subtree_through_channel() {
    let stack = Stack::start(IpcConfig::default());
    let infos = stack
        .session
        .search_element_info_by_accessibility_id(
            ElementBasicInfo::root(WINDOW, 42),
            SearchMode::PREFETCH_RECURSIVE_CHILDREN,
        )
        .unwrap();

    let ids: Vec<i64> = infos.iter().map(|info| info.element_id).collect();
    assert_eq!(ids, vec![42, 43, 44, 45]);
    assert_eq!(infos[0], stack.operator.element(42).unwrap());
    assert_eq!(infos[1].spans[0].accessibility_text, "wireless");
    assert_eq!(stack.session.outstanding_queries(), 0);

    let children = stack
        .session
        .search_element_info_by_accessibility_id(
            ElementBasicInfo::root(WINDOW, 42),
            SearchMode::PREFETCH_CHILDREN,
        )
        .unwrap();
    assert_eq!(children.len(), 3);
}

#[test_timeout::timeout]
fn self_referencing_tree_answers_every_query() {
    // 42 is its own parent and child; 43 points back at 42
    let root = element(42, 42, &[43, 42], "Cycle");
    let leaf = element(43, 42, &[42], "Wi-Fi");
    let stack = Stack::serving(IpcConfig::default(), vec![root, leaf]);
    let session = &stack.session;
    let ids = |infos: Vec<ElementInfo>| -> Vec<i64> { infos.iter().map(|info| info.element_id).collect() };

    let subtree = session
        .search_element_info_by_accessibility_id(
            ElementBasicInfo::root(WINDOW, 42),
            SearchMode::PREFETCH_RECURSIVE_CHILDREN,
        )
        .unwrap();
    assert_eq!(ids(subtree), vec![42, 43]);

    let ancestors = session
        .search_element_info_by_accessibility_id(
            ElementBasicInfo::root(WINDOW, 43),
            SearchMode::PREFETCH_PREDECESSORS,
        )
        .unwrap();
    assert_eq!(ids(ancestors), vec![43, 42]);

    let found = session.search_element_infos_by_text(WINDOW, UNDEFINED_ID, "Wi").unwrap();
    assert_eq!(ids(found), vec![43]);

    let back = session
        .focus_move_search(WINDOW, 43, FocusMoveDirection::Backward)
        .unwrap();
    assert_eq!(back.element_id, 42);
    assert_eq!(session.outstanding_queries(), 0);
}

#[test_timeout::timeout]
fn queries_cover_text_focus_and_actions() {
    let stack = Stack::start(IpcConfig::default());
    let session = &stack.session;

    let found = session.search_element_infos_by_text(WINDOW, UNDEFINED_ID, "Wi").unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].element_id, 43);

    assert_eq!(
        session.find_focused_element_info(WINDOW, UNDEFINED_ID, FocusType::Accessibility),
        Err(RetError::InvalidElementInfoFromAce)
    );
    session
        .execute_action(WINDOW, 43, ActionType::AccessibilityFocus, &BTreeMap::new())
        .unwrap();
    let focused = session
        .find_focused_element_info(WINDOW, UNDEFINED_ID, FocusType::Accessibility)
        .unwrap();
    assert_eq!(focused.element_id, 43);
    assert!(focused.accessibility_focused);

    let next = session
        .focus_move_search(WINDOW, 43, FocusMoveDirection::Forward)
        .unwrap();
    assert_eq!(next.element_id, 44);

    let mut arguments = BTreeMap::new();
    arguments.insert(action_args::SET_TEXT.to_string(), "Living room".to_string());
    session
        .execute_action(WINDOW, 44, ActionType::SetText, &arguments)
        .unwrap();
    assert_eq!(stack.operator.element(44).unwrap().text, "Living room");
    assert_eq!(
        session.execute_action(WINDOW, 43, ActionType::SetText, &arguments),
        Err(RetError::PerformActionFailedByAce)
    );

    let mut cursor = BTreeMap::new();
    cursor.insert(action_args::CURSOR_OFFSET.to_string(), "4".to_string());
    session
        .execute_action(WINDOW, 44, ActionType::SetCursorPosition, &cursor)
        .unwrap();
    assert_eq!(session.get_cursor_position(WINDOW, 44).unwrap(), 4);

    assert_eq!(session.get_window(WINDOW).unwrap().window_id, WINDOW);
    assert_eq!(session.get_windows().unwrap().len(), 1);
    assert_eq!(session.outstanding_queries(), 0);
}

#[test_timeout::timeout]
fn unknown_window_fails_without_waiting() {
    let stack = Stack::start(IpcConfig::default().with_search_timeout(Duration::from_secs(20)));
    let started = Instant::now();
    assert_eq!(
        stack.session.search_element_info_by_accessibility_id(
            ElementBasicInfo::root(WINDOW + 1, 42),
            SearchMode::NONE,
        ),
        Err(RetError::NoWindowConnection)
    );
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(stack.session.outstanding_queries(), 0);
}

#[test_timeout::timeout]
fn window_operator_death_drops_registration() {
    let stack = Stack::start(IpcConfig::default());
    drop(stack.operator_endpoint);
    assert_eq!(
        stack.session.search_element_info_by_accessibility_id(
            ElementBasicInfo::root(WINDOW, 42),
            SearchMode::NONE,
        ),
        Err(RetError::NoWindowConnection)
    );
    assert_eq!(stack.manager.connection_count(), 1);

    drop(stack.manager_endpoint);
    assert!(stack.session.is_connected());
}

/// Answers every search by id with the three records it was built with and
/// remembers what it decoded.
struct FixedOperator {
    records: Vec<ElementInfo>,
    seen: Mutex<Option<(i64, i32, SearchMode, bool)>>,
}

impl ElementOperator for FixedOperator {
    fn search_element_info_by_accessibility_id(
        &self,
        element_id: i64,
        request_id: i32,
        callback: Arc<dyn ElementOperatorCallback>,
        mode: SearchMode,
        is_filter: bool,
    ) -> RetResult<()> {
        *self.seen.lock() = Some((element_id, request_id, mode, is_filter));
        callback.set_search_element_info_by_accessibility_id_result(self.records.clone(), request_id)
    }

    fn search_element_infos_by_text(
        &self,
        _element_id: i64,
        _text: &str,
        _request_id: i32,
        _callback: Arc<dyn ElementOperatorCallback>,
    ) -> RetResult<()> {
        Err(RetError::Failed)
    }

    fn find_focused_element_info(
        &self,
        _element_id: i64,
        _focus_type: FocusType,
        _request_id: i32,
        _callback: Arc<dyn ElementOperatorCallback>,
    ) -> RetResult<()> {
        Err(RetError::Failed)
    }

    fn focus_move_search(
        &self,
        _element_id: i64,
        _direction: FocusMoveDirection,
        _request_id: i32,
        _callback: Arc<dyn ElementOperatorCallback>,
    ) -> RetResult<()> {
        Err(RetError::Failed)
    }

    fn execute_action(
        &self,
        _element_id: i64,
        _action: ActionType,
        _arguments: &BTreeMap<String, String>,
        _request_id: i32,
        _callback: Arc<dyn ElementOperatorCallback>,
    ) -> RetResult<()> {
        Err(RetError::Failed)
    }

    fn get_cursor_position(
        &self,
        _element_id: i64,
        _request_id: i32,
        _callback: Arc<dyn ElementOperatorCallback>,
    ) -> RetResult<()> {
        Err(RetError::Failed)
    }

    fn clear_focus(&self) -> RetResult<()> {
        Ok(())
    }

    fn outside_touch(&self) -> RetResult<()> {
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
        Err(RetError::Failed)
    }
}

/// Forwards every batch answer to a channel.
struct BatchSink(Mutex<Sender<(i32, Vec<ElementInfo>)>>);

impl BatchSink {
    fn new() -> (Arc<Self>, Receiver<(i32, Vec<ElementInfo>)>) {
        let (tx, rx) = mpsc::channel();
        (Arc::new(Self(Mutex::new(tx))), rx)
    }

    fn push(&self, request_id: i32, infos: Vec<ElementInfo>) -> RetResult<()> {
        self.0.lock().send((request_id, infos)).map_err(|_| RetError::Failed)
    }
}

impl ElementOperatorCallback for BatchSink {
    fn set_search_element_info_by_accessibility_id_result(
        &self,
        infos: Vec<ElementInfo>,
        request_id: i32,
    ) -> RetResult<()> {
        self.push(request_id, infos)
    }

    fn set_search_element_info_by_text_result(
        &self,
        infos: Vec<ElementInfo>,
        request_id: i32,
    ) -> RetResult<()> {
        self.push(request_id, infos)
    }

    fn set_find_focused_element_info_result(&self, info: ElementInfo, request_id: i32) -> RetResult<()> {
        self.push(request_id, vec![info])
    }

    fn set_focus_move_search_result(&self, info: ElementInfo, request_id: i32) -> RetResult<()> {
        self.push(request_id, vec![info])
    }

    fn set_execute_action_result(&self, _succeeded: bool, request_id: i32) -> RetResult<()> {
        self.push(request_id, Vec::new())
    }

    fn set_cursor_result(&self, _position: i32, request_id: i32) -> RetResult<()> {
        self.push(request_id, Vec::new())
    }

    fn set_search_default_focus_by_window_id_result(
        &self,
        infos: Vec<ElementInfo>,
        request_id: i32,
    ) -> RetResult<()> {
        self.push(request_id, infos)
    }
}

#[test_timeout::timeout]
fn request_id_and_records_survive_both_hops() {
    let records: Vec<ElementInfo> = page().into_iter().take(3).collect();
    let operator = Arc::new(FixedOperator {
        records: records.clone(),
        seen: Mutex::new(None),
    });
    let operator_endpoint = host(
        accessibility_ipc::interfaces::ElementOperatorStub::new(Arc::clone(&operator)),
        app(),
        TransportConfig::default(),
    );
    let (sink, answers) = BatchSink::new();
    let callback_endpoint = host(
        ElementOperatorCallbackStub::new(sink),
        reader(),
        TransportConfig::default(),
    );

    let proxy = ElementOperatorProxy::new(operator_endpoint.remote());
    proxy
        .search_element_info_by_accessibility_id(
            42,
            7,
            ElementOperatorCallbackProxy::shared(callback_endpoint.remote()),
            SearchMode::PREFETCH_RECURSIVE_CHILDREN,
            false,
        )
        .unwrap();

    let (request_id, infos) = answers.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(request_id, 7);
    assert_eq!(infos, records);
    assert_eq!(
        *operator.seen.lock(),
        Some((42, 7, SearchMode::PREFETCH_RECURSIVE_CHILDREN, false))
    );
}
