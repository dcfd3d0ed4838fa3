use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use accessibility_ipc::interfaces::{
    AbilityClientProxy, ElementOperatorProxy, ManagerService, ManagerServiceProxy,
};
use accessibility_ipc::model::{
    capability, AbilityInfo, AccessibleAction, ActionType, ElementInfo, Rect, WindowInfo,
    UNDEFINED_ID,
};
use accessibility_ipc::permission::WRITE_ACCESSIBILITY_CONFIG;
use accessibility_ipc::snapshot::check_tree;
use accessibility_ipc::{AbilitySession, AccessibilityManager, IpcConfig, SnapshotOperator};
use anyhow::{bail, Context, Result};
use ipc_transport::{CallerIdentity, Endpoint, IdentityScope};
use tracing::{debug, info};

const APP_BUNDLE: &str = "com.example.probe.app";
const SERVICE_BUNDLE: &str = "com.example.probe";
const SERVICE_NAME: &str = "Probe";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Manager, window and service wired together in this process. Endpoints
/// stay hosted for as long as the harness lives.
pub struct Harness {
    pub session: Arc<AbilitySession>,
    _manager: Arc<AccessibilityManager>,
    _endpoints: Vec<Endpoint>,
}

impl Harness {
    pub fn boot(config: IpcConfig, window_id: i32, nodes: Vec<ElementInfo>) -> Result<Self> {
        let manager = AccessibilityManager::new(
            CallerIdentity::new(std::process::id(), 1000).with_system_app(),
            config.clone(),
        );
        let manager_endpoint = manager.host();
        let service = ManagerServiceProxy::new(manager_endpoint.remote());
        manager.update_window(WindowInfo {
            active: true,
            focused: true,
            ..WindowInfo::application(window_id, APP_BUNDLE, Rect::new(0, 0, 720, 1280))
        });

        let app = CallerIdentity::new(std::process::id(), 20010001).with_bundle_name(APP_BUNDLE);
        let operator = SnapshotOperator::new(window_id, nodes);
        let operator_endpoint = operator.host(app.clone(), &config);
        {
            let _app = IdentityScope::enter(app);
            service
                .register_element_operator(
                    window_id,
                    ElementOperatorProxy::shared(operator_endpoint.remote()),
                )
                .context("registering element operator")?;
        }

        let ability = AbilityInfo::new(
            SERVICE_BUNDLE,
            SERVICE_NAME,
            capability::RETRIEVE | capability::GESTURE,
        );
        let ability_id = ability.id.clone();
        manager.install_ability(ability);
        {
            let _settings = IdentityScope::enter(
                CallerIdentity::new(std::process::id(), 1000)
                    .with_system_app()
                    .with_permission(WRITE_ACCESSIBILITY_CONFIG),
            );
            service
                .enable_abilities(&ability_id, capability::RETRIEVE | capability::GESTURE)
                .context("enabling probe ability")?;
        }

        let session = AbilitySession::new(
            CallerIdentity::new(std::process::id(), 20010002).with_bundle_name(SERVICE_BUNDLE),
            config,
        );
        let client_endpoint = session.host();
        let channel_id = manager
            .connect_ability(&ability_id, AbilityClientProxy::shared(client_endpoint.remote()))
            .context("connecting probe ability")?;
        let deadline = Instant::now() + CONNECT_TIMEOUT;
        while !session.is_connected() {
            if Instant::now() >= deadline {
                bail!("channel {channel_id} was not delivered within {CONNECT_TIMEOUT:?}");
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        info!(target: "a11y_probe", window_id, channel_id, "probe connected");

        Ok(Self {
            session,
            _manager: manager,
            _endpoints: vec![manager_endpoint, operator_endpoint, client_endpoint],
        })
    }
}

pub fn load_tree(path: &Path) -> Result<Vec<ElementInfo>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading element tree {}", path.display()))?;
    let nodes: Vec<ElementInfo> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing element tree {}", path.display()))?;
    if nodes.is_empty() {
        bail!("element tree {} is empty", path.display());
    }
    check_tree(&nodes).with_context(|| format!("element tree {} is malformed", path.display()))?;
    debug!(target: "a11y_probe", nodes = nodes.len(), "element tree loaded");
    Ok(nodes)
}

/// Title, a text field with a hint, and a button.
pub fn demo_page(window_id: i32) -> Vec<ElementInfo> {
    let node = |id: i64, parent: i64, children: &[i64], component: &str, rect: Rect| {
        let mut node = ElementInfo::new(window_id, id);
        node.parent_id = parent;
        node.child_ids = children.to_vec();
        node.component_type = component.to_string();
        node.bundle_name = APP_BUNDLE.to_string();
        node.rect = rect;
        node.actions = vec![
            AccessibleAction::new(ActionType::AccessibilityFocus, ""),
            AccessibleAction::new(ActionType::ClearAccessibilityFocus, ""),
        ];
        node
    };

    let root = node(1, UNDEFINED_ID, &[2, 3, 5], "Column", Rect::new(0, 0, 720, 1280));
    let mut title = node(2, 1, &[], "Text", Rect::new(0, 0, 720, 120));
    title.text = "Sign in".into();
    title.focusable = true;

    let mut field = node(3, 1, &[4], "TextInput", Rect::new(0, 140, 720, 260));
    field.focusable = true;
    field.editable = true;
    field.hint_text = "User name".into();
    field.actions.extend([
        AccessibleAction::new(ActionType::Focus, ""),
        AccessibleAction::new(ActionType::SetText, ""),
        AccessibleAction::new(ActionType::SetSelection, ""),
        AccessibleAction::new(ActionType::SetCursorPosition, ""),
    ]);
    let mut hint = node(4, 3, &[], "Text", Rect::new(0, 200, 720, 260));
    hint.text = "User name".into();

    let mut button = node(5, 1, &[], "Button", Rect::new(0, 300, 720, 420));
    button.text = "Continue".into();
    button.focusable = true;
    button.clickable = true;
    button.actions.push(AccessibleAction::new(ActionType::Click, "continue"));

    vec![root, title, field, hint, button]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::timeout]
    fn demo_page_round_trips_through_json() {
        let nodes = demo_page(9);
        let raw = serde_json::to_string(&nodes).unwrap();
        let parsed: Vec<ElementInfo> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, nodes);
        assert!(parsed.iter().all(|node| node.window_id == 9));
    }

    #[test_timeout::timeout]
    fn load_tree_rejects_cycles_and_accepts_bare_roots() {
        let dir = std::env::temp_dir().join(format!("a11y-probe-tree-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let bare = dir.join("bare.json");
        std::fs::write(&bare, r#"[{"element_id":0}]"#).unwrap();
        let nodes = load_tree(&bare).unwrap();
        assert_eq!(nodes[0].parent_id, UNDEFINED_ID);

        let looped = dir.join("looped.json");
        std::fs::write(&looped, r#"[{"element_id":5,"child_ids":[5]}]"#).unwrap();
        let err = load_tree(&looped).unwrap_err();
        assert!(format!("{err:#}").contains("own parent or child"), "{err:#}");

        let cycle = dir.join("cycle.json");
        std::fs::write(
            &cycle,
            r#"[{"element_id":1,"child_ids":[2]},{"element_id":2,"parent_id":1,"child_ids":[1]}]"#,
        )
        .unwrap();
        assert!(load_tree(&cycle).is_err());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test_timeout::timeout]
    fn boots_and_answers_a_query() {
        let harness = Harness::boot(IpcConfig::default(), 9, demo_page(9)).unwrap();
        let found = harness
            .session
            .search_element_infos_by_text(9, UNDEFINED_ID, "Continue")
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].element_id, 5);
    }
}
