mod cli;
mod harness;
mod logging;

use std::collections::BTreeMap;

use accessibility_ipc::IpcConfig;
use accessibility_ipc::model::{ElementBasicInfo, SearchMode, UNDEFINED_ID};
use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;

use cli::{Cli, Commands};
use harness::Harness;
use logging::LogConfig;

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&LogConfig {
        level: cli.log_level,
        file: cli.log_file.clone(),
    })?;
    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => IpcConfig::load(path)?,
        None => IpcConfig::from_env()?,
    };
    let nodes = match &cli.tree {
        Some(path) => harness::load_tree(path)?,
        None => harness::demo_page(cli.window_id),
    };
    let window_id = cli.window_id;
    let harness = Harness::boot(config, window_id, nodes)?;
    let session = &harness.session;

    let output = match cli.command {
        Commands::Dump {
            element_id,
            prefetch,
        } => {
            let infos = session
                .search_element_info_by_accessibility_id(
                    ElementBasicInfo::root(window_id, element_id),
                    prefetch.into(),
                )
                .with_context(|| format!("searching element {element_id}"))?;
            serde_json::to_value(infos)?
        }
        Commands::FindText { text, element_id } => {
            let infos = session
                .search_element_infos_by_text(window_id, element_id, &text)
                .with_context(|| format!("searching for {text:?}"))?;
            serde_json::to_value(infos)?
        }
        Commands::Focused { kind } => {
            let info = session
                .find_focused_element_info(window_id, UNDEFINED_ID, kind.into())
                .context("finding focused element")?;
            serde_json::to_value(info)?
        }
        Commands::FocusMove {
            element_id,
            direction,
        } => {
            let info = session
                .focus_move_search(window_id, element_id, direction.into())
                .with_context(|| format!("moving focus from {element_id}"))?;
            serde_json::to_value(info)?
        }
        Commands::Action {
            element_id,
            action,
            args,
        } => {
            let arguments: BTreeMap<String, String> = args.into_iter().collect();
            session
                .execute_action(window_id, element_id, action.into(), &arguments)
                .with_context(|| format!("performing {action:?} on {element_id}"))?;
            let after = session
                .search_element_info_by_accessibility_id(
                    ElementBasicInfo::root(window_id, element_id),
                    SearchMode::NONE,
                )
                .with_context(|| format!("re-reading element {element_id}"))?;
            json!({ "performed": true, "element": after.first() })
        }
        Commands::Cursor { element_id } => {
            let position = session
                .get_cursor_position(window_id, element_id)
                .with_context(|| format!("reading cursor of {element_id}"))?;
            json!({ "element_id": element_id, "position": position })
        }
        Commands::Windows => serde_json::to_value(session.get_windows().context("listing windows")?)?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
