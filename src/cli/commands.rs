use std::fmt::Write as _;
use std::io::{self, Read};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, bail, Result};
use clap::Args;

use crate::app::App;
use crate::config::{AppConfig, Theme};
use crate::journaling::AutoSaveEvent;
use crate::session::{
    Dispatch, EditOp, Intent, Session, SessionOptions, SessionState, Tab, TabRejection,
};
use crate::storage::StoreHandle;
use crate::ui::format_char_count;

#[derive(Args, Debug, Clone)]
pub struct ShowArgs {
    /// Tab id or label
    pub tab: String,
}

#[derive(Args, Debug, Clone)]
pub struct NewArgs {
    /// Label for the tab (defaults to "Note N")
    #[arg()]
    pub label: Option<String>,
    /// Provide the tab content inline. If omitted, reads from piped stdin.
    #[arg(long)]
    pub content: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct PrefsArgs {
    /// Switch theme (dark or light)
    #[arg(long)]
    pub theme: Option<Theme>,
    /// Text opacity in percent, clamped to 20..=100
    #[arg(long, allow_negative_numbers = true)]
    pub opacity: Option<i64>,
    /// Text colour as #rrggbb, or "" for the theme default
    #[arg(long)]
    pub color: Option<String>,
}

pub fn run_tui(app: &mut App) -> Result<()> {
    app.run()
}

fn open_session(config: &AppConfig, store: StoreHandle) -> Result<Session> {
    Session::open(store, SessionOptions::from_config(config))
}

pub fn list_tabs(config: Arc<AppConfig>, store: StoreHandle) -> Result<()> {
    let session = open_session(&config, store)?;
    print!("{}", format_tabs(session.state()));
    Ok(())
}

fn format_tabs(state: &SessionState) -> String {
    let mut out = String::new();
    for (idx, tab) in state.tabs().iter().enumerate() {
        let marker = if state.active_tab_id() == Some(&tab.id) {
            '*'
        } else {
            ' '
        };
        let _ = writeln!(
            &mut out,
            "{marker} {}  {}  [{}]  {}",
            idx + 1,
            tab.label,
            tab.id,
            format_char_count(tab.content.chars().count())
        );
    }
    out
}

pub fn show_tab(config: Arc<AppConfig>, store: StoreHandle, args: ShowArgs) -> Result<()> {
    let session = open_session(&config, store)?;
    let tab = find_tab(session.state(), &args.tab)
        .ok_or_else(|| anyhow!("no tab matches '{}'", args.tab))?;
    print!("{}", tab.content);
    if !tab.content.ends_with('\n') && !tab.content.is_empty() {
        println!();
    }
    Ok(())
}

/// Exact id first, then exact label, then a case-insensitive label match.
fn find_tab<'a>(state: &'a SessionState, needle: &str) -> Option<&'a Tab> {
    let tabs = state.tabs();
    tabs.iter()
        .find(|tab| tab.id.as_str() == needle)
        .or_else(|| tabs.iter().find(|tab| tab.label == needle))
        .or_else(|| {
            tabs.iter()
                .find(|tab| tab.label.to_lowercase() == needle.to_lowercase())
        })
}

pub fn new_tab(config: Arc<AppConfig>, store: StoreHandle, args: NewArgs) -> Result<()> {
    let mut session = open_session(&config, store)?;
    let content = match args.content {
        Some(content) => Some(content),
        None => read_stdin()?,
    };
    let (id, label) = create_tab(&mut session, args.label, content)?;
    println!("Created tab '{label}' [{id}]");
    Ok(())
}

fn create_tab(
    session: &mut Session,
    label: Option<String>,
    content: Option<String>,
) -> Result<(String, String)> {
    if label.as_deref().is_some_and(|label| label.trim().is_empty()) {
        bail!(TabRejection::EmptyLabel);
    }
    let now = Instant::now();
    expect_saved(session.dispatch(Intent::AddTab, now))?;
    let id = session
        .state()
        .active_tab_id()
        .cloned()
        .ok_or_else(|| anyhow!("new tab was not activated"))?;

    if let Some(label) = label {
        match session.dispatch(Intent::RenameTab(id.clone(), label), now) {
            Dispatch::Rejected(reason) => bail!(reason),
            outcome => expect_saved(outcome)?,
        }
    }
    if let Some(content) = content.filter(|c| !c.is_empty()) {
        session.dispatch(Intent::Edit(EditOp::Replace(content)), now);
        expect_saved(session.dispatch(Intent::ManualSave, now))?;
    }

    let label = session
        .state()
        .tab(&id)
        .map(|tab| tab.label.clone())
        .unwrap_or_default();
    Ok((id.to_string(), label))
}

fn expect_saved(outcome: Dispatch) -> Result<()> {
    match outcome {
        Dispatch::Saved(AutoSaveEvent::Error { message, .. }) => bail!("saving tabs: {message}"),
        Dispatch::Rejected(reason) => bail!(reason),
        _ => Ok(()),
    }
}

pub fn prefs(config: Arc<AppConfig>, store: StoreHandle, args: PrefsArgs) -> Result<()> {
    let mut session = open_session(&config, store)?;
    apply_prefs(&mut session, args)?;
    print!("{}", format_prefs(&session));
    Ok(())
}

fn apply_prefs(session: &mut Session, args: PrefsArgs) -> Result<()> {
    let now = Instant::now();
    let mut intents = Vec::with_capacity(3);
    if let Some(theme) = args.theme {
        intents.push(Intent::SetTheme(theme));
    }
    if let Some(opacity) = args.opacity {
        intents.push(Intent::SetOpacity(opacity));
    }
    if let Some(color) = args.color {
        intents.push(Intent::SetColor(color));
    }
    for intent in intents {
        if let Dispatch::Rejected(reason) = session.dispatch(intent, now) {
            bail!(reason);
        }
    }
    Ok(())
}

fn format_prefs(session: &Session) -> String {
    let prefs = session.preferences();
    format!(
        "theme    {}\nopacity  {}%\ncolor    {}\n",
        prefs.theme,
        prefs.opacity.get(),
        prefs.text_color.label()
    )
}

fn read_stdin() -> Result<Option<String>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(Some(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::keys;
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn open(store: &Arc<MemoryStore>) -> Session {
        open_session(&AppConfig::default(), store.clone()).expect("session opens")
    }

    #[test]
    fn create_tab_with_label_and_content_persists() {
        let store = Arc::new(MemoryStore::new());
        let mut session = open(&store);
        let (id, label) = create_tab(
            &mut session,
            Some("  Groceries ".into()),
            Some("milk\neggs".into()),
        )
        .unwrap();
        assert_eq!(label, "Groceries");

        let tabs = store.value(keys::TABS).unwrap();
        assert_eq!(tabs[1]["label"], json!("Groceries"));
        assert_eq!(tabs[1]["content"], json!("milk\neggs"));
        assert_eq!(store.value(keys::ACTIVE_TAB_ID), Some(json!(id)));
    }

    #[test]
    fn create_tab_rejects_blank_label() {
        let store = Arc::new(MemoryStore::new());
        let mut session = open(&store);
        let err = create_tab(&mut session, Some("   ".into()), None).unwrap_err();
        assert!(err.to_string().contains("empty"));
        assert_eq!(session.state().len(), 1);
        assert_eq!(store.value(keys::TABS), None);
        assert!(store.writes().is_empty());
    }

    #[test]
    fn tabs_listing_marks_active() {
        let store = Arc::new(MemoryStore::new());
        let mut session = open(&store);
        create_tab(&mut session, None, Some("x".into())).unwrap();
        let reopened = open(&store);
        let listing = format_tabs(reopened.state());
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("  1  Note 1"));
        assert!(lines[1].starts_with("* 2  Note 2"));
        assert!(lines[1].ends_with("1 char"));
    }

    #[test]
    fn find_tab_prefers_id_then_label() {
        let store = Arc::new(MemoryStore::new());
        let mut session = open(&store);
        let (id, _) = create_tab(&mut session, Some("Ideas".into()), None).unwrap();
        let state = session.state();
        assert_eq!(find_tab(state, &id).map(|t| t.label.as_str()), Some("Ideas"));
        assert_eq!(find_tab(state, "ideas").map(|t| t.id.to_string()), Some(id));
        assert!(find_tab(state, "nope").is_none());
    }

    #[test]
    fn prefs_apply_and_reject_bad_colour() {
        let store = Arc::new(MemoryStore::new());
        let mut session = open(&store);
        apply_prefs(
            &mut session,
            PrefsArgs {
                theme: Some(Theme::Light),
                opacity: Some(5),
                color: Some("#ABC".into()),
            },
        )
        .unwrap();
        assert_eq!(
            format_prefs(&session),
            "theme    light\nopacity  20%\ncolor    #aabbcc\n"
        );
        assert_eq!(store.value(keys::OPACITY), Some(json!(20)));

        let err = apply_prefs(
            &mut session,
            PrefsArgs {
                theme: None,
                opacity: None,
                color: Some("blue".into()),
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("hex colour"));
    }
}
