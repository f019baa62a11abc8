use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::config::Theme;
use crate::storage::{KeyValueStore, StoreMap};

use super::tabs::TabRejection;

/// Persisted key names.
pub mod keys {
    pub const TABS: &str = "tabs";
    pub const ACTIVE_TAB_ID: &str = "activeTabId";
    pub const THEME: &str = "theme";
    pub const OPACITY: &str = "opacity";
    pub const TEXT_COLOR: &str = "textColor";

    pub const ALL: [&str; 5] = [TABS, ACTIVE_TAB_ID, THEME, OPACITY, TEXT_COLOR];
}

pub const SEED_TAB_LABEL: &str = "Note 1";

static HEX_COLOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^#(?:[0-9a-fA-F]{6}|[0-9a-fA-F]{3})$").expect("hex colour pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(String);

impl TabId {
    pub fn generate() -> Self {
        Self(format!("t{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TabId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TabId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tab {
    pub id: TabId,
    pub label: String,
    #[serde(default)]
    pub content: String,
}

impl Tab {
    pub fn new(id: TabId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            content: String::new(),
        }
    }
}

/// Editor text opacity in percent, always within `[MIN, MAX]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Opacity(u8);

impl Opacity {
    pub const MIN: u8 = 20;
    pub const MAX: u8 = 100;

    pub fn new(percent: i64) -> Self {
        Self(percent.clamp(i64::from(Self::MIN), i64::from(Self::MAX)) as u8)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn step(self, delta: i64) -> Self {
        Self::new(i64::from(self.0) + delta)
    }
}

impl Default for Opacity {
    fn default() -> Self {
        Self(Self::MAX)
    }
}

/// Editor text colour override; `None` means the theme's default colour.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextColor(Option<String>);

impl TextColor {
    /// Accepts an empty string (theme default), `#rrggbb` or `#rgb`.
    pub fn parse(raw: &str) -> Result<Self, TabRejection> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Self(None));
        }
        if !HEX_COLOR.is_match(trimmed) {
            return Err(TabRejection::InvalidColor(raw.to_string()));
        }
        let digits = &trimmed[1..];
        let expanded = if digits.len() == 3 {
            digits.chars().flat_map(|ch| [ch, ch]).collect::<String>()
        } else {
            digits.to_string()
        };
        Ok(Self(Some(format!("#{}", expanded.to_ascii_lowercase()))))
    }

    pub fn is_default(&self) -> bool {
        self.0.is_none()
    }

    /// Stored representation: the hex string, or empty for the default.
    pub fn as_str(&self) -> &str {
        self.0.as_deref().unwrap_or("")
    }

    pub fn label(&self) -> &str {
        self.0.as_deref().unwrap_or("Default")
    }

    pub fn rgb(&self) -> Option<(u8, u8, u8)> {
        let hex = self.0.as_deref()?;
        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
        Some((channel(1..3)?, channel(3..5)?, channel(5..7)?))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preferences {
    pub theme: Theme,
    pub opacity: Opacity,
    pub text_color: TextColor,
}

/// Tabs, active tab and display preferences for one scratchpad session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub(super) tabs: Vec<Tab>,
    pub(super) active_tab_id: Option<TabId>,
    pub(super) prefs: Preferences,
    /// Ids handed out and later removed this session; never issued again.
    pub(super) retired_ids: HashSet<TabId>,
}

impl SessionState {
    /// Builds a state from parts, restoring every invariant: at least one
    /// tab, unique ids and an active id that resolves.
    pub fn from_parts(tabs: Vec<Tab>, active_tab_id: Option<TabId>, prefs: Preferences) -> Self {
        let mut seen = HashSet::with_capacity(tabs.len());
        let mut unique = Vec::with_capacity(tabs.len());
        for mut tab in tabs {
            if !seen.insert(tab.id.clone()) {
                let mut fresh = TabId::generate();
                while seen.contains(&fresh) {
                    fresh = TabId::generate();
                }
                tracing::warn!(duplicate = %tab.id, replacement = %fresh, "reassigning duplicate tab id");
                tab.id = fresh.clone();
                seen.insert(fresh);
            }
            unique.push(tab);
        }
        if unique.is_empty() {
            unique.push(Tab::new(TabId::generate(), SEED_TAB_LABEL));
        }

        let active_tab_id = match active_tab_id {
            Some(id) if unique.iter().any(|tab| tab.id == id) => id,
            other => {
                if let Some(id) = other {
                    tracing::debug!(%id, "persisted active tab no longer exists");
                }
                unique[0].id.clone()
            }
        };

        Self {
            tabs: unique,
            active_tab_id: Some(active_tab_id),
            prefs,
            retired_ids: HashSet::new(),
        }
    }

    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    pub fn tab(&self, id: &TabId) -> Option<&Tab> {
        self.tabs.iter().find(|tab| &tab.id == id)
    }

    pub fn position(&self, id: &TabId) -> Option<usize> {
        self.tabs.iter().position(|tab| &tab.id == id)
    }

    pub fn active_tab_id(&self) -> Option<&TabId> {
        self.active_tab_id.as_ref()
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active_tab_id.as_ref().and_then(|id| self.position(id))
    }

    /// The active tab, falling back to the first tab if the id is stale.
    pub fn active_tab(&self) -> Option<&Tab> {
        self.active_index()
            .map(|idx| &self.tabs[idx])
            .or_else(|| self.tabs.first())
    }

    pub(super) fn active_tab_mut(&mut self) -> Option<&mut Tab> {
        let idx = self.active_index().unwrap_or(0);
        self.tabs.get_mut(idx)
    }

    pub fn preferences(&self) -> &Preferences {
        &self.prefs
    }

    /// `tabs` and `activeTabId`, written together on every tab save.
    pub fn tab_entries(&self) -> Result<StoreMap> {
        let mut entries = StoreMap::with_capacity(2);
        entries.insert(
            keys::TABS.to_string(),
            serde_json::to_value(&self.tabs).context("serialising tabs")?,
        );
        entries.insert(
            keys::ACTIVE_TAB_ID.to_string(),
            self.active_tab_id
                .as_ref()
                .map(|id| Value::String(id.to_string()))
                .unwrap_or(Value::Null),
        );
        Ok(entries)
    }

    /// A single preference key and its current value.
    pub fn preference_entry(&self, key: &str) -> Option<StoreMap> {
        let value = match key {
            keys::THEME => Value::String(self.prefs.theme.to_string()),
            keys::OPACITY => Value::from(self.prefs.opacity.get()),
            keys::TEXT_COLOR => Value::String(self.prefs.text_color.as_str().to_string()),
            _ => return None,
        };
        let mut entries = StoreMap::with_capacity(1);
        entries.insert(key.to_string(), value);
        Some(entries)
    }
}

/// Reads every persisted key in one batched fetch and builds a fully
/// populated state. Absent or malformed values fall back to defaults.
pub fn load(store: &dyn KeyValueStore, default_theme: Theme) -> Result<SessionState> {
    let mut raw = store
        .get(&keys::ALL)
        .context("loading persisted session")?;

    let tabs = raw.shift_remove(keys::TABS).map(decode_tabs).unwrap_or_default();
    if tabs.is_empty() {
        tracing::info!("no stored tabs, seeding '{SEED_TAB_LABEL}'");
    }

    let active_tab_id = match raw.shift_remove(keys::ACTIVE_TAB_ID) {
        Some(Value::String(id)) if !id.is_empty() => Some(TabId::from(id)),
        _ => None,
    };

    let theme = match raw.shift_remove(keys::THEME) {
        Some(Value::String(name)) if !name.is_empty() => Theme::from_str(&name).unwrap_or_else(|_| {
            tracing::warn!(%name, "unknown stored theme, using default");
            default_theme
        }),
        _ => default_theme,
    };

    let opacity = match raw.shift_remove(keys::OPACITY) {
        Some(Value::Number(number)) => number
            .as_f64()
            .map(|value| Opacity::new(value.round() as i64))
            .unwrap_or_default(),
        Some(Value::Null) | None => Opacity::default(),
        Some(other) => {
            tracing::warn!(?other, "stored opacity is not a number, using default");
            Opacity::default()
        }
    };

    let text_color = match raw.shift_remove(keys::TEXT_COLOR) {
        Some(Value::String(hex)) => TextColor::parse(&hex).unwrap_or_else(|err| {
            tracing::warn!(%err, "stored text colour is invalid, using default");
            TextColor::default()
        }),
        _ => TextColor::default(),
    };

    Ok(SessionState::from_parts(
        tabs,
        active_tab_id,
        Preferences {
            theme,
            opacity,
            text_color,
        },
    ))
}

/// Decodes the stored tab list element by element. Broken entries are
/// repaired where possible and skipped otherwise, so one bad tab never
/// costs the rest.
fn decode_tabs(value: Value) -> Vec<Tab> {
    let items = match value {
        Value::Array(items) => items,
        Value::Null => return Vec::new(),
        other => {
            tracing::warn!(?other, "stored tabs are not a list, starting fresh");
            return Vec::new();
        }
    };
    items
        .into_iter()
        .enumerate()
        .filter_map(|(position, item)| decode_tab(position, item))
        .collect()
}

fn decode_tab(position: usize, item: Value) -> Option<Tab> {
    let mut fields = match item {
        Value::Object(fields) => fields,
        other => {
            tracing::warn!(position, ?other, "skipping stored tab that is not an object");
            return None;
        }
    };
    let id = match fields.remove("id") {
        Some(Value::String(id)) if !id.is_empty() => TabId::from(id),
        other => {
            let fresh = TabId::generate();
            tracing::warn!(position, ?other, id = %fresh, "stored tab has no usable id");
            fresh
        }
    };
    let label = match fields.remove("label") {
        Some(Value::String(label)) if !label.trim().is_empty() => label,
        other => {
            let fallback = format!("Note {}", position + 1);
            tracing::warn!(position, ?other, %fallback, "stored tab has no usable label");
            fallback
        }
    };
    let content = match fields.remove("content") {
        Some(Value::String(content)) => content,
        None | Some(Value::Null) => String::new(),
        Some(other) => {
            tracing::warn!(position, "stored tab content is not a string, keeping its text");
            other.to_string()
        }
    };
    Some(Tab { id, label, content })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn store_with(pairs: &[(&str, Value)]) -> MemoryStore {
        MemoryStore::with_values(
            pairs
                .iter()
                .map(|(key, value)| (key.to_string(), value.clone()))
                .collect(),
        )
    }

    #[test]
    fn empty_store_seeds_single_default_tab() -> Result<()> {
        let state = load(&MemoryStore::new(), Theme::Dark)?;
        assert_eq!(state.len(), 1);
        assert_eq!(state.tabs()[0].label, "Note 1");
        assert_eq!(state.tabs()[0].content, "");
        assert_eq!(state.active_tab_id(), Some(&state.tabs()[0].id));
        assert_eq!(state.preferences(), &Preferences::default());
        assert_eq!(state.preferences().opacity.get(), 100);
        assert_eq!(state.preferences().text_color.as_str(), "");
        Ok(())
    }

    #[test]
    fn empty_tab_list_is_reseeded() -> Result<()> {
        let store = store_with(&[(keys::TABS, json!([])), (keys::ACTIVE_TAB_ID, json!("gone"))]);
        let state = load(&store, Theme::Light)?;
        assert_eq!(state.len(), 1);
        assert_eq!(state.preferences().theme, Theme::Light);
        assert_eq!(state.active_tab_id(), Some(&state.tabs()[0].id));
        Ok(())
    }

    #[test]
    fn unresolved_active_id_falls_back_to_first_tab() -> Result<()> {
        let store = store_with(&[
            (
                keys::TABS,
                json!([
                    { "id": "a", "label": "A", "content": "alpha" },
                    { "id": "b", "label": "B", "content": "beta" }
                ]),
            ),
            (keys::ACTIVE_TAB_ID, json!("zzz")),
        ]);
        let state = load(&store, Theme::Dark)?;
        assert_eq!(state.active_tab_id(), Some(&TabId::from("a")));
        assert_eq!(state.active_tab().map(|t| t.content.as_str()), Some("alpha"));
        Ok(())
    }

    #[test]
    fn preferences_are_decoded_and_clamped() -> Result<()> {
        let store = store_with(&[
            (keys::THEME, json!("light")),
            (keys::OPACITY, json!(5)),
            (keys::TEXT_COLOR, json!("#ABC")),
        ]);
        let prefs = load(&store, Theme::Dark)?.preferences().clone();
        assert_eq!(prefs.theme, Theme::Light);
        assert_eq!(prefs.opacity.get(), Opacity::MIN);
        assert_eq!(prefs.text_color.as_str(), "#aabbcc");
        Ok(())
    }

    #[test]
    fn malformed_values_use_defaults() -> Result<()> {
        let store = store_with(&[
            (keys::TABS, json!("not a list")),
            (keys::THEME, json!("sepia")),
            (keys::OPACITY, json!("loud")),
            (keys::TEXT_COLOR, json!("red")),
        ]);
        let state = load(&store, Theme::Dark)?;
        assert_eq!(state.len(), 1);
        assert_eq!(state.preferences(), &Preferences::default());
        Ok(())
    }

    #[test]
    fn one_broken_tab_does_not_discard_the_others() -> Result<()> {
        let store = store_with(&[
            (
                keys::TABS,
                json!([
                    { "id": "a", "label": "Work", "content": "important notes" },
                    { "id": "b", "content": "no label" },
                    { "label": "No id", "content": "still here" },
                    42
                ]),
            ),
            (keys::ACTIVE_TAB_ID, json!("b")),
        ]);
        let state = load(&store, Theme::Dark)?;
        assert_eq!(state.len(), 3);
        assert_eq!(state.tabs()[0], Tab {
            id: TabId::from("a"),
            label: "Work".into(),
            content: "important notes".into(),
        });
        assert_eq!(state.tabs()[1].label, "Note 2");
        assert_eq!(state.tabs()[1].content, "no label");
        assert_eq!(state.tabs()[2].label, "No id");
        assert!(state.tabs()[2].id.as_str().starts_with('t'));
        assert_eq!(state.active_tab_id(), Some(&TabId::from("b")));
        Ok(())
    }

    #[test]
    fn tab_list_with_only_broken_entries_is_reseeded() -> Result<()> {
        let store = store_with(&[(keys::TABS, json!([null, "text", []]))]);
        let state = load(&store, Theme::Dark)?;
        assert_eq!(state.len(), 1);
        assert_eq!(state.tabs()[0].label, SEED_TAB_LABEL);
        Ok(())
    }

    #[test]
    fn duplicate_ids_are_made_unique() {
        let tabs = vec![
            Tab::new(TabId::from("x"), "one"),
            Tab::new(TabId::from("x"), "two"),
        ];
        let state = SessionState::from_parts(tabs, Some(TabId::from("x")), Preferences::default());
        assert_eq!(state.len(), 2);
        assert_ne!(state.tabs()[0].id, state.tabs()[1].id);
        assert_eq!(state.active_tab().map(|t| t.label.as_str()), Some("one"));
    }

    #[test]
    fn text_color_rejects_non_hex() {
        assert!(TextColor::parse("").unwrap().is_default());
        assert_eq!(TextColor::parse("#FF8800").unwrap().rgb(), Some((0xff, 0x88, 0x00)));
        assert_eq!(
            TextColor::parse("blue"),
            Err(TabRejection::InvalidColor("blue".into()))
        );
        assert!(TextColor::parse("#12345").is_err());
    }

    #[test]
    fn opacity_clamps_to_range() {
        assert_eq!(Opacity::new(150).get(), 100);
        assert_eq!(Opacity::new(-3).get(), 20);
        assert_eq!(Opacity::new(45).get(), 45);
        assert_eq!(Opacity::new(25).step(-10).get(), 20);
    }

    #[test]
    fn tab_entries_carry_tabs_and_active_id() -> Result<()> {
        let state = SessionState::from_parts(
            vec![Tab::new(TabId::from("t1"), "Note 1")],
            None,
            Preferences::default(),
        );
        let entries = state.tab_entries()?;
        assert_eq!(
            entries[keys::TABS],
            json!([{ "id": "t1", "label": "Note 1", "content": "" }])
        );
        assert_eq!(entries[keys::ACTIVE_TAB_ID], json!("t1"));
        assert!(state.preference_entry("tabs").is_none());
        Ok(())
    }
}
