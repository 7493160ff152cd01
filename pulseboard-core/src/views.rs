//! Saved views - named filter presets
//!
//! A view is `{name, value}` where `value` is an opaque JSON object owned by
//! the screen that saved it. Names are unique within the list.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedView {
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SavedViews {
    views: Vec<SavedView>,
}

impl SavedViews {
    /// Build from stored views; blank names and later duplicates are dropped
    pub fn new(views: Vec<SavedView>) -> Self {
        let mut saved = SavedViews::default();
        for view in views {
            if !view.name.trim().is_empty() && saved.get(&view.name).is_none() {
                saved.views.push(view);
            }
        }
        saved
    }

    pub fn views(&self) -> &[SavedView] {
        &self.views
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.views.iter().find(|v| v.name == name).map(|v| &v.value)
    }

    /// Replace the view named `name` in place, or append it
    pub fn save(&mut self, name: &str, value: Value) {
        match self.views.iter_mut().find(|v| v.name == name) {
            Some(view) => view.value = value,
            None => self.views.push(SavedView {
                name: name.to_string(),
                value,
            }),
        }
    }

    /// Returns whether a view was removed
    pub fn delete(&mut self, name: &str) -> bool {
        let before = self.views.len();
        self.views.retain(|v| v.name != name);
        self.views.len() != before
    }

    pub fn render_text(&self) -> String {
        let mut output = String::new();
        for view in &self.views {
            output.push_str(&format!("{:<24} {}\n", view.name, view.value));
        }
        output
    }
}
