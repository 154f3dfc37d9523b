use serde::{Deserialize, Serialize};

/// Pointer position over the canvas, in pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasCursor {
    pub x: f64,
    pub y: f64,
    pub hovered: Option<String>,
}

/// Editor-only selection and cursor bookkeeping; never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionState {
    selected: Vec<String>,
    cursor: Option<CanvasCursor>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the selection, keeping first occurrences in order.
    pub fn select<I>(&mut self, names: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.selected.clear();
        for name in names {
            if !self.selected.contains(&name) {
                self.selected.push(name);
            }
        }
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    pub fn selected(&self) -> &[String] {
        &self.selected
    }

    pub fn is_selected(&self, name: &str) -> bool {
        self.selected.iter().any(|selected| selected == name)
    }

    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&str) -> bool,
    {
        self.selected.retain(|name| keep(name));
        if let Some(cursor) = self.cursor.as_mut() {
            if cursor.hovered.as_deref().is_some_and(|name| !keep(name)) {
                cursor.hovered = None;
            }
        }
    }

    pub fn rename(&mut self, old: &str, new: &str) {
        for name in self.selected.iter_mut().filter(|name| name.as_str() == old) {
            *name = new.to_string();
        }
        if let Some(cursor) = self.cursor.as_mut() {
            if cursor.hovered.as_deref() == Some(old) {
                cursor.hovered = Some(new.to_string());
            }
        }
    }

    pub fn set_cursor(&mut self, cursor: CanvasCursor) {
        self.cursor = Some(cursor);
    }

    pub fn reset_cursor(&mut self) {
        self.cursor = None;
    }

    pub fn cursor(&self) -> Option<&CanvasCursor> {
        self.cursor.as_ref()
    }
}
