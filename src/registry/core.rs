use std::collections::BTreeSet;

/// Live display names. Generation picks the smallest free numeric suffix, so
/// released names are handed out again.
#[derive(Debug, Default, Clone)]
pub struct DisplayNameRegistry {
    live: BTreeSet<String>,
}

impl DisplayNameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce and reserve a name unique among all live names.
    ///
    /// Trailing digits on `base` are treated as an existing suffix, so
    /// `generate("input3")` competes for the same `input{n}` space as
    /// `generate("input")`.
    pub fn generate(&mut self, base: &str) -> String {
        let stem = split_suffix(base);
        let mut suffix: u64 = 1;
        loop {
            let candidate = format!("{stem}{suffix}");
            if !self.live.contains(&candidate) {
                self.live.insert(candidate.clone());
                return candidate;
            }
            suffix += 1;
        }
    }

    /// Reserve an externally chosen name. Returns `false` if it was already live.
    pub fn reserve(&mut self, name: &str) -> bool {
        self.live.insert(name.to_string())
    }

    /// Release a name back to the pool. Returns `false` if it was not live.
    pub fn remove(&mut self, name: &str) -> bool {
        self.live.remove(name)
    }

    pub fn remove_multi<I, S>(&mut self, names: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .filter(|name| self.live.remove(name.as_ref()))
            .count()
    }

    /// Release `old` and make sure `new` stays reserved.
    pub fn rename(&mut self, old: &str, new: &str) {
        if old == new {
            return;
        }
        self.live.remove(old);
        self.live.insert(new.to_string());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.live.contains(name)
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn clear(&mut self) {
        self.live.clear();
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.live.iter().map(String::as_str)
    }
}

fn split_suffix(base: &str) -> &str {
    let stem = base.trim_end_matches(|c: char| c.is_ascii_digit());
    if stem.is_empty() { base } else { stem }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_increments_suffix() {
        let mut registry = DisplayNameRegistry::new();
        assert_eq!(registry.generate("input"), "input1");
        assert_eq!(registry.generate("input"), "input2");
        assert_eq!(registry.generate("button"), "button1");
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn released_names_are_reused() {
        let mut registry = DisplayNameRegistry::new();
        registry.generate("input");
        registry.generate("input");
        registry.generate("input");
        assert_eq!(registry.remove_multi(["input1", "input3", "missing"]), 2);
        assert_eq!(registry.generate("input"), "input1");
        assert_eq!(registry.generate("input"), "input3");
    }

    #[test]
    fn existing_suffix_is_not_stacked() {
        let mut registry = DisplayNameRegistry::new();
        registry.reserve("text1");
        assert_eq!(registry.generate("text1"), "text2");
        assert_eq!(registry.generate("2024"), "20241");
    }

    #[test]
    fn rename_keeps_new_name_reserved() {
        let mut registry = DisplayNameRegistry::new();
        registry.reserve("input1");
        registry.reserve("email");
        registry.rename("input1", "email");
        assert!(!registry.contains("input1"));
        assert!(registry.contains("email"));
        assert_eq!(registry.generate("input"), "input1");
    }
}
