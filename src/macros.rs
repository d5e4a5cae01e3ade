//! `@/name` macro mapping: a session-scoped set of pre-written prompts
//! (SPEC_FULL §3 Macro, §4.1 op 3).

use std::collections::BTreeMap;

use crate::error::BishError;

/// Session-configured `@/name` → prompt-text mapping.
#[derive(Debug, Clone, Default)]
pub struct MacroTable {
    entries: BTreeMap<String, String>,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, prompt: impl Into<String>) {
        self.entries.insert(name.into(), prompt.into());
    }

    /// Expand `@/name` to its configured prompt, or `UnknownMacro` if the
    /// name was never registered (SPEC_FULL §4.1 op 3).
    pub fn expand(&self, name: &str) -> Result<&str, BishError> {
        self.entries
            .get(name)
            .map(|s| s.as_str())
            .ok_or_else(|| BishError::UnknownMacro(name.to_string()))
    }

    /// Names whose text has `prefix` as a prefix, sorted alphabetically
    /// (SPEC_FULL §4.5 `@/` completion).
    pub fn names_with_prefix(&self, prefix: &str) -> Vec<&str> {
        self.entries
            .keys()
            .filter(|name| name.starts_with(prefix))
            .map(|s| s.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_returns_configured_prompt() {
        let mut table = MacroTable::new();
        table.insert("explain", "Explain what this command does.");
        assert_eq!(
            table.expand("explain").unwrap(),
            "Explain what this command does."
        );
    }

    #[test]
    fn expand_unknown_macro_is_an_error() {
        let table = MacroTable::new();
        assert!(matches!(
            table.expand("nope"),
            Err(BishError::UnknownMacro(_))
        ));
    }

    #[test]
    fn names_with_prefix_is_sorted_alphabetically() {
        let mut table = MacroTable::new();
        table.insert("zeta", "z");
        table.insert("alpha", "a");
        table.insert("alphabet", "ab");
        assert_eq!(table.names_with_prefix("al"), vec!["alpha", "alphabet"]);
    }
}
