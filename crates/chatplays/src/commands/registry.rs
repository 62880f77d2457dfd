//! Command Registry
//!
//! Known command ids, their enabled flag, group memberships and per-command
//! options. Insertion order is preserved for both commands and groups since
//! snapshot rendering and UI listings depend on it.

use indexmap::{IndexMap, IndexSet};

use chatplays_types::{CommandOptions, CommandState};

/// A registered command
#[derive(Debug, Clone, Default)]
pub struct CommandEntry {
    pub enabled: bool,
    pub options: CommandOptions,
}

/// Command and group table
#[derive(Debug, Default)]
pub struct CommandRegistry {
    commands: IndexMap<String, CommandEntry>,
    groups: IndexMap<String, IndexSet<String>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or reset a command; it starts disabled
    ///
    /// Returns whether the command was previously enabled.
    pub fn register(&mut self, id: &str, options: Option<CommandOptions>) -> bool {
        let was_enabled = self.is_enabled(id);
        self.commands.insert(
            id.to_string(),
            CommandEntry {
                enabled: false,
                options: options.unwrap_or_default(),
            },
        );
        was_enabled
    }

    /// Union `ids` into `group`, creating it if absent
    pub fn add_to_group<I, S>(&mut self, group: &str, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let members = self.groups.entry(group.to_string()).or_default();
        members.extend(ids.into_iter().map(Into::into));
    }

    /// Set or flip a command's flag; `None` for unknown ids
    pub fn set_enabled(&mut self, id: &str, value: Option<bool>) -> Option<bool> {
        let entry = self.commands.get_mut(id)?;
        entry.enabled = value.unwrap_or(!entry.enabled);
        Some(entry.enabled)
    }

    /// Overlay options onto a registered command
    pub fn set_options(&mut self, id: &str, options: &CommandOptions) -> bool {
        match self.commands.get_mut(id) {
            Some(entry) => {
                entry.options = entry.options.overlay(options);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.commands.contains_key(id)
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    pub fn get(&self, id: &str) -> Option<&CommandEntry> {
        self.commands.get(id)
    }

    pub fn is_enabled(&self, id: &str) -> bool {
        self.commands.get(id).is_some_and(|entry| entry.enabled)
    }

    /// Members of a group, in insertion order
    pub fn group_members(&self, group: &str) -> Vec<String> {
        self.groups
            .get(group)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// All command ids, in registration order
    pub fn ids(&self) -> Vec<String> {
        self.commands.keys().cloned().collect()
    }

    /// Enabled command ids, in registration order
    pub fn enabled_ids(&self) -> Vec<String> {
        self.commands
            .iter()
            .filter(|(_, entry)| entry.enabled)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Group table, in group creation order
    pub fn groups(&self) -> &IndexMap<String, IndexSet<String>> {
        &self.groups
    }

    /// First group (by creation order) containing `id`
    pub fn first_group_of(&self, id: &str) -> Option<&str> {
        self.groups
            .iter()
            .find(|(_, members)| members.contains(id))
            .map(|(name, _)| name.as_str())
    }

    /// Per-command view for UI mirrors
    pub fn states(&self) -> Vec<CommandState> {
        self.commands
            .iter()
            .map(|(id, entry)| CommandState {
                id: id.clone(),
                enabled: entry.enabled,
                groups: self
                    .groups
                    .iter()
                    .filter(|(_, members)| members.contains(id))
                    .map(|(name, _)| name.clone())
                    .collect(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Drop every command and group
    pub fn clear(&mut self) {
        self.commands.clear();
        self.groups.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_starts_disabled() {
        let mut registry = CommandRegistry::new();
        assert!(!registry.register("lopen", None));
        assert!(registry.contains("lopen"));
        assert!(!registry.is_enabled("lopen"));
    }

    #[test]
    fn test_reregister_disables() {
        let mut registry = CommandRegistry::new();
        registry.register("lopen", None);
        registry.set_enabled("lopen", Some(true));

        assert!(registry.register("lopen", None));
        assert!(!registry.is_enabled("lopen"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_flip_and_unknown() {
        let mut registry = CommandRegistry::new();
        registry.register("boop", None);

        assert_eq!(registry.set_enabled("boop", None), Some(true));
        assert_eq!(registry.set_enabled("boop", None), Some(false));
        assert_eq!(registry.set_enabled("nope", Some(true)), None);
    }

    #[test]
    fn test_groups_keep_order_and_union() {
        let mut registry = CommandRegistry::new();
        registry.add_to_group("doors", ["lopen", "lclose"]);
        registry.add_to_group("cams", ["cams", "stage"]);
        registry.add_to_group("doors", ["lclose", "ropen"]);

        assert_eq!(registry.group_members("doors"), vec!["lopen", "lclose", "ropen"]);
        assert_eq!(registry.groups().keys().collect::<Vec<_>>(), vec!["doors", "cams"]);
        assert_eq!(registry.first_group_of("stage"), Some("cams"));
        assert_eq!(registry.first_group_of("boop"), None);
    }

    #[test]
    fn test_states_list_groups() {
        let mut registry = CommandRegistry::new();
        registry.register("cams", None);
        registry.add_to_group("cams", ["cams"]);
        registry.add_to_group("all", ["cams"]);
        registry.set_enabled("cams", Some(true));

        let states = registry.states();
        assert_eq!(
            states,
            vec![CommandState {
                id: "cams".into(),
                enabled: true,
                groups: vec!["cams".into(), "all".into()],
            }]
        );
    }
}
