//! Vote Aggregator
//!
//! Turns a stream of crowd votes into `command` fires. Each command keeps a
//! sliding window of pending votes; a fire needs `threshold` votes where each
//! vote lands within `timeout` of the previous one, and no fire may follow
//! another within `wait`.
//!
//! Mutations never call back into the rest of the system. They append
//! [`AggregatorEvent`]s to an outbox that the owner drains with
//! [`VoteAggregator::drain_events`], so group and bulk toggles emit exactly
//! one `Toggled` per batch.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chatplays_types::{CommandOptions, SessionTunables};

use super::control::{HostCommand, Target};
use super::registry::CommandRegistry;

// ─────────────────────────────────────────────────────────────────────────────
// Events and outcomes
// ─────────────────────────────────────────────────────────────────────────────

/// Notifications emitted by the aggregator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregatorEvent {
    /// A batch of enable/disable changes finished
    Toggled,
    /// The command crossed its threshold
    Command(String),
    /// `stop`/`reset` host command
    Stop,
    /// `start` host command, after the enabled-on-start pass
    Start,
}

/// Where a vote came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOrigin {
    Crowd,
    Privileged,
}

/// What happened to a single vote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    /// Unknown, disabled or privileged-only command
    Ignored,
    /// Inside the cooldown after the last fire
    Cooldown,
    /// Counted towards the threshold; carries the pending count
    Counted(u32),
    /// Threshold reached
    Fired,
}

// ─────────────────────────────────────────────────────────────────────────────
// Policy
// ─────────────────────────────────────────────────────────────────────────────

/// Session-wide vote policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VotePolicy {
    pub threshold: u32,
    pub timeout: Duration,
    pub wait: Duration,
}

impl Default for VotePolicy {
    fn default() -> Self {
        VotePolicy::from(&SessionTunables::default())
    }
}

impl From<&SessionTunables> for VotePolicy {
    fn from(tunables: &SessionTunables) -> Self {
        Self {
            threshold: tunables.threshold,
            timeout: seconds(tunables.timeout),
            wait: seconds(tunables.wait),
        }
    }
}

/// Fully resolved options for one command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedOptions {
    pub threshold: u32,
    pub timeout: Duration,
    pub wait: Duration,
    pub enabled_on_start: bool,
    pub privileged_only: bool,
}

/// Seconds to a duration; negative or non-finite values become zero
pub(crate) fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

#[derive(Debug, Clone, Copy, Default)]
struct VoteState {
    pending: u32,
    window_started_at: Option<Instant>,
    last_fired_at: Option<Instant>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregator
// ─────────────────────────────────────────────────────────────────────────────

/// Vote aggregation and debounce over a [`CommandRegistry`]
#[derive(Debug, Default)]
pub struct VoteAggregator {
    registry: CommandRegistry,
    votes: HashMap<String, VoteState>,
    policy: VotePolicy,
    outbox: Vec<AggregatorEvent>,
}

impl VoteAggregator {
    pub fn new(policy: VotePolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn policy(&self) -> VotePolicy {
        self.policy
    }

    pub fn set_threshold(&mut self, threshold: u32) {
        self.policy.threshold = threshold;
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.policy.timeout = timeout;
    }

    pub fn set_wait(&mut self, wait: Duration) {
        self.policy.wait = wait;
    }

    /// Take every event emitted since the last drain
    pub fn drain_events(&mut self) -> Vec<AggregatorEvent> {
        std::mem::take(&mut self.outbox)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Registration
    // ─────────────────────────────────────────────────────────────────────────

    /// Add or reset a command: disabled, no pending votes, never fired
    pub fn register(&mut self, id: &str, group: Option<&str>, options: Option<CommandOptions>) {
        let was_enabled = self.registry.register(id, options);
        self.votes.insert(id.to_string(), VoteState::default());
        if let Some(group) = group {
            self.registry.add_to_group(group, [id]);
        }
        if was_enabled {
            self.outbox.push(AggregatorEvent::Toggled);
        }
    }

    pub fn add_to_group<I, S>(&mut self, group: &str, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.registry.add_to_group(group, ids);
    }

    /// Overlay options onto an already registered command
    pub fn set_options(&mut self, id: &str, options: &CommandOptions) -> bool {
        self.registry.set_options(id, options)
    }

    /// Options for `id` with session defaults filled in
    pub fn resolved_options(&self, id: &str) -> Option<ResolvedOptions> {
        let options = &self.registry.get(id)?.options;
        Some(ResolvedOptions {
            threshold: options.threshold.unwrap_or(self.policy.threshold),
            timeout: options.timeout_seconds.map_or(self.policy.timeout, seconds),
            wait: options.wait_seconds.map_or(self.policy.wait, seconds),
            enabled_on_start: options.enabled_on_start.unwrap_or(false),
            privileged_only: options.privileged_only.unwrap_or(false),
        })
    }

    /// Forget every command, group and vote
    pub fn reset(&mut self) {
        self.registry.clear();
        self.votes.clear();
        self.outbox.push(AggregatorEvent::Toggled);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Toggling
    // ─────────────────────────────────────────────────────────────────────────

    fn set_enabled(&mut self, id: &str, value: Option<bool>, now: Instant) -> bool {
        if self.registry.set_enabled(id, value).is_none() {
            return false;
        }
        let state = self.votes.entry(id.to_string()).or_default();
        state.pending = 0;
        state.window_started_at = Some(now);
        true
    }

    /// Set or flip one command; unknown ids are ignored
    pub fn toggle(&mut self, id: &str, value: Option<bool>, now: Instant) {
        if self.set_enabled(id, value, now) {
            self.outbox.push(AggregatorEvent::Toggled);
        }
    }

    /// Set or flip every member of a group, emitting one `Toggled`
    pub fn toggle_group(&mut self, group: &str, value: Option<bool>, now: Instant) {
        if !self.registry.has_group(group) {
            return;
        }
        for id in self.registry.group_members(group) {
            self.set_enabled(&id, value, now);
        }
        self.outbox.push(AggregatorEvent::Toggled);
    }

    /// Set or flip every command, emitting one `Toggled`
    pub fn toggle_all(&mut self, value: Option<bool>, now: Instant) {
        for id in self.registry.ids() {
            self.set_enabled(&id, value, now);
        }
        self.outbox.push(AggregatorEvent::Toggled);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Voting
    // ─────────────────────────────────────────────────────────────────────────

    /// Count one crowd vote
    pub fn receive(&mut self, id: &str, now: Instant) -> VoteOutcome {
        self.receive_from(id, VoteOrigin::Crowd, now)
    }

    /// Count one vote from the given origin
    pub fn receive_from(&mut self, id: &str, origin: VoteOrigin, now: Instant) -> VoteOutcome {
        if !self.registry.is_enabled(id) {
            return VoteOutcome::Ignored;
        }
        let Some(options) = self.resolved_options(id) else {
            return VoteOutcome::Ignored;
        };
        if options.privileged_only && origin == VoteOrigin::Crowd {
            return VoteOutcome::Ignored;
        }

        let state = self.votes.entry(id.to_string()).or_default();

        if let Some(fired_at) = state.last_fired_at {
            if now.saturating_duration_since(fired_at) < options.wait {
                return VoteOutcome::Cooldown;
            }
        }

        let count = match state.window_started_at {
            Some(started) if now.saturating_duration_since(started) <= options.timeout => {
                state.pending + 1
            }
            _ => 1,
        };

        if count >= options.threshold {
            state.last_fired_at = Some(now);
            state.pending = 0;
            self.outbox.push(AggregatorEvent::Command(id.to_string()));
            VoteOutcome::Fired
        } else {
            state.pending = count;
            state.window_started_at = Some(now);
            VoteOutcome::Counted(count)
        }
    }

    /// Pending vote count for a command
    pub fn pending_votes(&self, id: &str) -> Option<u32> {
        if !self.registry.contains(id) {
            return None;
        }
        Some(self.votes.get(id).map_or(0, |state| state.pending))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Host control surface
    // ─────────────────────────────────────────────────────────────────────────

    /// Apply a privileged host command
    ///
    /// Returns a human-readable description of what changed, or `None` when
    /// the target did not resolve.
    pub fn apply_host_command(&mut self, command: &HostCommand, now: Instant) -> Option<String> {
        match command {
            HostCommand::Enable(target) | HostCommand::Disable(target) => {
                let value = matches!(command, HostCommand::Enable(_));
                let state = if value { "enabled" } else { "disabled" };
                match self.resolve_target(target.as_deref()) {
                    Some(Target::All) => {
                        self.toggle_all(Some(value), now);
                        Some(format!("All commands {state}"))
                    }
                    Some(Target::Group(group)) => {
                        self.toggle_group(&group, Some(value), now);
                        Some(format!("Group {group} {state}"))
                    }
                    Some(Target::Command(id)) => {
                        self.toggle(&id, Some(value), now);
                        Some(format!("Command {id} {state}"))
                    }
                    None => None,
                }
            }
            HostCommand::Stop => {
                self.toggle_all(Some(false), now);
                self.outbox.push(AggregatorEvent::Stop);
                Some("All commands disabled and state reset".to_string())
            }
            HostCommand::Start => {
                for id in self.registry.ids() {
                    self.set_enabled(&id, Some(false), now);
                }
                self.outbox.push(AggregatorEvent::Start);

                let mut enabled = 0;
                for id in self.registry.ids() {
                    let on_start = self
                        .resolved_options(&id)
                        .is_some_and(|options| options.enabled_on_start);
                    if on_start {
                        self.set_enabled(&id, Some(true), now);
                        enabled += 1;
                    }
                }
                self.outbox.push(AggregatorEvent::Toggled);
                Some(format!("Started with {enabled} commands enabled"))
            }
        }
    }

    /// Group names win over command ids
    fn resolve_target(&self, target: Option<&str>) -> Option<Target> {
        match target {
            None => Some(Target::All),
            Some(name) if self.registry.has_group(name) => Some(Target::Group(name.to_string())),
            Some(name) if self.registry.contains(name) => Some(Target::Command(name.to_string())),
            Some(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn aggregator(threshold: u32, timeout: u64, wait: u64) -> VoteAggregator {
        VoteAggregator::new(VotePolicy {
            threshold,
            timeout: secs(timeout),
            wait: secs(wait),
        })
    }

    fn fires(events: &[AggregatorEvent]) -> usize {
        events
            .iter()
            .filter(|event| matches!(event, AggregatorEvent::Command(_)))
            .count()
    }

    #[test]
    fn test_threshold_reached_within_window() {
        let t0 = Instant::now();
        let mut agg = aggregator(3, 5, 0);
        agg.register("left", None, None);
        agg.toggle("left", Some(true), t0);
        agg.drain_events();

        assert_eq!(agg.receive("left", t0), VoteOutcome::Counted(1));
        assert_eq!(agg.receive("left", t0 + secs(1)), VoteOutcome::Counted(2));
        assert_eq!(agg.receive("left", t0 + secs(2)), VoteOutcome::Fired);

        assert_eq!(agg.pending_votes("left"), Some(0));
        assert_eq!(
            agg.drain_events(),
            vec![AggregatorEvent::Command("left".into())]
        );
    }

    #[test]
    fn test_expired_window_restarts_count() {
        let t0 = Instant::now();
        let mut agg = aggregator(3, 5, 0);
        agg.register("left", None, None);
        agg.toggle("left", Some(true), t0);

        agg.receive("left", t0);
        agg.receive("left", t0 + secs(1));
        assert_eq!(agg.receive("left", t0 + secs(7)), VoteOutcome::Counted(1));
        assert_eq!(agg.pending_votes("left"), Some(1));
    }

    #[test]
    fn test_window_slides_with_each_vote() {
        let t0 = Instant::now();
        let mut agg = aggregator(3, 5, 0);
        agg.register("left", None, None);
        agg.toggle("left", Some(true), t0);

        agg.receive("left", t0 + secs(4));
        agg.receive("left", t0 + secs(9));
        assert_eq!(agg.receive("left", t0 + secs(14)), VoteOutcome::Fired);
    }

    #[test]
    fn test_cooldown_drops_votes() {
        let t0 = Instant::now();
        let mut agg = aggregator(2, 5, 10);
        agg.register("boop", None, None);
        agg.toggle("boop", Some(true), t0);

        agg.receive("boop", t0);
        assert_eq!(agg.receive("boop", t0), VoteOutcome::Fired);
        agg.drain_events();

        assert_eq!(agg.receive("boop", t0 + secs(1)), VoteOutcome::Cooldown);
        assert_eq!(agg.receive("boop", t0 + secs(2)), VoteOutcome::Cooldown);
        assert_eq!(agg.pending_votes("boop"), Some(0));

        assert_eq!(agg.receive("boop", t0 + secs(11)), VoteOutcome::Counted(1));
        assert_eq!(agg.receive("boop", t0 + secs(12)), VoteOutcome::Fired);
        assert_eq!(fires(&agg.drain_events()), 1);
    }

    #[test]
    fn test_disabled_and_unknown_are_ignored() {
        let t0 = Instant::now();
        let mut agg = aggregator(1, 5, 0);
        agg.register("cams", None, None);

        assert_eq!(agg.receive("cams", t0), VoteOutcome::Ignored);
        assert_eq!(agg.receive("ghost", t0), VoteOutcome::Ignored);
        assert!(agg.drain_events().is_empty());
    }

    #[test]
    fn test_per_command_options_override_policy() {
        let t0 = Instant::now();
        let mut agg = aggregator(4, 2, 0);
        agg.register(
            "boop",
            None,
            Some(CommandOptions {
                threshold: Some(1),
                ..Default::default()
            }),
        );
        agg.toggle("boop", Some(true), t0);

        assert_eq!(agg.receive("boop", t0), VoteOutcome::Fired);
    }

    #[test]
    fn test_privileged_only_ignores_crowd() {
        let t0 = Instant::now();
        let mut agg = aggregator(1, 2, 0);
        agg.register(
            "quit",
            None,
            Some(CommandOptions {
                privileged_only: Some(true),
                ..Default::default()
            }),
        );
        agg.toggle("quit", Some(true), t0);

        assert_eq!(agg.receive("quit", t0), VoteOutcome::Ignored);
        assert_eq!(
            agg.receive_from("quit", VoteOrigin::Privileged, t0),
            VoteOutcome::Fired
        );
    }

    #[test]
    fn test_toggle_resets_window() {
        let t0 = Instant::now();
        let mut agg = aggregator(3, 5, 0);
        agg.register("left", None, None);
        agg.toggle("left", Some(true), t0);
        agg.receive("left", t0);
        agg.receive("left", t0);

        agg.toggle("left", Some(true), t0 + secs(1));
        assert_eq!(agg.pending_votes("left"), Some(0));
        assert_eq!(agg.receive("left", t0 + secs(2)), VoteOutcome::Counted(1));
    }

    #[test]
    fn test_group_toggle_emits_once() {
        let t0 = Instant::now();
        let mut agg = aggregator(1, 5, 0);
        for id in ["lopen", "lclose", "ropen", "rclose"] {
            agg.register(id, Some("doors"), None);
        }
        agg.drain_events();

        agg.toggle_group("doors", Some(true), t0);
        assert_eq!(agg.drain_events(), vec![AggregatorEvent::Toggled]);
        assert_eq!(agg.registry().enabled_ids().len(), 4);

        agg.toggle_group("doors", None, t0);
        assert_eq!(agg.drain_events(), vec![AggregatorEvent::Toggled]);
        assert!(agg.registry().enabled_ids().is_empty());
    }

    #[test]
    fn test_unknown_targets_emit_nothing() {
        let t0 = Instant::now();
        let mut agg = aggregator(1, 5, 0);
        agg.toggle("ghost", Some(true), t0);
        agg.toggle_group("ghosts", Some(true), t0);
        assert!(agg.drain_events().is_empty());
    }

    #[test]
    fn test_reregister_clears_votes() {
        let t0 = Instant::now();
        let mut agg = aggregator(3, 5, 0);
        agg.register("left", None, None);
        agg.toggle("left", Some(true), t0);
        agg.receive("left", t0);
        agg.drain_events();

        agg.register("left", None, None);
        assert_eq!(agg.pending_votes("left"), Some(0));
        assert!(!agg.registry().is_enabled("left"));
        assert_eq!(agg.drain_events(), vec![AggregatorEvent::Toggled]);
    }

    #[test]
    fn test_enable_resolves_group_before_command() {
        let t0 = Instant::now();
        let mut agg = aggregator(1, 5, 0);
        agg.register("lopen", Some("doors"), None);
        agg.register("ropen", Some("doors"), None);
        agg.register("boop", None, None);
        agg.drain_events();

        let line = agg.apply_host_command(&HostCommand::Enable(Some("doors".into())), t0);
        assert_eq!(line.as_deref(), Some("Group doors enabled"));
        assert_eq!(agg.registry().enabled_ids(), vec!["lopen", "ropen"]);
        assert_eq!(agg.drain_events(), vec![AggregatorEvent::Toggled]);
    }

    #[test]
    fn test_disable_single_command_and_all() {
        let t0 = Instant::now();
        let mut agg = aggregator(1, 5, 0);
        agg.register("lopen", None, None);
        agg.register("boop", None, None);
        agg.apply_host_command(&HostCommand::Enable(None), t0);
        assert_eq!(agg.registry().enabled_ids().len(), 2);

        agg.apply_host_command(&HostCommand::Disable(Some("boop".into())), t0);
        assert_eq!(agg.registry().enabled_ids(), vec!["lopen"]);

        let line = agg.apply_host_command(&HostCommand::Enable(Some("nothing".into())), t0);
        assert!(line.is_none());
    }

    #[test]
    fn test_stop_disables_and_emits_stop() {
        let t0 = Instant::now();
        let mut agg = aggregator(1, 5, 0);
        agg.register("lopen", None, None);
        agg.toggle_all(Some(true), t0);
        agg.drain_events();

        agg.apply_host_command(&HostCommand::Stop, t0);
        assert!(agg.registry().enabled_ids().is_empty());
        assert_eq!(
            agg.drain_events(),
            vec![AggregatorEvent::Toggled, AggregatorEvent::Stop]
        );
    }

    #[test]
    fn test_start_enables_flagged_commands() {
        let t0 = Instant::now();
        let on_start = CommandOptions {
            enabled_on_start: Some(true),
            ..Default::default()
        };
        let mut agg = aggregator(1, 5, 0);
        agg.register("cams", None, Some(on_start.clone()));
        agg.register("boop", None, None);
        agg.register("stage", None, Some(on_start));
        agg.toggle("boop", Some(true), t0);
        agg.drain_events();

        agg.apply_host_command(&HostCommand::Start, t0);
        assert_eq!(agg.registry().enabled_ids(), vec!["cams", "stage"]);

        let events = agg.drain_events();
        assert_eq!(events, vec![AggregatorEvent::Start, AggregatorEvent::Toggled]);
        let toggled = events
            .iter()
            .filter(|event| **event == AggregatorEvent::Toggled)
            .count();
        assert_eq!(toggled, 1);
    }

    #[test]
    fn test_reset_forgets_everything() {
        let mut agg = aggregator(1, 5, 0);
        agg.register("lopen", Some("doors"), None);
        agg.reset();

        assert!(agg.registry().is_empty());
        assert!(!agg.registry().has_group("doors"));
        assert_eq!(agg.pending_votes("lopen"), None);
    }

    #[test]
    fn test_seconds_rejects_bad_values() {
        assert_eq!(seconds(-1.0), Duration::ZERO);
        assert_eq!(seconds(f64::NAN), Duration::ZERO);
        assert_eq!(seconds(1.5), Duration::from_millis(1500));
    }
}
