//! # Routing rules for messages sent without a topic.
//!
//! Rules are evaluated in registration order. Every enabled rule whose
//! pattern matches the message **type** or **source** contributes its targets;
//! all matches are unioned and deduplicated. If nothing matches, the
//! message's own `target` is used.
//!
//! ## Example
//! ```rust
//! use agentvisor::{Priority, RoutePattern, RouteTarget, RoutingRule};
//!
//! // Every `error` message also goes to the auditor and the ui.
//! let rule = RoutingRule::new(
//!     RoutePattern::literal("error"),
//!     RouteTarget::components(["auditor", "ui"]),
//! )
//! .with_priority(Priority::High);
//! assert!(rule.enabled);
//!
//! // Anything coming from a `sensor-*` source is broadcast.
//! let rule = RoutingRule::new(RoutePattern::regex("^sensor-").unwrap(), RouteTarget::Broadcast);
//! assert_eq!(rule.pattern.as_str(), "^sensor-");
//! ```

use regex::Regex;

use crate::message::{Message, Priority};

/// Identifier returned by [`MessageBus::add_routing_rule`](crate::MessageBus::add_routing_rule).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(pub(crate) u64);

/// What a rule matches against a message's type and source.
#[derive(Debug, Clone)]
pub enum RoutePattern {
    /// Exact string equality.
    Literal(String),
    /// Regular expression search.
    Regex(Regex),
}

impl RoutePattern {
    pub fn literal(pattern: impl Into<String>) -> Self {
        RoutePattern::Literal(pattern.into())
    }

    /// Compiles a regex pattern.
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(RoutePattern::Regex(Regex::new(pattern)?))
    }

    /// Source text of the pattern.
    pub fn as_str(&self) -> &str {
        match self {
            RoutePattern::Literal(s) => s,
            RoutePattern::Regex(re) => re.as_str(),
        }
    }

    fn is_match(&self, value: &str) -> bool {
        match self {
            RoutePattern::Literal(s) => s == value,
            RoutePattern::Regex(re) => re.is_match(value),
        }
    }

    /// True if the pattern matches the message type or its source.
    pub fn matches(&self, message: &Message) -> bool {
        self.is_match(message.kind().as_str()) || self.is_match(message.source())
    }
}

/// Where matching messages go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTarget {
    /// Every subscriber of every topic.
    Broadcast,
    /// Handlers subscribed under exactly these component ids.
    Components(Vec<String>),
}

impl RouteTarget {
    pub fn component(id: impl Into<String>) -> Self {
        RouteTarget::Components(vec![id.into()])
    }

    pub fn components<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RouteTarget::Components(ids.into_iter().map(Into::into).collect())
    }
}

/// A routing rule.
#[derive(Debug, Clone)]
pub struct RoutingRule {
    pub pattern: RoutePattern,
    pub target: RouteTarget,
    /// Informational; rules are always evaluated in registration order.
    pub priority: Priority,
    pub enabled: bool,
}

impl RoutingRule {
    /// Creates an enabled rule with normal priority.
    pub fn new(pattern: RoutePattern, target: RouteTarget) -> Self {
        Self {
            pattern,
            target,
            priority: Priority::Normal,
            enabled: true,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Resolved delivery targets of one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Resolved {
    Broadcast,
    Unicast(Vec<String>),
}

/// Ordered rule set.
#[derive(Debug, Default)]
pub(crate) struct RoutingTable {
    rules: Vec<(RuleId, RoutingRule)>,
    next_id: u64,
}

impl RoutingTable {
    pub(crate) fn add(&mut self, rule: RoutingRule) -> RuleId {
        self.next_id += 1;
        let id = RuleId(self.next_id);
        self.rules.push((id, rule));
        id
    }

    pub(crate) fn remove(&mut self, id: RuleId) -> bool {
        let before = self.rules.len();
        self.rules.retain(|(rid, _)| *rid != id);
        self.rules.len() != before
    }

    pub(crate) fn list(&self) -> Vec<(RuleId, RoutingRule)> {
        self.rules.clone()
    }

    /// Applies the rules; falls back to the message's own target.
    pub(crate) fn resolve(&self, message: &Message) -> Resolved {
        let mut targets: Vec<String> = Vec::new();
        let mut matched = false;

        for (_, rule) in self.rules.iter().filter(|(_, r)| r.enabled) {
            if !rule.pattern.matches(message) {
                continue;
            }
            matched = true;
            match &rule.target {
                RouteTarget::Broadcast => return Resolved::Broadcast,
                RouteTarget::Components(ids) => {
                    for id in ids {
                        if !targets.contains(id) {
                            targets.push(id.clone());
                        }
                    }
                }
            }
        }

        if matched {
            return Resolved::Unicast(targets);
        }
        if message.is_broadcast() {
            Resolved::Broadcast
        } else {
            Resolved::Unicast(vec![message.target().to_string()])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageType;

    fn cmd(source: &str) -> Message {
        Message::new(MessageType::Command, source, "run").to("worker")
    }

    #[test]
    fn test_no_rule_falls_back_to_target() {
        let table = RoutingTable::default();
        assert_eq!(
            table.resolve(&cmd("ui")),
            Resolved::Unicast(vec!["worker".into()])
        );

        let bcast = Message::new(MessageType::Event, "ui", "tick");
        assert_eq!(table.resolve(&bcast), Resolved::Broadcast);
    }

    #[test]
    fn test_matches_union_and_dedupe_in_order() {
        let mut table = RoutingTable::default();
        table.add(RoutingRule::new(
            RoutePattern::literal("command"),
            RouteTarget::components(["audit", "worker"]),
        ));
        table.add(RoutingRule::new(
            RoutePattern::regex("^u").unwrap(),
            RouteTarget::components(["worker", "ui-log"]),
        ));

        assert_eq!(
            table.resolve(&cmd("ui")),
            Resolved::Unicast(vec!["audit".into(), "worker".into(), "ui-log".into()])
        );
    }

    #[test]
    fn test_disabled_and_removed_rules_are_skipped() {
        let mut table = RoutingTable::default();
        table.add(
            RoutingRule::new(RoutePattern::literal("ui"), RouteTarget::Broadcast).disabled(),
        );
        let id = table.add(RoutingRule::new(
            RoutePattern::literal("ui"),
            RouteTarget::component("audit"),
        ));
        assert_eq!(
            table.resolve(&cmd("ui")),
            Resolved::Unicast(vec!["audit".into()])
        );

        assert!(table.remove(id));
        assert!(!table.remove(id));
        assert_eq!(
            table.resolve(&cmd("ui")),
            Resolved::Unicast(vec!["worker".into()])
        );
    }

    #[test]
    fn test_broadcast_rule_wins() {
        let mut table = RoutingTable::default();
        table.add(RoutingRule::new(
            RoutePattern::literal("command"),
            RouteTarget::component("audit"),
        ));
        table.add(RoutingRule::new(
            RoutePattern::literal("ui"),
            RouteTarget::Broadcast,
        ));
        assert_eq!(table.resolve(&cmd("ui")), Resolved::Broadcast);
    }
}
