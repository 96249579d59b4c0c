use serde::Deserialize;
use serde::Serialize;

use crate::paths::is_within;
use crate::paths::normalize_path;
use crate::paths::resolve_path;
use crate::rules::RuleStore;
use crate::rules::RuleStoreError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionKind {
    Read,
    Write,
    Shell,
    Url,
    Mcp,
    /// Anything the runtime sends that this build does not model. Always asks.
    #[default]
    #[serde(other)]
    Unknown,
}

impl PermissionKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Shell => "shell",
            Self::Url => "url",
            Self::Mcp => "mcp",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "read" => Some(Self::Read),
            "write" => Some(Self::Write),
            "shell" => Some(Self::Shell),
            "url" => Some(Self::Url),
            "mcp" => Some(Self::Mcp),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PermissionRequest {
    pub kind: PermissionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intention: Option<String>,
}

impl PermissionRequest {
    pub fn new(kind: PermissionKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// First non-blank of `path`, `file`, `filePath`, `fileName`.
    pub fn target_path(&self) -> Option<&str> {
        [&self.path, &self.file, &self.file_path, &self.file_name]
            .into_iter()
            .filter_map(|candidate| candidate.as_deref())
            .map(str::trim)
            .find(|candidate| !candidate.is_empty())
    }

    /// Short human description for prompts and transcript banners.
    pub fn summary(&self) -> String {
        let subject = self
            .command
            .as_deref()
            .or(self.target_path())
            .or(self.url.as_deref())
            .or(self.server_name.as_deref())
            .unwrap_or("");
        if subject.is_empty() {
            self.kind.label().to_string()
        } else {
            format!("{} {}", self.kind.label(), subject)
        }
    }
}

/// Paths under `path_prefix` are always approved for `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRule {
    pub kind: PermissionKind,
    pub path_prefix: String,
}

impl PermissionRule {
    pub fn new(kind: PermissionKind, path_prefix: &str) -> Self {
        Self {
            kind,
            path_prefix: normalize_path(path_prefix),
        }
    }

    fn matches(&self, request: &PermissionRequest, path: Option<&str>, working_root: &str) -> bool {
        if self.kind != request.kind || self.path_prefix.is_empty() {
            return false;
        }
        match request.kind {
            PermissionKind::Shell => is_within(working_root, &self.path_prefix),
            _ => path.is_some_and(|path| is_within(path, &self.path_prefix)),
        }
    }
}

/// Ordered, deduplicated rule list. Insertion order is match order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<PermissionRule>,
}

impl RuleSet {
    pub fn from_rules(rules: impl IntoIterator<Item = PermissionRule>) -> Self {
        let mut set = Self::default();
        for rule in rules {
            set.insert(PermissionRule::new(rule.kind, &rule.path_prefix));
        }
        set
    }

    /// Returns false when an identical normalized rule already exists, or the
    /// rule could never be stored (empty prefix, unknown kind).
    pub fn add(&mut self, kind: PermissionKind, path_prefix: &str) -> bool {
        self.insert(PermissionRule::new(kind, path_prefix))
    }

    fn insert(&mut self, rule: PermissionRule) -> bool {
        if rule.kind == PermissionKind::Unknown
            || rule.path_prefix.is_empty()
            || self.rules.contains(&rule)
        {
            return false;
        }
        self.rules.push(rule);
        true
    }

    pub fn remove(&mut self, index: usize) -> Option<PermissionRule> {
        (index < self.rules.len()).then(|| self.rules.remove(index))
    }

    pub fn clear(&mut self) {
        self.rules.clear();
    }

    pub fn as_slice(&self) -> &[PermissionRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOutcome {
    Allow,
    Ask,
}

impl DecisionOutcome {
    pub fn label(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Ask => "ask",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    LowRiskKind,
    ReadInsideRoot,
    AutoApproveInsideRoot,
    AutoApproveShell,
    MatchedRule,
    NoMatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub decision: DecisionOutcome,
    pub reason: DecisionReason,
    pub matched_rule: Option<usize>,
    pub message: String,
}

impl PolicyDecision {
    fn allow(reason: DecisionReason, message: impl Into<String>) -> Self {
        Self {
            decision: DecisionOutcome::Allow,
            reason,
            matched_rule: None,
            message: message.into(),
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.decision == DecisionOutcome::Allow
    }
}

/// Pure policy evaluation. Total over its input: anything not explicitly
/// allowed asks.
pub fn evaluate(
    request: &PermissionRequest,
    working_root: &str,
    rules: &[PermissionRule],
    auto_approve: bool,
) -> PolicyDecision {
    if matches!(request.kind, PermissionKind::Url | PermissionKind::Mcp) {
        return PolicyDecision::allow(
            DecisionReason::LowRiskKind,
            format!("{} requests are allowed", request.kind.label()),
        );
    }

    let root = normalize_path(working_root);
    let path = request
        .target_path()
        .map(|raw| resolve_path(raw, &root))
        .filter(|path| !path.is_empty());
    let inside_root = !root.is_empty() && path.as_deref().is_some_and(|p| is_within(p, &root));

    if request.kind == PermissionKind::Read && inside_root {
        return PolicyDecision::allow(DecisionReason::ReadInsideRoot, "read inside working root");
    }

    if auto_approve {
        match request.kind {
            PermissionKind::Read | PermissionKind::Write if inside_root => {
                return PolicyDecision::allow(
                    DecisionReason::AutoApproveInsideRoot,
                    format!("auto-approved {} inside working root", request.kind.label()),
                );
            }
            PermissionKind::Shell => {
                return PolicyDecision::allow(
                    DecisionReason::AutoApproveShell,
                    "auto-approved shell command",
                );
            }
            _ => {}
        }
    }

    for (index, rule) in rules.iter().enumerate() {
        if rule.matches(request, path.as_deref(), &root) {
            return PolicyDecision {
                decision: DecisionOutcome::Allow,
                reason: DecisionReason::MatchedRule,
                matched_rule: Some(index),
                message: format!(
                    "always-allow rule for {} under {}",
                    rule.kind.label(),
                    rule.path_prefix
                ),
            };
        }
    }

    PolicyDecision {
        decision: DecisionOutcome::Ask,
        reason: DecisionReason::NoMatch,
        matched_rule: None,
        message: format!("approval required for {}", request.summary()),
    }
}

/// The policy evaluator together with its rule list and the volatile
/// auto-approve flag. Rule mutations are written through to the store.
pub struct PermissionPolicy {
    rules: RuleSet,
    auto_approve: bool,
    store: Box<dyn RuleStore + Send>,
}

impl std::fmt::Debug for PermissionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionPolicy")
            .field("rules", &self.rules)
            .field("auto_approve", &self.auto_approve)
            .finish_non_exhaustive()
    }
}

impl PermissionPolicy {
    pub fn open(store: Box<dyn RuleStore + Send>) -> Result<Self, RuleStoreError> {
        let rules = RuleSet::from_rules(store.load()?);
        Ok(Self {
            rules,
            auto_approve: false,
            store,
        })
    }

    pub fn evaluate(&self, request: &PermissionRequest, working_root: &str) -> PolicyDecision {
        evaluate(
            request,
            working_root,
            self.rules.as_slice(),
            self.auto_approve,
        )
    }

    pub fn auto_approve(&self) -> bool {
        self.auto_approve
    }

    pub fn set_auto_approve(&mut self, enabled: bool) {
        if enabled != self.auto_approve {
            tracing::info!(enabled, "auto-approve mode changed");
        }
        self.auto_approve = enabled;
    }

    pub fn rules(&self) -> &[PermissionRule] {
        self.rules.as_slice()
    }

    pub fn add_rule(
        &mut self,
        kind: PermissionKind,
        path_prefix: &str,
    ) -> Result<bool, RuleStoreError> {
        let mut next = self.rules.clone();
        if !next.add(kind, path_prefix) {
            return Ok(false);
        }
        self.commit(next)?;
        Ok(true)
    }

    pub fn remove_rule(&mut self, index: usize) -> Result<Option<PermissionRule>, RuleStoreError> {
        let mut next = self.rules.clone();
        let removed = next.remove(index);
        if removed.is_some() {
            self.commit(next)?;
        }
        Ok(removed)
    }

    pub fn clear_rules(&mut self) -> Result<(), RuleStoreError> {
        self.commit(RuleSet::default())
    }

    fn commit(&mut self, next: RuleSet) -> Result<(), RuleStoreError> {
        self.store.save(next.as_slice())?;
        self.rules = next;
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use super::*;
    use crate::rules::MemoryRuleStore;

    fn policy() -> PermissionPolicy {
        PermissionPolicy::open(Box::new(MemoryRuleStore::default())).expect("memory store")
    }

    fn read(path: &str) -> PermissionRequest {
        PermissionRequest::new(PermissionKind::Read).with_path(path)
    }

    fn write(path: &str) -> PermissionRequest {
        PermissionRequest::new(PermissionKind::Write).with_path(path)
    }

    fn shell() -> PermissionRequest {
        PermissionRequest::new(PermissionKind::Shell).with_command("cargo test")
    }

    #[test]
    fn url_and_mcp_are_always_allowed() {
        let policy = policy();
        for kind in [PermissionKind::Url, PermissionKind::Mcp] {
            let decision = policy.evaluate(&PermissionRequest::new(kind), "");
            assert_eq!(decision.decision, DecisionOutcome::Allow);
            assert_eq!(decision.reason, DecisionReason::LowRiskKind);
        }
    }

    #[test]
    fn read_inside_root_is_allowed_and_outside_asks() {
        let policy = policy();
        assert!(policy.evaluate(&read("/repo"), "/repo").is_allowed());
        assert!(policy.evaluate(&read("/repo/src/main.rs"), "/repo/").is_allowed());
        assert!(policy.evaluate(&read("src/main.rs"), "/repo").is_allowed());
        assert!(!policy.evaluate(&read("/repository/x"), "/repo").is_allowed());
        assert!(!policy.evaluate(&read("/repo/../etc/passwd"), "/repo").is_allowed());
        assert!(!policy.evaluate(&read("/repo/a"), "").is_allowed());
    }

    #[test]
    fn read_path_is_taken_from_fields_in_priority_order() {
        let policy = policy();
        let mut request = PermissionRequest::new(PermissionKind::Read);
        request.file_name = Some("/etc/hosts".to_string());
        request.file_path = Some("/repo/a.rs".to_string());
        assert_eq!(request.target_path(), Some("/repo/a.rs"));
        assert!(policy.evaluate(&request, "/repo").is_allowed());

        request.path = Some("  ".to_string());
        request.file = Some("/etc/shadow".to_string());
        assert_eq!(request.target_path(), Some("/etc/shadow"));
        assert!(!policy.evaluate(&request, "/repo").is_allowed());
    }

    #[test]
    fn missing_path_defaults_to_ask() {
        let policy = policy();
        let decision = policy.evaluate(&PermissionRequest::new(PermissionKind::Read), "/repo");
        assert_eq!(decision.decision, DecisionOutcome::Ask);
        assert_eq!(decision.reason, DecisionReason::NoMatch);
    }

    #[test]
    fn auto_approve_is_root_scoped_for_files_and_global_for_shell() {
        let mut policy = policy();
        assert!(!policy.evaluate(&write("/repo/f"), "/repo").is_allowed());
        assert!(!policy.evaluate(&shell(), "/anywhere").is_allowed());

        policy.set_auto_approve(true);
        let decision = policy.evaluate(&write("/repo/f"), "/repo");
        assert_eq!(decision.reason, DecisionReason::AutoApproveInsideRoot);
        assert_eq!(
            policy.evaluate(&write("/etc/x"), "/repo").decision,
            DecisionOutcome::Ask
        );
        assert_eq!(
            policy.evaluate(&shell(), "/anywhere").reason,
            DecisionReason::AutoApproveShell
        );
    }

    #[test]
    fn auto_approve_falls_through_to_rules_outside_root() {
        let mut policy = policy();
        policy.set_auto_approve(true);
        policy
            .add_rule(PermissionKind::Write, "/etc")
            .expect("add rule");
        let decision = policy.evaluate(&write("/etc/x"), "/repo");
        assert_eq!(decision.reason, DecisionReason::MatchedRule);
        assert_eq!(decision.matched_rule, Some(0));
    }

    #[test]
    fn shell_rules_match_on_working_root() {
        let mut policy = policy();
        assert_eq!(
            policy.evaluate(&shell(), "/home/project").decision,
            DecisionOutcome::Ask
        );
        policy
            .add_rule(PermissionKind::Shell, "/home/project")
            .expect("add rule");
        assert!(policy.evaluate(&shell(), "/home/project/sub").is_allowed());
        assert_eq!(
            policy.evaluate(&shell(), "/other").decision,
            DecisionOutcome::Ask
        );
    }

    #[test]
    fn rules_only_match_their_own_kind() {
        let mut policy = policy();
        policy
            .add_rule(PermissionKind::Read, "/data")
            .expect("add rule");
        assert!(policy.evaluate(&read("/data/x"), "/repo").is_allowed());
        assert!(!policy.evaluate(&write("/data/x"), "/repo").is_allowed());
    }

    #[test]
    fn first_matching_rule_wins() {
        let mut policy = policy();
        policy.add_rule(PermissionKind::Write, "/a").expect("add");
        policy.add_rule(PermissionKind::Write, "/a/b").expect("add");
        assert_eq!(
            policy.evaluate(&write("/a/b/c"), "/repo").matched_rule,
            Some(0)
        );
    }

    #[test]
    fn add_rule_normalizes_and_deduplicates() {
        let mut policy = policy();
        assert!(policy
            .add_rule(PermissionKind::Write, "/home/project/")
            .expect("add"));
        assert!(!policy
            .add_rule(PermissionKind::Write, "/home/./project")
            .expect("add"));
        assert!(policy
            .add_rule(PermissionKind::Read, "/home/project")
            .expect("add"));
        assert_eq!(
            policy.rules(),
            &[
                PermissionRule::new(PermissionKind::Write, "/home/project"),
                PermissionRule::new(PermissionKind::Read, "/home/project"),
            ]
        );
    }

    #[test]
    fn remove_and_clear_write_through_to_store() {
        let store = MemoryRuleStore::default();
        let mut policy = PermissionPolicy::open(Box::new(store.clone())).expect("open");
        policy.add_rule(PermissionKind::Write, "/a").expect("add");
        policy.add_rule(PermissionKind::Shell, "/b").expect("add");
        assert_eq!(store.snapshot().len(), 2);

        let removed = policy.remove_rule(0).expect("remove");
        assert_eq!(removed, Some(PermissionRule::new(PermissionKind::Write, "/a")));
        assert_eq!(policy.remove_rule(5).expect("remove"), None);
        assert_eq!(store.snapshot(), policy.rules().to_vec());

        policy.clear_rules().expect("clear");
        assert!(policy.rules().is_empty());
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn unknown_kind_always_asks() {
        let mut policy = policy();
        policy.set_auto_approve(true);
        let request = PermissionRequest::new(PermissionKind::Unknown).with_path("/repo/x");
        assert_eq!(
            policy.evaluate(&request, "/repo").decision,
            DecisionOutcome::Ask
        );
    }

    fn segments() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec("[a-z][a-z0-9_]{0,7}", 1..5)
    }

    proptest! {
        #[test]
        fn read_at_or_below_root_is_allowed(root in segments(), tail in prop::collection::vec("[a-z][a-z0-9_]{0,7}", 0..4)) {
            let root = format!("/{}", root.join("/"));
            let path = if tail.is_empty() {
                root.clone()
            } else {
                format!("{root}/{}", tail.join("/"))
            };
            let decision = evaluate(&read(&path), &root, &[], false);
            prop_assert_eq!(decision.decision, DecisionOutcome::Allow);
        }

        #[test]
        fn read_outside_root_without_rules_asks(root in segments(), other in segments()) {
            let root = format!("/r/{}", root.join("/"));
            let path = format!("/o/{}", other.join("/"));
            let decision = evaluate(&read(&path), &root, &[], false);
            prop_assert_eq!(decision.decision, DecisionOutcome::Ask);
        }

        #[test]
        fn adding_a_rule_twice_stores_it_once(prefix in segments(), trailing in any::<bool>()) {
            let mut rules = RuleSet::default();
            let raw = format!("/{}", prefix.join("/"));
            let variant = if trailing { format!("{raw}/") } else { format!("{raw}/.") };
            prop_assert!(rules.add(PermissionKind::Write, &raw));
            prop_assert!(!rules.add(PermissionKind::Write, &variant));
            prop_assert_eq!(rules.len(), 1);
        }
    }
}
