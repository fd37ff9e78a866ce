//! Field validation for the effective preference state.
//!
//! Rules run in order over the whole effective state. A rule that cannot
//! evaluate (wrong value type, internal fault) reports nothing for its
//! field and the remaining rules still run.

use prefsync_core::PrefValue;
use thiserror::Error;
use tracing::debug;

use crate::overlay::EffectiveView;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleFault {
    #[error("{field} holds a {found} value, expected {expected}")]
    WrongType {
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{0}")]
    Internal(String),
}

pub trait ValidationRule {
    /// Field the reported error is attached to.
    fn field(&self) -> &str;

    /// `Ok(Some(message))` when the field is invalid.
    fn check(&self, view: &EffectiveView<'_>) -> Result<Option<String>, RuleFault>;
}

fn wrong_type(field: &str, expected: &'static str, found: &PrefValue) -> RuleFault {
    RuleFault::WrongType {
        field: field.to_string(),
        expected,
        found: found.kind(),
    }
}

/// Absent toggles count as disabled.
fn toggle_enabled(view: &EffectiveView<'_>, toggle: &str) -> Result<bool, RuleFault> {
    match view.get(toggle) {
        None => Ok(false),
        Some(PrefValue::Bool(b)) => Ok(*b),
        Some(other) => Err(wrong_type(toggle, "bool", other)),
    }
}

fn gate_open(view: &EffectiveView<'_>, when: Option<&str>) -> Result<bool, RuleFault> {
    match when {
        Some(toggle) => toggle_enabled(view, toggle),
        None => Ok(true),
    }
}

/// Integer within `[min, max]`, optionally only while a toggle is on.
pub struct IntRange {
    field: String,
    min: i64,
    max: i64,
    when: Option<String>,
}

impl IntRange {
    pub fn new(field: &str, min: i64, max: i64) -> Self {
        Self { field: field.to_string(), min, max, when: None }
    }

    pub fn when(mut self, toggle: &str) -> Self {
        self.when = Some(toggle.to_string());
        self
    }
}

impl ValidationRule for IntRange {
    fn field(&self) -> &str {
        &self.field
    }

    fn check(&self, view: &EffectiveView<'_>) -> Result<Option<String>, RuleFault> {
        if !gate_open(view, self.when.as_deref())? {
            return Ok(None);
        }
        let Some(value) = view.get(&self.field) else {
            return Ok(None);
        };
        let n = value
            .as_i64()
            .ok_or_else(|| wrong_type(&self.field, "integer", value))?;
        if n < self.min || n > self.max {
            return Ok(Some(format!("must be between {} and {}", self.min, self.max)));
        }
        Ok(None)
    }
}

/// Number no smaller than `min`, optionally only while a toggle is on.
pub struct AtLeast {
    field: String,
    min: f64,
    when: Option<String>,
}

impl AtLeast {
    pub fn new(field: &str, min: f64) -> Self {
        Self { field: field.to_string(), min, when: None }
    }

    pub fn when(mut self, toggle: &str) -> Self {
        self.when = Some(toggle.to_string());
        self
    }
}

impl ValidationRule for AtLeast {
    fn field(&self) -> &str {
        &self.field
    }

    fn check(&self, view: &EffectiveView<'_>) -> Result<Option<String>, RuleFault> {
        if !gate_open(view, self.when.as_deref())? {
            return Ok(None);
        }
        let Some(value) = view.get(&self.field) else {
            return Ok(None);
        };
        let n = value
            .as_f64()
            .ok_or_else(|| wrong_type(&self.field, "number", value))?;
        if n < self.min {
            return Ok(Some(format!("must be at least {}", self.min)));
        }
        Ok(None)
    }
}

/// Non-empty text whenever `toggle` is on.
pub struct RequiredWhen {
    field: String,
    toggle: String,
}

impl RequiredWhen {
    pub fn new(field: &str, toggle: &str) -> Self {
        Self { field: field.to_string(), toggle: toggle.to_string() }
    }
}

impl ValidationRule for RequiredWhen {
    fn field(&self) -> &str {
        &self.field
    }

    fn check(&self, view: &EffectiveView<'_>) -> Result<Option<String>, RuleFault> {
        if !toggle_enabled(view, &self.toggle)? {
            return Ok(None);
        }
        let missing = match view.get(&self.field) {
            None | Some(PrefValue::Null) => true,
            Some(PrefValue::Text(s)) => s.trim().is_empty(),
            Some(other) => return Err(wrong_type(&self.field, "text", other)),
        };
        if missing {
            return Ok(Some(format!("required when {} is enabled", self.toggle)));
        }
        Ok(None)
    }
}

/// Text of at least `min` characters. Empty text passes when `allow_empty`.
pub struct MinLength {
    field: String,
    min: usize,
    allow_empty: bool,
}

impl MinLength {
    pub fn new(field: &str, min: usize) -> Self {
        Self { field: field.to_string(), min, allow_empty: false }
    }

    pub fn allow_empty(mut self) -> Self {
        self.allow_empty = true;
        self
    }
}

impl ValidationRule for MinLength {
    fn field(&self) -> &str {
        &self.field
    }

    fn check(&self, view: &EffectiveView<'_>) -> Result<Option<String>, RuleFault> {
        let Some(value) = view.get(&self.field) else {
            return Ok(None);
        };
        let text = value
            .as_text()
            .ok_or_else(|| wrong_type(&self.field, "text", value))?;
        if text.is_empty() && self.allow_empty {
            return Ok(None);
        }
        if text.chars().count() < self.min {
            return Ok(Some(format!("must be at least {} characters", self.min)));
        }
        Ok(None)
    }
}

/// `field` must not equal `other` while `toggle` is on.
pub struct DistinctWhen {
    field: String,
    other: String,
    toggle: String,
}

impl DistinctWhen {
    pub fn new(field: &str, other: &str, toggle: &str) -> Self {
        Self {
            field: field.to_string(),
            other: other.to_string(),
            toggle: toggle.to_string(),
        }
    }
}

impl ValidationRule for DistinctWhen {
    fn field(&self) -> &str {
        &self.field
    }

    fn check(&self, view: &EffectiveView<'_>) -> Result<Option<String>, RuleFault> {
        if !toggle_enabled(view, &self.toggle)? {
            return Ok(None);
        }
        match (view.get(&self.field), view.get(&self.other)) {
            (Some(a), Some(b)) if a == b => Ok(Some(format!("must differ from {}", self.other))),
            _ => Ok(None),
        }
    }
}

/// Rule backed by a closure, for checks the built-in kinds do not cover.
pub struct FnRule<F> {
    field: String,
    check: F,
}

impl<F> FnRule<F>
where
    F: Fn(&EffectiveView<'_>) -> Result<Option<String>, RuleFault>,
{
    pub fn new(field: &str, check: F) -> Self {
        Self { field: field.to_string(), check }
    }
}

impl<F> ValidationRule for FnRule<F>
where
    F: Fn(&EffectiveView<'_>) -> Result<Option<String>, RuleFault>,
{
    fn field(&self) -> &str {
        &self.field
    }

    fn check(&self, view: &EffectiveView<'_>) -> Result<Option<String>, RuleFault> {
        (self.check)(view)
    }
}

/// Ordered rule list evaluated against the full effective state.
pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::standard()
    }
}

impl Validator {
    /// No rules; everything passes.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Built-in rules for the daemon's preference keys.
    pub fn standard() -> Self {
        let mut v = Self::empty();

        v.push(IntRange::new("web_ui_port", 1, 65535));
        v.push(IntRange::new("listen_port", 0, 65535));
        v.push(IntRange::new("proxy_port", 1, 65535));
        v.push(MinLength::new("web_ui_username", 3));
        v.push(MinLength::new("web_ui_password", 6).allow_empty());
        v.push(RequiredWhen::new("web_ui_https_cert_path", "use_https"));
        v.push(RequiredWhen::new("web_ui_https_key_path", "use_https"));

        v.push(IntRange::new("schedule_from_hour", 0, 23));
        v.push(IntRange::new("schedule_from_min", 0, 59));
        v.push(IntRange::new("schedule_to_hour", 0, 23));
        v.push(IntRange::new("schedule_to_min", 0, 59));
        v.push(DistinctWhen::new("schedule_to_hour", "schedule_from_hour", "scheduler_enabled"));

        for key in ["dl_limit", "up_limit", "alt_dl_limit", "alt_up_limit"] {
            v.push(AtLeast::new(key, 0.0));
        }
        for key in ["max_connec", "max_connec_per_torrent", "max_uploads", "max_uploads_per_torrent"] {
            v.push(AtLeast::new(key, -1.0));
        }
        for key in ["max_active_downloads", "max_active_uploads", "max_active_torrents"] {
            v.push(AtLeast::new(key, -1.0).when("queueing_enabled"));
        }
        v.push(AtLeast::new("max_ratio", 0.0).when("max_ratio_enabled"));
        v.push(AtLeast::new("max_seeding_time", 0.0).when("max_seeding_time_enabled"));

        v.push(RequiredWhen::new("mail_notification_email", "mail_notification_enabled"));
        v.push(RequiredWhen::new("mail_notification_smtp", "mail_notification_enabled"));
        v.push(RequiredWhen::new("dyndns_domain", "dyndns_enabled"));
        v.push(RequiredWhen::new("autorun_program", "autorun_enabled"));

        v
    }

    pub fn with_rule(mut self, rule: impl ValidationRule + 'static) -> Self {
        self.push(rule);
        self
    }

    fn push(&mut self, rule: impl ValidationRule + 'static) {
        self.rules.push(Box::new(rule));
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn validate(&self, view: &EffectiveView<'_>) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for rule in &self.rules {
            match rule.check(view) {
                Ok(Some(message)) => errors.push(ValidationError {
                    field: rule.field().to_string(),
                    message,
                }),
                Ok(None) => {}
                Err(fault) => {
                    debug!(field = rule.field(), fault = %fault, "rule could not evaluate, no error reported");
                }
            }
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prefsync_core::PrefMap;

    fn map(entries: &[(&str, PrefValue)]) -> PrefMap {
        entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn run(validator: &Validator, state: &PrefMap) -> Vec<ValidationError> {
        let empty = PrefMap::new();
        validator.validate(&EffectiveView::new(state, &empty))
    }

    fn fields(errors: &[ValidationError]) -> Vec<&str> {
        errors.iter().map(|e| e.field.as_str()).collect()
    }

    #[test]
    fn port_out_of_range() {
        let errors = run(&Validator::standard(), &map(&[("web_ui_port", PrefValue::Int(100000))]));
        assert_eq!(fields(&errors), vec!["web_ui_port"]);
        assert_eq!(errors[0].message, "must be between 1 and 65535");

        assert!(run(&Validator::standard(), &map(&[("web_ui_port", PrefValue::Int(65535))])).is_empty());
        assert_eq!(run(&Validator::standard(), &map(&[("web_ui_port", PrefValue::Int(0))])).len(), 1);
    }

    #[test]
    fn wrong_type_reports_nothing() {
        let errors = run(&Validator::standard(), &map(&[("web_ui_port", PrefValue::from("abc"))]));
        assert!(errors.is_empty());
    }

    #[test]
    fn required_only_while_toggle_on() {
        let off = map(&[("use_https", PrefValue::Bool(false))]);
        assert!(run(&Validator::standard(), &off).is_empty());

        let on = map(&[
            ("use_https", PrefValue::Bool(true)),
            ("web_ui_https_cert_path", PrefValue::from("  ")),
            ("web_ui_https_key_path", PrefValue::from("/etc/key.pem")),
        ]);
        assert_eq!(fields(&run(&Validator::standard(), &on)), vec!["web_ui_https_cert_path"]);
    }

    #[test]
    fn scheduler_hours_must_differ_when_enabled() {
        let mut state = map(&[
            ("scheduler_enabled", PrefValue::Bool(false)),
            ("schedule_from_hour", PrefValue::Int(8)),
            ("schedule_to_hour", PrefValue::Int(8)),
        ]);
        assert!(run(&Validator::standard(), &state).is_empty());

        state.insert("scheduler_enabled".into(), PrefValue::Bool(true));
        let errors = run(&Validator::standard(), &state);
        assert_eq!(fields(&errors), vec!["schedule_to_hour"]);
        assert_eq!(errors[0].message, "must differ from schedule_from_hour");
    }

    #[test]
    fn optional_password_may_be_empty() {
        let v = Validator::standard();
        assert!(run(&v, &map(&[("web_ui_password", PrefValue::from(""))])).is_empty());
        assert_eq!(run(&v, &map(&[("web_ui_password", PrefValue::from("abc"))])).len(), 1);
        assert_eq!(run(&v, &map(&[("web_ui_username", PrefValue::from("ab"))])).len(), 1);
    }

    #[test]
    fn ratio_limit_gated_by_toggle() {
        let v = Validator::standard();
        let state = map(&[("max_ratio", PrefValue::Float(-1.0)), ("max_ratio_enabled", PrefValue::Bool(false))]);
        assert!(run(&v, &state).is_empty());

        let state = map(&[("max_ratio", PrefValue::Float(-1.0)), ("max_ratio_enabled", PrefValue::Bool(true))]);
        assert_eq!(fields(&run(&v, &state)), vec!["max_ratio"]);
    }

    #[test]
    fn faulting_rule_does_not_stop_later_rules() {
        let v = Validator::empty()
            .with_rule(FnRule::new("broken", |_| Err(RuleFault::Internal("boom".into()))))
            .with_rule(IntRange::new("web_ui_port", 1, 65535));
        assert_eq!(v.rule_count(), 2);
        let errors = run(&v, &map(&[("web_ui_port", PrefValue::Int(-5))]));
        assert_eq!(fields(&errors), vec!["web_ui_port"]);
    }

    #[test]
    fn errors_follow_rule_order() {
        let state = map(&[
            ("web_ui_port", PrefValue::Int(0)),
            ("dl_limit", PrefValue::Int(-3)),
            ("listen_port", PrefValue::Int(70000)),
        ]);
        assert_eq!(
            fields(&run(&Validator::standard(), &state)),
            vec!["web_ui_port", "listen_port", "dl_limit"]
        );
    }
}
