//! Heuristic classification of backend output into allowed/blocked.
//!
//! The backend reports policy denials as free text, not as a structured
//! protocol, so this is substring matching over whatever the enforcement
//! layer happens to print today. False positives are possible when legitimate
//! output contains a marker; false negatives when the backend rephrases.
//!
//! Rules are evaluated in a fixed priority order and the first match wins.
//! Consumers rely on the specific policy-rule message taking precedence over
//! the generic denial message, so the order is part of the contract.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// What the classifier decided about one combined output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub blocked: bool,
    pub message: Option<String>,
}

impl Classification {
    fn clean() -> Self {
        Self {
            blocked: false,
            message: None,
        }
    }
}

struct MarkerRule {
    pattern: Regex,
    extract: fn(&Captures) -> Option<String>,
}

/// Policy markers, most specific first.
static POLICY_MARKERS: LazyLock<Vec<MarkerRule>> = LazyLock::new(|| {
    vec![
        MarkerRule {
            pattern: Regex::new(
                r"denied by policy\s*(?:\(rule=(?P<rule>[A-Za-z0-9_.-]+)\))?(?P<rest>[^\n]*)",
            )
            .unwrap(),
            extract: extract_policy_message,
        },
        MarkerRule {
            pattern: Regex::new(
                r"blocked by policy\s*(?:\(rule=(?P<rule>[A-Za-z0-9_.-]+)\))?(?P<rest>[^\n]*)",
            )
            .unwrap(),
            extract: extract_policy_message,
        },
        MarkerRule {
            pattern: Regex::new(r"BLOCKED:\s*(?P<rest>[^\n]+)").unwrap(),
            extract: extract_remainder,
        },
    ]
});

/// OS-level denial strings. These can come from non-policy causes (a plain
/// unreadable file, for instance), so matching them is opt-in.
const OS_DENIAL_MARKERS: &[&str] = &["Permission denied", "Operation not permitted"];

const FALLBACK_MESSAGE: &str = "Command blocked by policy";
const KERNEL_MESSAGE: &str = "Blocked by kernel-level enforcement";

fn extract_policy_message(caps: &Captures) -> Option<String> {
    if let Some(rule) = caps.name("rule") {
        return Some(format!("Blocked by policy rule '{}'", rule.as_str()));
    }
    extract_remainder(caps)
}

fn extract_remainder(caps: &Captures) -> Option<String> {
    let rest = caps
        .name("rest")?
        .as_str()
        .trim()
        .trim_start_matches(':')
        .trim();
    (!rest.is_empty()).then(|| rest.to_string())
}

pub struct Classifier {
    /// Also treat raw OS denial strings as blocks (the most permissive mode).
    os_denials: bool,
}

impl Classifier {
    pub fn new(os_denials: bool) -> Self {
        Self { os_denials }
    }

    /// Classify the combined, pre-cleanup stdout+stderr of one execution.
    pub fn classify(&self, combined: &str) -> Classification {
        for rule in POLICY_MARKERS.iter() {
            if let Some(caps) = rule.pattern.captures(combined) {
                let message = (rule.extract)(&caps)
                    .unwrap_or_else(|| FALLBACK_MESSAGE.to_string());
                return Classification {
                    blocked: true,
                    message: Some(message),
                };
            }
        }

        if self.os_denials
            && OS_DENIAL_MARKERS.iter().any(|m| combined.contains(m))
        {
            return Classification {
                blocked: true,
                message: Some(KERNEL_MESSAGE.to_string()),
            };
        }

        Classification::clean()
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_output_is_not_blocked() {
        let c = Classifier::default().classify("hello\n");
        assert!(!c.blocked);
        assert_eq!(c.message, None);
    }

    #[test]
    fn named_rule_is_extracted() {
        let c = Classifier::default().classify("command denied by policy (rule=no-sudo)\n");
        assert!(c.blocked);
        assert!(c.message.unwrap().contains("no-sudo"));
    }

    #[test]
    fn blocked_prefix_keeps_the_remainder() {
        let c = Classifier::default().classify("BLOCKED: outbound connections are disabled\n");
        assert!(c.blocked);
        assert_eq!(
            c.message.as_deref(),
            Some("outbound connections are disabled")
        );
    }

    #[test]
    fn denied_marker_outranks_blocked_prefix() {
        let out = "BLOCKED: something\ncommand denied by policy (rule=no-ssh)\n";
        let c = Classifier::default().classify(out);
        assert!(c.message.unwrap().contains("no-ssh"));
    }

    #[test]
    fn bare_marker_falls_back_to_generic_message() {
        let c = Classifier::default().classify("blocked by policy\n");
        assert!(c.blocked);
        assert_eq!(c.message.as_deref(), Some(FALLBACK_MESSAGE));
    }

    #[test]
    fn free_text_after_marker_is_used() {
        let c = Classifier::default().classify("denied by policy: raw sockets are off limits\n");
        assert_eq!(c.message.as_deref(), Some("raw sockets are off limits"));
    }

    #[test]
    fn os_denial_synthesizes_kernel_message() {
        let c = Classifier::default().classify("cat: /etc/shadow: Permission denied\n");
        assert!(c.blocked);
        assert_eq!(c.message.as_deref(), Some(KERNEL_MESSAGE));
    }

    #[test]
    fn os_denials_can_be_disabled() {
        let c = Classifier::new(false).classify("cat: /etc/shadow: Permission denied\n");
        assert!(!c.blocked);
    }
}
