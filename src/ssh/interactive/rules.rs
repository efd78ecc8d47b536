//! Prompt patterns matched against the terminal client's output
//!
//! The rule table is data shared by both backends: the native driver compiles
//! it to `regex`, the expect backend renders it into `-re` clauses. Patterns
//! are therefore restricted to syntax both engines read the same way.

use std::ops::Range;
use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

/// Event produced by matching the client's output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptEvent {
    /// "yes/no" host fingerprint confirmation
    HostKeyConfirmation,
    /// Explicit rejection of the credentials
    AuthFailureSignal,
    /// Identity file passphrase prompt from the client itself
    PassphrasePrompt,
    /// Account password prompt
    PasswordPrompt,
    /// Trailing `$` or `#` on an unterminated line: a remote shell accepted input
    ShellPromptDetected,
    /// The client's output stream ended
    StreamEnd,
}

/// One output pattern, in priority order
#[derive(Debug, Clone, Copy)]
pub struct PromptRule {
    pub event: PromptEvent,
    pub pattern: &'static str,
    pub case_insensitive: bool,
}

/// Output patterns in priority order; the first matching rule wins.
/// `StreamEnd` has no pattern and is raised by the transport.
pub const PROMPT_RULES: [PromptRule; 5] = [
    PromptRule {
        event: PromptEvent::HostKeyConfirmation,
        pattern: r"yes/no",
        case_insensitive: true,
    },
    PromptRule {
        event: PromptEvent::AuthFailureSignal,
        pattern: r"permission denied|failed password",
        case_insensitive: true,
    },
    PromptRule {
        event: PromptEvent::PassphrasePrompt,
        pattern: r"enter passphrase for",
        case_insensitive: true,
    },
    PromptRule {
        event: PromptEvent::PasswordPrompt,
        pattern: r"password:",
        case_insensitive: true,
    },
    PromptRule {
        event: PromptEvent::ShellPromptDetected,
        // only blanks may follow the sigil; a finished banner line is not a prompt
        pattern: r"[$#][ \t]*$",
        case_insensitive: false,
    },
];

static COMPILED: LazyLock<Vec<(PromptEvent, Regex)>> = LazyLock::new(|| {
    PROMPT_RULES
        .iter()
        .filter_map(|rule| {
            RegexBuilder::new(rule.pattern)
                .case_insensitive(rule.case_insensitive)
                .build()
                .ok()
                .map(|re| (rule.event, re))
        })
        .collect()
});

/// Find the highest-priority event in `text`, with the byte range it matched
pub fn classify(text: &str) -> Option<(PromptEvent, Range<usize>)> {
    COMPILED
        .iter()
        .find_map(|(event, re)| re.find(text).map(|m| (*event, m.range())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_of(text: &str) -> Option<PromptEvent> {
        classify(text).map(|(event, _)| event)
    }

    #[test]
    fn test_every_rule_compiles() {
        assert_eq!(COMPILED.len(), PROMPT_RULES.len());
    }

    #[test]
    fn test_host_key_prompt() {
        let text = "ECDSA key fingerprint is SHA256:abc.\r\nAre you sure you want to continue connecting (yes/no/[fingerprint])? ";
        assert_eq!(event_of(text), Some(PromptEvent::HostKeyConfirmation));
    }

    #[test]
    fn test_password_prompt_case_insensitive() {
        assert_eq!(event_of("ops@db-01's password: "), Some(PromptEvent::PasswordPrompt));
        assert_eq!(event_of("Password:"), Some(PromptEvent::PasswordPrompt));
        assert_eq!(event_of("PASSWORD:"), Some(PromptEvent::PasswordPrompt));
    }

    #[test]
    fn test_passphrase_prompt_is_not_a_password_prompt() {
        assert_eq!(
            event_of("Enter passphrase for key '/home/ops/.ssh/id_ed25519': "),
            Some(PromptEvent::PassphrasePrompt)
        );
    }

    #[test]
    fn test_failure_outranks_password_prompt() {
        let text = "Permission denied, please try again.\r\nops@db-01's password: ";
        assert_eq!(event_of(text), Some(PromptEvent::AuthFailureSignal));
        assert_eq!(event_of("Failed password for ops"), Some(PromptEvent::AuthFailureSignal));
    }

    #[test]
    fn test_failure_outranks_shell_prompt() {
        let text = "ops@db-01: Permission denied (publickey).\r\nlast banner line $ ";
        assert_eq!(event_of(text), Some(PromptEvent::AuthFailureSignal));
    }

    #[test]
    fn test_shell_prompts() {
        assert_eq!(event_of("Last login: Mon\r\n[ops@db-01 ~]$ "), Some(PromptEvent::ShellPromptDetected));
        assert_eq!(event_of("root@db-01:~# "), Some(PromptEvent::ShellPromptDetected));
        assert_eq!(event_of("$ "), Some(PromptEvent::ShellPromptDetected));
    }

    #[test]
    fn test_dollar_mid_line_is_not_a_prompt() {
        assert_eq!(event_of("price: $5 today\r\n"), None);
        assert_eq!(event_of("Welcome to Ubuntu\r\n"), None);
    }

    #[test]
    fn test_hash_framed_banner_is_not_a_prompt() {
        let banner = "##########\r\n# Authorized access only #\r\n##########\r\n";
        assert_eq!(event_of(banner), None);
        assert_eq!(event_of("motd ends with $\n"), None);
        assert_eq!(
            event_of(&format!("{}ops@db-01's password: ", banner)),
            Some(PromptEvent::PasswordPrompt)
        );
        assert_eq!(event_of("[ops@db-01 ~]$\t"), Some(PromptEvent::ShellPromptDetected));
    }

    #[test]
    fn test_match_range_points_at_the_prompt() {
        let text = "banner\r\nPassword: ";
        let (_, range) = classify(text).unwrap();
        assert_eq!(&text[range], "Password:");
    }
}
