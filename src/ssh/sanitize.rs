//! Escaping and validation for untrusted strings
//!
//! Hostnames, paths and passwords end up in three places: the generated
//! automation script, the argv of the spawned terminal client, and remote
//! shell commands on the programmatic path. Each has its own escaper here.

use crate::error::{GsshError, Result};

/// Characters that carry meaning inside a double-quoted Tcl word
const SCRIPT_RESERVED: [char; 8] = ['\\', '[', ']', '{', '}', '$', '"', '\''];

/// Sanitize a command before execution
///
/// This function:
/// - Validates that the command is not empty
/// - Trims whitespace
/// - Checks length against max_chars limit
///
/// # Examples
/// ```
/// use gssh::ssh::sanitize::sanitize_command;
///
/// let cmd = sanitize_command("  uptime  ", Some(1000)).unwrap();
/// assert_eq!(cmd, "uptime");
///
/// let result = sanitize_command("a".repeat(100).as_str(), Some(50));
/// assert!(result.is_err());
/// ```
pub fn sanitize_command(command: &str, max_chars: Option<usize>) -> Result<String> {
    let trimmed = command.trim();

    if trimmed.is_empty() {
        return Err(GsshError::invalid_params("Command cannot be empty"));
    }

    if let Some(max) = max_chars {
        if trimmed.len() > max {
            return Err(GsshError::invalid_params(format!(
                "Command is too long (max {} characters, got {})",
                max,
                trimmed.len()
            )));
        }
    }

    Ok(trimmed.to_string())
}

/// Escape a string for a double-quoted word in the automation script.
///
/// Every reserved character gets a backslash, so the interpreter's own
/// backslash substitution reproduces the input byte-for-byte. The output is
/// never shorter than the input.
///
/// # Example
/// ```
/// use gssh::ssh::sanitize::escape_for_script;
///
/// assert_eq!(escape_for_script("p@ss"), "p@ss");
/// assert_eq!(escape_for_script("a$b[c]"), "a\\$b\\[c\\]");
/// ```
pub fn escape_for_script(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        if SCRIPT_RESERVED.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Escapes a string for safe use in single-quoted shell contexts.
///
/// `'word'` becomes `'"'"'word'"'"'`: end quote, add a literal quote via
/// double quotes, start quote again.
///
/// # Examples
///
/// ```
/// use gssh::ssh::sanitize::escape_for_shell;
///
/// assert_eq!(escape_for_shell("hello"), "hello");
/// assert_eq!(escape_for_shell("it's"), "it'\"'\"'s");
/// ```
pub fn escape_for_shell(s: &str) -> String {
    s.replace('\'', "'\"'\"'")
}

/// Quote a single shell argument
pub fn quote_for_shell(s: &str) -> String {
    format!("'{}'", escape_for_shell(s))
}

/// Quote a remote path, keeping a leading `~` expandable.
///
/// # Example
/// ```
/// use gssh::ssh::sanitize::quote_remote_path;
///
/// assert_eq!(quote_remote_path("~/.gssh/config.yaml"), "\"$HOME\"/'.gssh/config.yaml'");
/// assert_eq!(quote_remote_path("/srv/it's.yaml"), "'/srv/it'\"'\"'s.yaml'");
/// ```
pub fn quote_remote_path(path: &str) -> String {
    if path == "~" {
        return "\"$HOME\"".to_string();
    }
    match path.strip_prefix("~/") {
        Some(rest) => format!("\"$HOME\"/{}", quote_for_shell(rest)),
        None => quote_for_shell(path),
    }
}

/// Parent directory of a remote path, if it has one
pub fn remote_parent(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    let idx = trimmed.rfind('/')?;
    let parent = &trimmed[..idx];
    (!parent.is_empty()).then_some(parent)
}

/// Validate a value that becomes its own argv element of the terminal client.
///
/// Rejects empty values, a leading `-` (option injection) and whitespace or
/// control characters.
pub fn validate_argv_token(kind: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(GsshError::invalid_params(format!("{} cannot be empty", kind)));
    }
    if value.starts_with('-') {
        return Err(GsshError::invalid_params(format!(
            "{} cannot start with '-': {}",
            kind, value
        )));
    }
    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(GsshError::invalid_params(format!(
            "{} contains whitespace or control characters",
            kind
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Backslash substitution as the automation interpreter performs it
    /// inside a double-quoted word.
    fn script_unescape(s: &str) -> String {
        let mut out = String::new();
        let mut chars = s.chars();
        while let Some(c) = chars.next() {
            if c != '\\' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        }
        out
    }

    /// True when no reserved character appears without its backslash
    fn no_bare_reserved(escaped: &str) -> bool {
        let mut chars = escaped.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                if chars.next().is_none() {
                    return false;
                }
            } else if SCRIPT_RESERVED.contains(&c) {
                return false;
            }
        }
        true
    }

    #[test]
    fn test_sanitize_command_trims_whitespace() {
        assert_eq!(sanitize_command("  ls -la  ", Some(1000)).unwrap(), "ls -la");
    }

    #[test]
    fn test_sanitize_command_empty() {
        let result = sanitize_command("   ", Some(1000));
        assert!(result.unwrap_err().to_string().contains("cannot be empty"));
    }

    #[test]
    fn test_sanitize_command_too_long() {
        let result = sanitize_command(&"a".repeat(100), Some(50));
        assert!(result.unwrap_err().to_string().contains("too long"));
        assert!(sanitize_command(&"a".repeat(50), Some(50)).is_ok());
        assert!(sanitize_command(&"a".repeat(10000), None).is_ok());
    }

    #[test]
    fn test_escape_for_script_every_reserved_char() {
        assert_eq!(
            escape_for_script(r#"\[]{}$"'"#),
            r#"\\\[\]\{\}\$\"\'"#
        );
    }

    #[test]
    fn test_escape_for_script_safe_string_unchanged() {
        for safe in ["p@ss", "db-01.example.com", "/home/ops/.ssh/id_ed25519", ""] {
            assert_eq!(escape_for_script(safe), safe);
        }
    }

    #[test]
    fn test_escape_for_script_round_trip_adversarial() {
        let inputs = [
            r#"pass"; exec rm -rf ~; ""#,
            "[exec id]",
            "$env(HOME)",
            "} interact {",
            r"trailing\",
            r"\n is not a newline",
            "mixed 'quotes' and \"quotes\"",
            "unicode ✓ $[{}]",
            "already\\$escaped",
        ];
        for input in inputs {
            let escaped = escape_for_script(input);
            assert!(no_bare_reserved(&escaped), "bare reserved char in {escaped:?}");
            assert!(escaped.len() >= input.len());
            assert_eq!(script_unescape(&escaped), input, "round trip of {input:?}");
        }
    }

    #[test]
    fn test_escape_for_script_is_not_collapsing() {
        // escaping twice keeps growing; the first pass is never merged away
        let once = escape_for_script("$x");
        let twice = escape_for_script(&once);
        assert_eq!(once, "\\$x");
        assert_eq!(twice, "\\\\\\$x");
        assert_eq!(script_unescape(&twice), once);
    }

    #[test]
    fn test_escape_for_shell_with_quotes() {
        assert_eq!(escape_for_shell("echo 'a' 'b'"), "echo '\"'\"'a'\"'\"' '\"'\"'b'\"'\"'");
        assert_eq!(escape_for_shell(""), "");
    }

    #[test]
    fn test_quote_for_shell_neutralizes_metacharacters() {
        assert_eq!(quote_for_shell("a; rm -rf /"), "'a; rm -rf /'");
        assert_eq!(quote_for_shell("$(id)`id`"), "'$(id)`id`'");
        assert_eq!(quote_for_shell("x'; id; '"), "'x'\"'\"'; id; '\"'\"''");
    }

    #[test]
    fn test_quote_remote_path() {
        assert_eq!(quote_remote_path("~"), "\"$HOME\"");
        assert_eq!(quote_remote_path("~/a b/c"), "\"$HOME\"/'a b/c'");
        assert_eq!(quote_remote_path("/etc/gssh.yaml"), "'/etc/gssh.yaml'");
        assert_eq!(quote_remote_path("~user/x"), "'~user/x'");
    }

    #[test]
    fn test_remote_parent() {
        assert_eq!(remote_parent("~/.gssh/config.yaml"), Some("~/.gssh"));
        assert_eq!(remote_parent("/srv/gssh/config.yaml"), Some("/srv/gssh"));
        assert_eq!(remote_parent("config.yaml"), None);
        assert_eq!(remote_parent("/config.yaml"), None);
    }

    #[test]
    fn test_validate_argv_token() {
        assert!(validate_argv_token("host", "db-01.example.com").is_ok());
        assert!(validate_argv_token("host", "10.0.0.1").is_ok());
        assert!(validate_argv_token("host", "-oProxyCommand=id").is_err());
        assert!(validate_argv_token("user", "root admin").is_err());
        assert!(validate_argv_token("user", "root\n").is_err());
        assert!(validate_argv_token("user", "").is_err());
    }
}
