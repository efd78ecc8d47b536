//! Authentication descriptor types
//!
//! The immutable `(method, identity, password)` triple that both session
//! paths consume, plus the `~` path expansion they share.

use std::fmt;
use std::path::PathBuf;

/// How a login should authenticate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Identity file (or agent) only; a configured password is never auto-sent
    KeyOnly,
    /// Key first, password as fallback
    AutoFallback,
    /// Password only; the identity path is never consulted
    PasswordOnly,
}

impl AuthMode {
    /// Parse the stored method name.
    ///
    /// Unknown values fall back to `auto` when an identity path is present,
    /// otherwise to `password`.
    pub fn parse(method: &str, has_identity: bool) -> Self {
        match method.trim().to_ascii_lowercase().as_str() {
            "key" => AuthMode::KeyOnly,
            "auto" => AuthMode::AutoFallback,
            "password" => AuthMode::PasswordOnly,
            _ if has_identity => AuthMode::AutoFallback,
            _ => AuthMode::PasswordOnly,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMode::KeyOnly => "key",
            AuthMode::AutoFallback => "auto",
            AuthMode::PasswordOnly => "password",
        }
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authentication descriptor for one invocation
#[derive(Clone, PartialEq, Eq)]
pub struct AuthDescriptor {
    /// Selected method
    pub mode: AuthMode,

    /// Identity file path as configured (may start with `~`)
    pub identity_path: Option<String>,

    /// Account password
    pub password: Option<String>,
}

impl AuthDescriptor {
    /// Build a descriptor from the raw stored fields.
    ///
    /// Empty strings are treated as absent.
    pub fn from_parts(method: &str, identity_path: Option<&str>, password: Option<&str>) -> Self {
        let identity_path = identity_path
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        // passwords are used verbatim, surrounding whitespace included
        let password = password.filter(|v| !v.is_empty()).map(str::to_string);
        Self {
            mode: AuthMode::parse(method, identity_path.is_some()),
            identity_path,
            password,
        }
    }

    /// Identity path this mode is allowed to use
    pub fn identity(&self) -> Option<&str> {
        match self.mode {
            AuthMode::PasswordOnly => None,
            AuthMode::KeyOnly | AuthMode::AutoFallback => self.identity_path.as_deref(),
        }
    }

    /// Password this mode is allowed to send automatically
    pub fn auto_password(&self) -> Option<&str> {
        match self.mode {
            AuthMode::KeyOnly => None,
            AuthMode::AutoFallback | AuthMode::PasswordOnly => self.password.as_deref(),
        }
    }
}

impl fmt::Debug for AuthDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthDescriptor")
            .field("mode", &self.mode)
            .field("identity_path", &self.identity_path)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Expand a leading `~` to the user's home directory
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_methods() {
        assert_eq!(AuthMode::parse("key", false), AuthMode::KeyOnly);
        assert_eq!(AuthMode::parse("AUTO", false), AuthMode::AutoFallback);
        assert_eq!(AuthMode::parse("password", true), AuthMode::PasswordOnly);
    }

    #[test]
    fn test_unknown_method_falls_back_on_identity() {
        assert_eq!(AuthMode::parse("kerberos", true), AuthMode::AutoFallback);
        assert_eq!(AuthMode::parse("", false), AuthMode::PasswordOnly);
    }

    #[test]
    fn test_password_only_never_exposes_identity() {
        let d = AuthDescriptor::from_parts("password", Some("~/.ssh/id_rsa"), Some("pw"));
        assert_eq!(d.identity(), None);
        assert_eq!(d.auto_password(), Some("pw"));
    }

    #[test]
    fn test_key_only_never_exposes_password() {
        let d = AuthDescriptor::from_parts("key", Some("~/.ssh/id_rsa"), Some("pw"));
        assert_eq!(d.identity(), Some("~/.ssh/id_rsa"));
        assert_eq!(d.auto_password(), None);
    }

    #[test]
    fn test_empty_fields_are_absent() {
        let d = AuthDescriptor::from_parts("mystery", Some("  "), Some(""));
        assert_eq!(d.mode, AuthMode::PasswordOnly);
        assert!(d.identity_path.is_none());
        assert!(d.password.is_none());
    }

    #[test]
    fn test_password_whitespace_is_kept() {
        let d = AuthDescriptor::from_parts("password", None, Some(" pw "));
        assert_eq!(d.auto_password(), Some(" pw "));
    }

    #[test]
    fn test_debug_redacts_password() {
        let d = AuthDescriptor::from_parts("auto", None, Some("s3cret"));
        let shown = format!("{:?}", d);
        assert!(!shown.contains("s3cret"));
        assert!(shown.contains("<redacted>"));
    }

    #[test]
    fn test_expand_home() {
        let expanded = expand_home("~/.ssh/id_rsa");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expanded, home.join(".ssh/id_rsa"));
        }
        assert_eq!(expand_home("/etc/key"), PathBuf::from("/etc/key"));
        assert_eq!(expand_home("~other/key"), PathBuf::from("~other/key"));
    }
}
