//! Escalation for system package manager commands.
//!
//! `apt-get` and `dnf` need root. The manifest names the wrapper once;
//! nothing is wrapped when envstrap already runs as root.

use serde::Deserialize;
use strum::{AsRefStr, Display};

/// A wrapper program placed in front of a privileged command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum PrivilegeMethod {
    Sudo,
    Doas,
}

impl PrivilegeMethod {
    /// Program name looked up on the search path.
    pub fn program(&self) -> &str {
        self.as_ref()
    }
}

/// The `privilege:` manifest value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Privilege {
    #[default]
    Sudo,
    Doas,
    /// Never wrap; commands fail unless the user can run them directly.
    None,
}

impl Privilege {
    /// Picks the wrapper for a user, or `None` when no wrapping applies.
    pub fn resolve(&self, is_root: bool) -> Option<PrivilegeMethod> {
        match (is_root, self) {
            (true, _) | (false, Self::None) => None,
            (false, Self::Sudo) => Some(PrivilegeMethod::Sudo),
            (false, Self::Doas) => Some(PrivilegeMethod::Doas),
        }
    }
}

/// True when the effective uid is 0.
pub fn running_as_root() -> bool {
    rustix::process::geteuid().is_root()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapper_program_names() {
        assert_eq!(PrivilegeMethod::Sudo.program(), "sudo");
        assert_eq!(PrivilegeMethod::Doas.to_string(), "doas");
    }

    #[test]
    fn manifest_values() {
        for (yaml, expected) in [
            ("sudo", Privilege::Sudo),
            ("doas", Privilege::Doas),
            ("none", Privilege::None),
        ] {
            let parsed: Privilege = serde_yaml::from_str(yaml).unwrap();
            assert_eq!(parsed, expected);
            assert_eq!(parsed.to_string(), yaml);
        }
        assert!(serde_yaml::from_str::<Privilege>("su").is_err());
    }

    #[test]
    fn regular_user_gets_configured_wrapper() {
        assert_eq!(Privilege::Sudo.resolve(false), Some(PrivilegeMethod::Sudo));
        assert_eq!(Privilege::Doas.resolve(false), Some(PrivilegeMethod::Doas));
        assert_eq!(Privilege::None.resolve(false), None);
    }

    #[test]
    fn root_is_never_wrapped() {
        assert_eq!(Privilege::Sudo.resolve(true), None);
        assert_eq!(Privilege::Doas.resolve(true), None);
    }
}
