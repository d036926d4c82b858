//! ---
//! hsim_section: "01-core-functionality"
//! hsim_subsection: "module"
//! hsim_type: "source"
//! hsim_scope: "code"
//! hsim_description: "Identifier sanitization for simulation ids and build keys."
//! hsim_version: "v0.1.0"
//! hsim_owner: "tbd"
//! ---
use std::fmt;

use serde::{Deserialize, Serialize};

/// Replace characters that are unsafe in file names or positional process
/// arguments. Test names routinely contain parametrization markers such as
/// `test_scan[nrf52-1]`; simulator executables reject `[`, `]`, `.`, `:` and
/// `-` inside the `-s=` token, so each is rewritten to an underscore and the
/// closing bracket is dropped entirely.
pub fn sanitize_token(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            ']' => {}
            '[' | '.' | ':' | '-' => out.push('_'),
            other => out.push(other),
        }
    }
    out
}

/// Token identifying one simulation run, shared by every participant's
/// command line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimulationId(String);

impl SimulationId {
    /// Build a simulation id from a test or scenario name, sanitizing it into
    /// an argument-safe token.
    pub fn from_test_name(name: &str) -> Self {
        Self(sanitize_token(name))
    }

    /// Borrow the sanitized token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SimulationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizer_rewrites_unsafe_characters() {
        assert_eq!(
            sanitize_token("test_scan[nrf52-1]"),
            "test_scan_nrf52_1".to_owned()
        );
        assert_eq!(sanitize_token("a.b:c-d"), "a_b_c_d".to_owned());
    }

    #[test]
    fn sanitizer_keeps_safe_names_untouched() {
        assert_eq!(sanitize_token("plain_name_42"), "plain_name_42".to_owned());
    }

    #[test]
    fn simulation_id_displays_sanitized_token() {
        let id = SimulationId::from_test_name("suite.case[variant]");
        assert_eq!(id.to_string(), "suite_case_variant");
    }
}
