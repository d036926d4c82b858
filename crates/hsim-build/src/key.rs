//! ---
//! hsim_section: "04-build-coordination"
//! hsim_subsection: "module"
//! hsim_type: "source"
//! hsim_scope: "code"
//! hsim_description: "Identity of a buildable simulator artifact."
//! hsim_version: "v0.1.0"
//! hsim_owner: "tbd"
//! ---
use std::fmt;

use hsim_common::ident::sanitize_token;
use serde::{Deserialize, Serialize};

/// Identity of a requested build artifact, used to deduplicate concurrent
/// build requests across workers sharing one record store. The key doubles as
/// the artifact's file name, so it is sanitized into a filesystem-safe token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildKey(String);

impl BuildKey {
    /// Derive a key from board identity, configuration file name and scenario
    /// name.
    pub fn derive(board: &str, conf_file: &str, scenario: &str) -> Self {
        Self(sanitize_token(&format!(
            "{}_{}_{}",
            board, conf_file, scenario
        )))
    }

    /// Borrow the key token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BuildKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
