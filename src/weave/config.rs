//! Configuration for a weave session.

use std::{path::PathBuf, time::Duration};

/// Controls how a [`crate::weave::Weaver`] session behaves.
///
/// Plain data with public fields; construct with struct update syntax over
/// [`WeaveConfig::default`].
#[derive(Debug, Clone)]
pub struct WeaveConfig {
    /// Treat a failing addin visit as fatal for the whole session instead of
    /// isolating it to a logged per-addin error (default: `false`).
    pub fatal_addin_errors: bool,

    /// Cooperative session deadline, checked only between module iterations.
    /// Modules woven before the deadline stay woven; a retry is safe because
    /// weaving is idempotent (default: none).
    pub module_deadline: Option<Duration>,

    /// Well-known directories the resolver searches for referenced
    /// assemblies, in addition to the directories of assemblies the session
    /// has already loaded (default: empty).
    pub search_paths: Vec<PathBuf>,
}

impl Default for WeaveConfig {
    fn default() -> Self {
        WeaveConfig {
            fatal_addin_errors: false,
            module_deadline: None,
            search_paths: Vec::new(),
        }
    }
}
