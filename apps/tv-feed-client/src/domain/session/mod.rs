//! Session Identifiers and Bindings
//!
//! Chart sessions, symbol handles, and series identifiers are all minted
//! client-side; the server only echoes them back. The generator keeps a
//! single monotonic counter so every identifier family stays unique for
//! the life of a client, and the registry remembers which symbol each
//! session is currently retrieving.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use rand::Rng;
use rand::distr::Alphanumeric;

/// Length of the random suffix in a session identifier.
const SESSION_SUFFIX_LEN: usize = 12;

/// The session families the protocol distinguishes by prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// Chart data session (`cs_`), the only kind retrieval uses.
    Chart,
    /// Quote session (`qs_`).
    Quote,
    /// Replay session (`rs_`).
    Replay,
    /// Study session (`st_`).
    Study,
}

impl SessionKind {
    /// Wire prefix for this session family.
    #[must_use]
    pub const fn prefix(&self) -> &'static str {
        match self {
            Self::Chart => "cs",
            Self::Quote => "qs",
            Self::Replay => "rs",
            Self::Study => "st",
        }
    }
}

/// The trio of client-minted identifiers one series needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesHandles {
    /// Symbol handle passed to `resolve_symbol` (`sds_sym_N`).
    pub symbol_handle: String,
    /// Series group passed to `create_series` (`sds_N`).
    pub series_group: String,
    /// Short series identifier (`sN`).
    pub series_id: String,
}

/// Mints unique session identifiers and series handles.
///
/// Thread-safe; shared freely behind an `Arc` by the orchestrators.
#[derive(Debug, Default)]
pub struct SessionIdGenerator {
    counter: AtomicU32,
}

impl SessionIdGenerator {
    /// Create a generator whose counters start at one.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a new session identifier: prefix, underscore, and twelve
    /// random alphanumerics.
    #[must_use]
    pub fn session(&self, kind: SessionKind) -> String {
        let suffix: String = rand::rng()
            .sample_iter(Alphanumeric)
            .take(SESSION_SUFFIX_LEN)
            .map(char::from)
            .collect();
        format!("{}_{suffix}", kind.prefix())
    }

    /// Mint the identifier trio for a new series.
    #[must_use]
    pub fn series_handles(&self) -> SeriesHandles {
        let n = self.next();
        SeriesHandles {
            symbol_handle: format!("sds_sym_{n}"),
            series_group: format!("sds_{n}"),
            series_id: format!("s{n}"),
        }
    }

    /// Mint a fresh symbol handle on its own.
    ///
    /// Used when a session switches to a new symbol: the series group and
    /// id survive, but each `resolve_symbol` needs an unused handle.
    #[must_use]
    pub fn symbol_handle(&self) -> String {
        format!("sds_sym_{}", self.next())
    }

    fn next(&self) -> u32 {
        self.counter.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// What one chart session is currently bound to.
#[derive(Debug, Clone)]
pub struct SessionBinding {
    /// Symbol being retrieved on this session.
    pub symbol: String,
    /// Position of the symbol in the caller's request.
    pub index: usize,
    /// Identifiers the session's series was created with.
    pub handles: SeriesHandles,
}

/// Session-to-symbol lookup table for in-flight retrievals.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    bindings: HashMap<String, SessionBinding>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record what `session` is retrieving. Re-binding an existing session
    /// (sequential mode moving to the next symbol) replaces the entry.
    pub fn bind(&mut self, session: &str, binding: SessionBinding) {
        self.bindings.insert(session.to_string(), binding);
    }

    /// Look up the binding for a session.
    #[must_use]
    pub fn lookup(&self, session: &str) -> Option<&SessionBinding> {
        self.bindings.get(session)
    }

    /// Drop a finished session's binding.
    pub fn unbind(&mut self, session: &str) -> Option<SessionBinding> {
        self.bindings.remove(session)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use test_case::test_case;

    use super::*;

    #[test_case(SessionKind::Chart, "cs_" ; "chart")]
    #[test_case(SessionKind::Quote, "qs_" ; "quote")]
    #[test_case(SessionKind::Replay, "rs_" ; "replay")]
    #[test_case(SessionKind::Study, "st_" ; "study")]
    fn session_ids_carry_family_prefix(kind: SessionKind, prefix: &str) {
        let generator = SessionIdGenerator::new();
        let id = generator.session(kind);
        assert!(id.starts_with(prefix));
        assert_eq!(id.len(), prefix.len() + SESSION_SUFFIX_LEN);
        assert!(id[prefix.len()..].chars().all(char::is_alphanumeric));
    }

    #[test]
    fn session_ids_are_unique() {
        let generator = SessionIdGenerator::new();
        let ids: HashSet<_> = (0..64)
            .map(|_| generator.session(SessionKind::Chart))
            .collect();
        assert_eq!(ids.len(), 64);
    }

    #[test]
    fn handle_trios_share_a_counter_value() {
        let generator = SessionIdGenerator::new();
        let first = generator.series_handles();
        assert_eq!(first.symbol_handle, "sds_sym_1");
        assert_eq!(first.series_group, "sds_1");
        assert_eq!(first.series_id, "s1");

        // A standalone symbol handle advances the same counter.
        assert_eq!(generator.symbol_handle(), "sds_sym_2");
        assert_eq!(generator.series_handles().series_group, "sds_3");
    }

    #[test]
    fn registry_rebind_replaces() {
        let mut registry = SessionRegistry::new();
        let generator = SessionIdGenerator::new();

        registry.bind(
            "cs_a",
            SessionBinding {
                symbol: "AAPL".into(),
                index: 0,
                handles: generator.series_handles(),
            },
        );
        registry.bind(
            "cs_a",
            SessionBinding {
                symbol: "MSFT".into(),
                index: 1,
                handles: generator.series_handles(),
            },
        );

        assert_eq!(registry.lookup("cs_a").map(|b| b.symbol.as_str()), Some("MSFT"));
        assert!(registry.unbind("cs_a").is_some());
        assert!(registry.lookup("cs_a").is_none());
    }
}
