//! Static fallback data, the last tier behind cache and network.
//!
//! Entries are keyed by the logical request path (`/teams`,
//! `/mlb/teams/138/roster`, ...). The bundled catalog carries the team
//! list dashboards need to render something sensible offline.

use crate::types::Team;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;

static DEFAULT_TEAMS: Lazy<Vec<Team>> = Lazy::new(|| {
    vec![
        Team {
            id: 138,
            name: "St. Louis Cardinals".to_string(),
            code: "STL".to_string(),
        },
        Team {
            id: 112,
            name: "Chicago Cubs".to_string(),
            code: "CHC".to_string(),
        },
        Team {
            id: 147,
            name: "New York Yankees".to_string(),
            code: "NYY".to_string(),
        },
        Team {
            id: 119,
            name: "Los Angeles Dodgers".to_string(),
            code: "LAD".to_string(),
        },
        Team {
            id: 117,
            name: "Houston Astros".to_string(),
            code: "HOU".to_string(),
        },
        Team {
            id: 111,
            name: "Boston Red Sox".to_string(),
            code: "BOS".to_string(),
        },
    ]
});

/// The bundled team list as a JSON payload.
pub fn default_team_catalog() -> Value {
    serde_json::to_value(&*DEFAULT_TEAMS).expect("static team catalog serializes")
}

/// Caller-supplied static data keyed by logical request path. Used only
/// when both cache and network are unavailable.
#[derive(Debug, Clone, Default)]
pub struct FallbackTable {
    entries: HashMap<String, Value>,
}

impl FallbackTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table pre-seeded with the bundled team catalog.
    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        table.insert("/teams", default_team_catalog());
        table
    }

    pub fn insert(&mut self, path: impl Into<String>, value: Value) {
        self.entries.insert(path.into(), value);
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        self.entries.get(path)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
