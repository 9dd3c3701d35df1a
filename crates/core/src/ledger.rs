use chrono::{DateTime, Utc};

/// One row of the framework's migration-tracking table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub app: String,
    pub name: String,
    pub applied: Option<DateTime<Utc>>,
}

impl LedgerEntry {
    pub fn new(app: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            name: name.into(),
            applied: None,
        }
    }

    pub fn applied_at(mut self, at: DateTime<Utc>) -> Self {
        self.applied = Some(at);
        self
    }
}

/// Whether the target database has been initialized by a previous boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    Uninitialized,
    Initialized { applied: usize },
}

impl InitState {
    pub fn is_initialized(self) -> bool {
        matches!(self, Self::Initialized { .. })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Initialized { .. } => "initialized",
        }
    }
}

/// Classifies the ledger contents.
///
/// Any recorded migration counts as initialized, including partially applied
/// sets; the migrate step that follows picks up whatever is still pending.
pub fn classify(entries: &[LedgerEntry]) -> InitState {
    if entries.is_empty() {
        InitState::Uninitialized
    } else {
        InitState::Initialized {
            applied: entries.len(),
        }
    }
}

/// Aggregate view of the ledger used for boot logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerSummary {
    pub applied: usize,
    pub apps: usize,
    pub latest: Option<LedgerEntry>,
}

pub fn summarize(entries: &[LedgerEntry]) -> LedgerSummary {
    let mut apps: Vec<&str> = entries.iter().map(|entry| entry.app.as_str()).collect();
    apps.sort_unstable();
    apps.dedup();

    let latest = entries
        .iter()
        .filter(|entry| entry.applied.is_some())
        .max_by_key(|entry| entry.applied)
        .or_else(|| entries.last())
        .cloned();

    LedgerSummary {
        applied: entries.len(),
        apps: apps.len(),
        latest,
    }
}
