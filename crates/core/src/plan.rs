use std::{
    fmt,
    net::SocketAddr,
    path::{Path, PathBuf},
};

use crate::ledger::InitState;

/// A single action taken once the database is reachable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootStep {
    ApplyMigrations,
    LoadSnapshot(PathBuf),
    LaunchServer(SocketAddr),
}

impl BootStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApplyMigrations => "migrate",
            Self::LoadSnapshot(_) => "load_snapshot",
            Self::LaunchServer(_) => "launch_server",
        }
    }
}

impl fmt::Display for BootStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApplyMigrations => f.write_str("apply migrations"),
            Self::LoadSnapshot(path) => write!(f, "load snapshot {}", path.display()),
            Self::LaunchServer(addr) => write!(f, "launch server on {addr}"),
        }
    }
}

/// Ordered steps for one boot. Always ends with [`BootStep::LaunchServer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootPlan {
    steps: Vec<BootStep>,
}

impl BootPlan {
    /// Builds the plan for the observed ledger state.
    ///
    /// The snapshot is only scheduled on an uninitialized database and only
    /// when one is configured.
    pub fn for_state(state: InitState, fixture: Option<&PathBuf>, bind_addr: SocketAddr) -> Self {
        let mut steps = vec![BootStep::ApplyMigrations];
        if let (InitState::Uninitialized, Some(path)) = (state, fixture) {
            steps.push(BootStep::LoadSnapshot(path.clone()));
        }
        steps.push(BootStep::LaunchServer(bind_addr));
        Self { steps }
    }

    pub fn steps(&self) -> &[BootStep] {
        &self.steps
    }

    pub fn loads_snapshot(&self) -> bool {
        self.snapshot().is_some()
    }

    /// The fixture this plan will load, if any.
    pub fn snapshot(&self) -> Option<&Path> {
        self.steps.iter().find_map(|step| match step {
            BootStep::LoadSnapshot(path) => Some(path.as_path()),
            _ => None,
        })
    }
}

impl IntoIterator for BootPlan {
    type Item = BootStep;
    type IntoIter = std::vec::IntoIter<BootStep>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.into_iter()
    }
}
