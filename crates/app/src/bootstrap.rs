use std::{net::SocketAddr, path::PathBuf, time::Duration};

use bootgate_core::{
    classify, inspect, poll_until_ready, summarize, BootPlan, BootStep, CancelSignal, PollError,
    PollEvent, PollPolicy, SnapshotError,
};
use bootgate_storage::StorageError;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::framework::{CommandError, Framework};
use crate::ledger::MigrationLedger;
use crate::probe::ReadinessCheck;

/// Startup sequence: wait for the database, bring its schema up to date,
/// seed it on first boot, then hand the process over to the server.
pub struct Bootstrapper<P, L, F> {
    probe: P,
    ledger: L,
    framework: F,
    policy: PollPolicy,
    fixture: Option<PathBuf>,
    bind_addr: SocketAddr,
}

impl<P, L, F> Bootstrapper<P, L, F>
where
    P: ReadinessCheck,
    L: MigrationLedger,
    F: Framework,
{
    pub fn new(probe: P, ledger: L, framework: F, policy: PollPolicy, bind_addr: SocketAddr) -> Self {
        Self {
            probe,
            ledger,
            framework,
            policy,
            fixture: None,
            bind_addr,
        }
    }

    /// Sets the snapshot loaded on an uninitialized database.
    pub fn with_fixture(mut self, fixture: Option<PathBuf>) -> Self {
        self.fixture = fixture;
        self
    }

    /// Runs every stage. Returns the server's exit code when the server ran
    /// as a child instead of replacing this process.
    pub async fn run(&self, cancel: &mut CancelSignal) -> Result<i32, BootError> {
        self.wait_for_database(cancel).await?;

        let entries = self.ledger.entries().await?;
        let state = classify(&entries);
        let summary = summarize(&entries);
        info!(
            stage = "ledger",
            state = state.as_str(),
            applied = summary.applied,
            apps = summary.apps,
            latest = summary.latest.as_ref().map(|entry| format!("{}.{}", entry.app, entry.name)).as_deref().unwrap_or("-"),
            "migration ledger inspected"
        );

        let plan = BootPlan::for_state(state, self.fixture.as_ref(), self.bind_addr);
        if !state.is_initialized() && self.fixture.is_none() {
            info!(stage = "snapshot", "no initial snapshot configured, skipping data load");
        }

        // Migrating marks the database initialized, so a fixture rejected
        // after that point would never be loaded on a later boot.
        if let Some(path) = plan.snapshot() {
            let snapshot = inspect(path)?;
            info!(
                stage = "snapshot",
                path = %path.display(),
                records = snapshot.records,
                models = snapshot.models.len(),
                "initial snapshot validated"
            );
        }

        let mut exit_code = 0;
        for step in plan {
            info!(stage = "boot", step = step.as_str(), "{step}");
            match step {
                BootStep::ApplyMigrations => self
                    .framework
                    .apply_migrations()
                    .await
                    .map_err(BootError::MigrationFailure)?,
                BootStep::LoadSnapshot(path) => {
                    self.framework
                        .load_snapshot(&path)
                        .await
                        .map_err(BootError::DataLoadFailure)?;
                }
                BootStep::LaunchServer(addr) => {
                    exit_code = self
                        .framework
                        .launch_server(addr)
                        .await
                        .map_err(BootError::Handoff)?;
                }
            }
        }

        Ok(exit_code)
    }

    /// Blocks until the probe succeeds. Returns the successful attempt number.
    pub async fn wait_for_database(&self, cancel: &mut CancelSignal) -> Result<u32, BootError> {
        let endpoint = self.probe.target();
        let interval = self.policy.interval;
        info!(
            stage = "probe",
            %endpoint,
            max_attempts = self.policy.max_attempts.get(),
            interval_secs = interval.as_secs_f64(),
            "waiting for database"
        );

        let result = poll_until_ready(
            self.policy,
            cancel,
            |_| self.probe.check(),
            |event| log_poll_event(&endpoint, interval, event),
        )
        .await;

        result.map_err(|err| match err {
            PollError::Exhausted { attempts } => {
                error!(
                    stage = "probe",
                    %endpoint,
                    attempts,
                    "giving up on database after {attempts} attempts"
                );
                BootError::ConnectivityTimeout {
                    endpoint: endpoint.clone(),
                    attempts,
                }
            }
            PollError::DeadlineElapsed { attempts, deadline } => BootError::DeadlineElapsed {
                endpoint: endpoint.clone(),
                attempts,
                deadline,
            },
            PollError::Cancelled { attempts } => BootError::Cancelled { attempts },
        })
    }
}

fn log_poll_event(endpoint: &str, interval: Duration, event: PollEvent) {
    match event {
        PollEvent::NotReady {
            attempt,
            max_attempts,
            retrying: true,
        } => info!(
            stage = "probe",
            %endpoint,
            attempt,
            max_attempts,
            "database not ready ({attempt}/{max_attempts}), retrying in {interval:?}"
        ),
        PollEvent::NotReady {
            attempt,
            max_attempts,
            retrying: false,
        } => warn!(
            stage = "probe",
            %endpoint,
            attempt,
            max_attempts,
            "database not ready ({attempt}/{max_attempts})"
        ),
        PollEvent::Ready { attempt } => {
            info!(stage = "probe", %endpoint, attempt, "database is reachable")
        }
    }
}

/// Fatal startup failures.
#[derive(Debug, Error)]
pub enum BootError {
    #[error("database at {endpoint} still unreachable after {attempts} attempts")]
    ConnectivityTimeout { endpoint: String, attempts: u32 },
    #[error("database at {endpoint} still unreachable after {deadline:?} ({attempts} attempts)")]
    DeadlineElapsed {
        endpoint: String,
        attempts: u32,
        deadline: Duration,
    },
    #[error("startup cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
    #[error(transparent)]
    Ledger(#[from] StorageError),
    #[error("migration failed: {0}")]
    MigrationFailure(CommandError),
    #[error("initial data load failed: {0}")]
    DataLoadFailure(CommandError),
    #[error("initial data load failed: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("server handoff failed: {0}")]
    Handoff(CommandError),
}

impl BootError {
    /// Process exit code for this failure. Framework command failures keep
    /// the child's own code.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Cancelled { .. } => 130,
            Self::MigrationFailure(err) | Self::DataLoadFailure(err) | Self::Handoff(err) => err
                .exit_code()
                .and_then(|code| u8::try_from(code).ok())
                .filter(|code| *code != 0)
                .unwrap_or(1),
            _ => 1,
        }
    }
}
