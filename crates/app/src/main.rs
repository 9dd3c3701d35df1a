mod bootstrap;
mod framework;
mod ledger;
mod probe;
mod telemetry;

use std::{path::PathBuf, process::ExitCode};

use bootgate_core::{CancelSignal, PollPolicy};
use bootgate_util::{load_env_file, BootConfig, ConfigError};
use tracing::{error, info, warn};

use crate::bootstrap::Bootstrapper;
use crate::framework::ManageCommand;
use crate::ledger::DatabaseLedger;
use crate::probe::TcpProbe;

#[tokio::main]
async fn main() -> ExitCode {
    let (env_file, config) = match load_config() {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return ExitCode::from(1);
        }
    };

    if let Err(err) = telemetry::init_tracing(&config) {
        eprintln!("{err}");
        return ExitCode::from(1);
    }

    if let Some(path) = env_file {
        info!(stage = "app", path = %path.display(), "loaded environment file");
    }

    let manage = ManageCommand::new(config.manage_program.clone(), config.manage_args.clone());

    let (canceller, mut cancel) = CancelSignal::pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!(stage = "app", "interrupt received, aborting startup");
            canceller.cancel();
        }
    });

    let probe = TcpProbe::new(
        config.database.host.clone(),
        config.database.port,
        config.probe.connect_timeout,
    );
    let ledger = DatabaseLedger::new(config.database.clone(), config.ledger_table.clone());
    let policy = PollPolicy::new(config.probe.max_attempts, config.probe.interval)
        .with_deadline(config.probe.deadline);

    info!(
        stage = "app",
        env = %config.environment.as_str(),
        bind_addr = %config.bind_addr,
        fixture = config.fixture.as_ref().map(|path| path.display().to_string()).as_deref().unwrap_or("-"),
        "starting bootstrap"
    );

    let bootstrapper = Bootstrapper::new(probe, ledger, manage, policy, config.bind_addr)
        .with_fixture(config.fixture.clone());

    match bootstrapper.run(&mut cancel).await {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(err) => {
            error!(stage = "app", error = %err, "startup aborted");
            ExitCode::from(err.exit_code())
        }
    }
}

/// Runs before logging exists, so failures are reported on stderr.
fn load_config() -> Result<(Option<PathBuf>, BootConfig), ConfigError> {
    let env_file = load_env_file()?;
    Ok((env_file, BootConfig::from_env()?))
}
