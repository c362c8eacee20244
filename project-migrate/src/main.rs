use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use project_migrate::checker::AfterMigrationChecker;
use project_migrate::config::{Environment, MigrationConfig, Parameters};
use project_migrate::job_runner::{create_job_runner, Sleeper, TokioSleeper};
use project_migrate::migration::MigrationOrchestrator;
use project_migrate::primitives::http_client::{HttpClient, ReqwestHttpClient};
use project_migrate::primitives::logger::{set_logger, LogLevel, StderrLogger};
use project_migrate::secrets::EncryptionApiClient;
use project_migrate::storage::{StorageApi, StorageClient};
use project_migrate::{utils, MigrateError};

const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

// The log context is thread-local, so the whole run stays on one thread.
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    set_logger(Arc::new(StderrLogger::new(LogLevel::Info)));

    match run().await.map_err(MigrateError::classify) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_user_error() => {
            eprintln!("{e}");
            ExitCode::from(1)
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::from(2)
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let env = Environment::from_env()?;
    let parameters = Parameters::load(&env.config_path())?;
    let config = Arc::new(MigrationConfig::new(
        parameters,
        env.destination_url.clone(),
        env.destination_token.clone(),
    )?);

    let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new(HTTP_TIMEOUT)?);
    let source: Arc<dyn StorageApi> = Arc::new(StorageClient::new(
        http.clone(),
        config.source_url(),
        config.source_token().clone(),
        env.run_id.clone(),
    ));
    let destination: Arc<dyn StorageApi> = Arc::new(StorageClient::new(
        http.clone(),
        &config.destination_url,
        config.destination_token.clone(),
        env.run_id.clone(),
    ));

    let preflight = utils::preflight(&config, source.as_ref(), destination.as_ref()).await?;

    let sleeper: Arc<dyn Sleeper> = Arc::new(TokioSleeper);
    let source_runner = create_job_runner(
        &preflight.source.token,
        &preflight.source.index,
        config.source_token(),
        http.clone(),
        sleeper.clone(),
    )?;
    let destination_runner = create_job_runner(
        &preflight.destination.token,
        &preflight.destination.index,
        &config.destination_token,
        http.clone(),
        sleeper,
    )?;

    let migrations = Arc::new(EncryptionApiClient::new(
        http,
        &preflight.source.index.service_url("encryption")?,
        config
            .parameters
            .source_manage_token
            .clone()
            .unwrap_or_default(),
    ));

    let orchestrator = MigrationOrchestrator::new(
        config.clone(),
        source_runner,
        destination_runner,
        source.clone(),
        destination.clone(),
        migrations,
    );
    orchestrator.run().await?;

    if !config.runs_post_migration_check() {
        project_migrate::info!("Post migration check skipped.");
        return Ok(());
    }
    AfterMigrationChecker::new(source, destination).check().await
}
