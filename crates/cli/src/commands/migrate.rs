use crate::commands::{CommandResult, FailureKind};
use pollbot_core::config::{AppConfig, LoadOptions, StoreBackend};
use pollbot_db::{connect_with_settings, migrations};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                FailureKind::ConfigValidation,
                format!("configuration issue: {error}"),
            );
        }
    };

    if config.store.backend == StoreBackend::Memory {
        return CommandResult::success(
            "migrate",
            "store.backend is `memory`; there is no schema to migrate",
        );
    }

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                FailureKind::RuntimeInit,
                format!("failed to initialize async runtime: {error}"),
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| (FailureKind::DbConnectivity, error.to_string()))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| (FailureKind::Migration, error.to_string()))?;
        pool.close().await;
        Ok::<(), (FailureKind, String)>(())
    });

    match result {
        Ok(()) => CommandResult::success(
            "migrate",
            format!("applied pending migrations to `{}`", config.database.url),
        ),
        Err((kind, message)) => CommandResult::failure("migrate", kind, message),
    }
}
