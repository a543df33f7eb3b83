use std::sync::Arc;
use std::time::Duration;

use pollbot_chat::{
    ChatRunner, CommandRouter, ConnectPolicy, MattermostClient, MattermostWebSocket,
    PollCommandHandler, RunnerSettings, TransportError,
};
use pollbot_core::config::{AppConfig, ConfigError, StoreBackend};
use pollbot_core::messages::MessageCatalog;
use pollbot_db::{
    connect_with_settings, migrations, ConflictRetryPolicy, DbPool, InMemoryPollRepository,
    PollRepository, SqlPollRepository,
};
use pollbot_service::PollService;
use thiserror::Error;
use tracing::info;

/// Upper bound for handling one chat command, store retries included.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Application {
    pub config: AppConfig,
    pub db_pool: Option<DbPool>,
    pub service: Arc<PollService>,
    pub runner: ChatRunner,
}

/// The store-side half of the application; everything except the chat
/// connection.
pub struct PollStack {
    pub db_pool: Option<DbPool>,
    pub service: Arc<PollService>,
    pub messages: Arc<MessageCatalog>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("message templates failed to load: {0}")]
    Messages(#[source] tera::Error),
    #[error("chat server setup failed: {0}")]
    Chat(#[source] TransportError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        store_backend = config.store.backend.as_str(),
        "starting application bootstrap"
    );

    let stack = build_poll_stack(&config).await?;

    let client = MattermostClient::from_config(&config.mattermost).map_err(BootstrapError::Chat)?;
    let identity = client.current_user().await.map_err(BootstrapError::Chat)?;
    info!(
        event_name = "system.bootstrap.chat_identity",
        correlation_id = "bootstrap",
        bot_user_id = %identity.id,
        bot_username = %identity.username,
        "resolved bot identity"
    );

    let handler = PollCommandHandler::new(CommandRouter::new(
        Arc::clone(&stack.service),
        Arc::clone(&stack.messages),
    ));
    let runner = ChatRunner::new(
        Arc::new(MattermostWebSocket::from_config(&config.mattermost)),
        Arc::new(client),
        Arc::new(handler),
        RunnerSettings {
            bot_user_id: identity.id,
            connect_policy: ConnectPolicy {
                max_attempts: config.mattermost.connect_retries,
                base_delay: Duration::from_millis(config.mattermost.connect_retry_delay_ms),
            },
            request_timeout: COMMAND_TIMEOUT,
        },
    );

    Ok(Application { config, db_pool: stack.db_pool, service: stack.service, runner })
}

/// Picks the poll store from `store.backend` and wires the service on top.
/// The SQL backend is migrated before use.
pub async fn build_poll_stack(config: &AppConfig) -> Result<PollStack, BootstrapError> {
    let (repository, db_pool): (Arc<dyn PollRepository>, Option<DbPool>) =
        match config.store.backend {
            StoreBackend::Memory => {
                info!(
                    event_name = "system.bootstrap.store_selected",
                    correlation_id = "bootstrap",
                    "using in-memory poll store; polls are lost on restart"
                );
                (Arc::new(InMemoryPollRepository::default()), None)
            }
            StoreBackend::Sql => {
                let pool = connect_with_settings(
                    &config.database.url,
                    config.database.max_connections,
                    config.database.timeout_secs,
                )
                .await
                .map_err(BootstrapError::DatabaseConnect)?;
                info!(
                    event_name = "system.bootstrap.database_connected",
                    correlation_id = "bootstrap",
                    "database connection established"
                );

                migrations::run_pending(&pool).await.map_err(BootstrapError::Migration)?;
                info!(
                    event_name = "system.bootstrap.migrations_applied",
                    correlation_id = "bootstrap",
                    "database migrations applied"
                );
                (Arc::new(SqlPollRepository::new(pool.clone())), Some(pool))
            }
        };

    let messages = Arc::new(
        MessageCatalog::new(config.polls.locale, config.polls.command_prefix.clone())
            .map_err(BootstrapError::Messages)?,
    );
    let service = PollService::new(repository, Arc::clone(&messages))
        .with_limits(config.polls.limits())
        .with_retry_policy(ConflictRetryPolicy::new(
            config.store.vote_retry_attempts,
            Duration::from_millis(config.store.vote_retry_base_delay_ms),
        ));

    Ok(PollStack { db_pool, service: Arc::new(service), messages })
}
