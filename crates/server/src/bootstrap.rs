use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use trout_core::config::AppConfig;
use trout_core::{
    DeliveryError, DisplayResolver, PacingPolicy, ReleasePacing, ReleasePipeline, ShoutOutIntake,
    UserId,
};
use trout_db::{connect_with_settings, migrations, DbPool, SqlShoutOutRepository, SqlUserRepository};
use trout_slack::service::TroutService;
use trout_slack::web_api::SlackWebApi;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub slack_api: Arc<SlackWebApi>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("could not resolve the bot user via auth.test: {0}")]
    SlackAuth(#[source] DeliveryError),
}

pub async fn bootstrap(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
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

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let slack_api = Arc::new(SlackWebApi::new(
        config.slack.api_base_url.clone(),
        config.slack.bot_token.clone(),
    ));

    Ok(Application { config, db_pool, slack_api })
}

impl Application {
    /// App mentions start with the bot's own mention, so its id is needed
    /// before any event is handled.
    pub async fn resolve_bot_user(&self) -> Result<UserId, BootstrapError> {
        let bot_user = self.slack_api.auth_test().await.map_err(BootstrapError::SlackAuth)?;
        info!(
            event_name = "system.bootstrap.bot_user_resolved",
            correlation_id = "bootstrap",
            bot_user = %bot_user,
            "resolved bot user"
        );
        Ok(bot_user)
    }

    pub fn trout_service(&self, bot_user: UserId) -> TroutService {
        let shout_outs = Arc::new(SqlShoutOutRepository::new(self.db_pool.clone()));
        let users = Arc::new(SqlUserRepository::new(self.db_pool.clone()));

        let intake = ShoutOutIntake::new(shout_outs.clone(), users.clone(), self.slack_api.clone());
        let pipeline = ReleasePipeline::new(
            shout_outs,
            DisplayResolver::with_random_pseudonyms(users),
            self.slack_api.clone(),
            ReleasePacing::from_policy(PacingPolicy::from(&self.config.release)),
        );

        TroutService::new(
            intake,
            pipeline,
            self.slack_api.clone(),
            self.slack_api.clone(),
            bot_user,
            &self.config.release,
        )
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use trout_core::config::{AppConfig, ConfigOverrides, LoadOptions};
    use trout_core::UserId;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::bootstrap::{bootstrap, Application, BootstrapError};

    async fn load_and_bootstrap(options: LoadOptions) -> anyhow::Result<Application> {
        Ok(bootstrap(AppConfig::load(options)?).await?)
    }

    fn valid_overrides(database_url: &str, api_base_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                slack_app_token: Some("xapp-test".to_string()),
                slack_bot_token: Some("xoxb-test".to_string()),
                slack_api_base_url: Some(api_base_url.to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_required_slack_tokens() {
        let result = load_and_bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                slack_app_token: Some("invalid-token".to_string()),
                slack_bot_token: Some("xoxb-valid".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("slack.app_token"));
    }

    #[tokio::test]
    async fn bootstrap_applies_the_shout_out_schema() {
        let app = load_and_bootstrap(valid_overrides("sqlite::memory:", "https://slack.com/api"))
            .await
            .expect("bootstrap should succeed with valid overrides");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('slack_user', 'shout_out')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema query");
        assert_eq!(table_count, 2);

        let service = app.trout_service(UserId("UBOT".to_string()));
        service.release_idle().await;

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn bot_user_comes_from_auth_test() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth.test"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"ok": true, "user_id": "UBOT"})),
            )
            .mount(&server)
            .await;

        let app = load_and_bootstrap(valid_overrides("sqlite::memory:", &server.uri()))
            .await
            .expect("bootstrap");

        assert_eq!(app.resolve_bot_user().await.expect("bot user"), UserId("UBOT".to_string()));
    }

    #[tokio::test]
    async fn rejected_bot_token_is_a_bootstrap_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth.test"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"ok": false, "error": "invalid_auth"})),
            )
            .mount(&server)
            .await;

        let app = load_and_bootstrap(valid_overrides("sqlite::memory:", &server.uri()))
            .await
            .expect("bootstrap");

        let error = app.resolve_bot_user().await.expect_err("invalid auth");
        assert!(matches!(error, BootstrapError::SlackAuth(_)));
        assert!(error.to_string().contains("invalid_auth"));
    }
}
