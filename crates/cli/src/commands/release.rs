//! One-shot release from the operator's terminal, bypassing the password
//! prompt. Uses the same pipeline and pacing as the bot.

use std::sync::Arc;

use trout_core::{
    DisplayResolver, PacingPolicy, ReleasePacing, ReleasePipeline, ReleaseRequest, RunState,
    UserId, Visibility,
};
use trout_db::{SqlShoutOutRepository, SqlUserRepository};
use trout_slack::web_api::SlackWebApi;

use crate::commands::{
    load_config, open_database, run_blocking, CommandResult, Failure, EXIT_RELEASE,
};

#[derive(Clone, Debug)]
pub struct ReleaseArgs {
    pub visibility: Visibility,
    pub channel_id: String,
    pub operator: String,
}

pub fn run(args: ReleaseArgs) -> CommandResult {
    let config = match load_config(false) {
        Ok(config) => config,
        Err(failure) => return CommandResult::from_failure("release", failure),
    };
    crate::init_stderr_logging(&config.logging.level);

    run_blocking("release", async move {
        let pool = open_database(&config).await?;
        let users = Arc::new(SqlUserRepository::new(pool.clone()));
        let gateway = Arc::new(SlackWebApi::new(
            config.slack.api_base_url.clone(),
            config.slack.bot_token.clone(),
        ));
        let pipeline = ReleasePipeline::new(
            Arc::new(SqlShoutOutRepository::new(pool.clone())),
            DisplayResolver::with_random_pseudonyms(users),
            gateway,
            ReleasePacing::from_policy(PacingPolicy::from(&config.release)),
        );

        let request =
            ReleaseRequest { channel_id: args.channel_id, operator: UserId(args.operator) };
        let report = pipeline
            .run(args.visibility, &request)
            .await
            .map_err(|error| Failure::new("release", error.to_string(), EXIT_RELEASE))?;
        pool.close().await;

        let visibility = args.visibility.as_str();
        Ok(match report.state {
            RunState::Empty => format!("no {visibility} shout outs to release"),
            RunState::Completed => format!(
                "released {} of {} {visibility} shout outs ({} still pending, run {})",
                report.released(),
                report.fetched,
                report.pending(),
                report.run_id
            ),
        })
    })
}
