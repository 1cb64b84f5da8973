use trout_core::Visibility;
use trout_db::SqlShoutOutRepository;

use crate::commands::{load_config, open_database, run_blocking, CommandResult, Failure, EXIT_DB};

pub fn run() -> CommandResult {
    let config = match load_config(true) {
        Ok(config) => config,
        Err(failure) => return CommandResult::from_failure("pending", failure),
    };

    run_blocking("pending", async move {
        let pool = open_database(&config).await?;
        let repository = SqlShoutOutRepository::new(pool.clone());

        let mut counts = Vec::with_capacity(2);
        for visibility in [Visibility::Public, Visibility::Private] {
            let count = repository
                .count_unreleased(visibility)
                .await
                .map_err(|error| Failure::new("db_query", error.to_string(), EXIT_DB))?;
            counts.push(format!("{count} {}", visibility.as_str()));
        }
        pool.close().await;

        Ok(format!("unreleased shout outs: {}", counts.join(", ")))
    })
}
