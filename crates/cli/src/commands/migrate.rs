use crate::commands::{load_config, open_database, run_blocking, CommandResult};

pub fn run() -> CommandResult {
    let config = match load_config(true) {
        Ok(config) => config,
        Err(failure) => return CommandResult::from_failure("migrate", failure),
    };

    run_blocking("migrate", async move {
        let pool = open_database(&config).await?;
        pool.close().await;
        Ok("applied pending migrations".to_string())
    })
}
