mod cli;
mod infra;

use account_health::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
