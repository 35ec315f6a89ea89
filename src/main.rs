use std::process::ExitCode;
use tracing::info;

#[tokio::main]
async fn main() -> ExitCode {
    let app = match pipple_bootstrap::bootstrap().await {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Failed to initialize application: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!(
        config = %app.config.path().display(),
        version = %app.version.trim(),
        "Application started"
    );

    pipple_bootstrap::shutdown().await;
    ExitCode::SUCCESS
}
