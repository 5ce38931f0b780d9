use media_downloader_lib::logging::init_logging;
use media_downloader_lib::{server, ServerConfig};

#[tokio::main]
async fn main() {
    init_logging();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            std::process::exit(2);
        }
    };

    if let Err(e) = server::run(config).await {
        tracing::error!(error = %e, "server stopped");
        std::process::exit(1);
    }
}
