pub mod analysis;
pub mod api;
pub mod clock;
pub mod config;
pub mod core_state;
pub mod lab;
pub mod pipeline;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("cannot initialize clients: {0}")]
    State(#[from] core_state::StateError),

    #[error("cannot start async runtime: {0}")]
    Runtime(std::io::Error),

    #[error("HTTP server error: {0}")]
    Server(std::io::Error),
}

pub fn run() -> Result<(), StartupError> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = config::AppConfig::from_env()?;

    // Blocking HTTP clients own a runtime of their own; build them first.
    let state = core_state::AppState::from_config(&config)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(StartupError::Runtime)?;

    let served = runtime.block_on(api::serve(
        state.clone(),
        config.bind_addr,
        api::ctrl_c_signal(),
    ));

    // Drop the runtime before the blocking clients inside `state`.
    drop(runtime);
    drop(state);

    served.map_err(StartupError::Server)
}
