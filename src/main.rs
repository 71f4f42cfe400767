use std::time::Duration;

use lead_crm::{
    database,
    libs::time::{TimeFormat, TIME},
    pages::func::sweep_missed,
    AppState, Config,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,lead_crm=debug")),
        )
        .init();
    let config = Config::read();
    let store = match database::open(config.database_url()) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("failed to open store: {e}");
            std::process::exit(1);
        }
    };
    let port = config.port();
    let sweep = Duration::from_secs(config.followup_sweep_secs().max(1));
    let state = AppState::new(store, config);

    let sweeper = state.store.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep);
        loop {
            interval.tick().await;
            let Ok(now) = TIME::now() else { continue };
            let store = sweeper.clone();
            let now = now.format(TimeFormat::YYYYMMDD_HHMMSS);
            match tokio::task::spawn_blocking(move || sweep_missed(&*store, &now)).await {
                Ok(Ok(n)) if n > 0 => tracing::info!("marked {n} followups missed"),
                Ok(Ok(_)) => (),
                Ok(Err(e)) => tracing::warn!("followup sweep failed: {e}"),
                Err(e) => tracing::warn!("followup sweep panicked: {e}"),
            }
        }
    });

    let listener = match tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("failed to bind port {port}: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!("listening on 0.0.0.0:{port}");
    if let Err(e) = axum::serve(listener, lead_crm::app(state)).await {
        tracing::error!("server stopped: {e}");
    }
}
