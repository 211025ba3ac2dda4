use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use session_engine::config::EngineConfig;
use session_engine::db::SessionStore;
use session_engine::holiday::{ClosureCalendarProvider, HolidayCalendar, HolidayClient, HolidayProvider};
use session_engine::schedule::{PreviewAssembler, RecurrencePlanner, RescheduleEngine, ScheduleService};
use session_engine::server::create_router;
use session_engine::tasks::{self, EngineEvent};
use session_engine::types::EngineState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    let config = EngineConfig::from_env().context("failed to load configuration")?;
    info!(
        db_path = %config.db_path,
        country = %config.holidays.country_code,
        "Starting session engine"
    );

    let store = Arc::new(SessionStore::open(&config.db_path).context("failed to open session store")?);
    let holiday_client =
        Arc::new(HolidayClient::new(config.holidays.clone()).context("failed to build holiday client")?);
    let holidays: Arc<dyn HolidayProvider> = Arc::new(ClosureCalendarProvider::new(
        holiday_client.clone(),
        HolidayCalendar::from_entries(config.closures.clone()),
    ));

    let assembler = PreviewAssembler::new(
        store.clone(),
        holidays.clone(),
        RecurrencePlanner::new(config.max_generation_days),
        RescheduleEngine::new(config.reschedule_window_days),
        config.default_branch_hours,
    );
    let service = ScheduleService::new(assembler);

    let background = if config.tasks.enabled {
        let (sweeper, reminder) = tasks::from_config(&config.tasks, store.clone(), holidays.clone());
        let (handle, mut events) = tasks::spawn_background_tasks(sweeper, reminder);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    EngineEvent::NoShowsMarked { session_ids } => {
                        info!(count = session_ids.len(), ?session_ids, "Sessions marked as no-show");
                    }
                    EngineEvent::UpcomingHoliday {
                        session_id,
                        schedule_id,
                        date,
                        holiday_name,
                    } => {
                        warn!(session_id, schedule_id, %date, %holiday_name, "Session falls on a holiday");
                    }
                }
            }
        });
        Some(handle)
    } else {
        None
    };

    let bind_address = config.bind_address.clone();
    let state = Arc::new(EngineState::new(service, holiday_client, config));
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {}", bind_address))?;
    info!("Server listening on http://{}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = background {
        handle.shutdown().await;
    }
    info!("Session engine stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
