use std::sync::Arc;
use std::time::Instant;

use crate::config::EngineConfig;
use crate::holiday::HolidayClient;
use crate::schedule::ScheduleService;

/// Shared state handed to every request handler.
pub struct EngineState {
    pub service: ScheduleService,
    /// Upstream holiday client, kept for cache management endpoints
    pub holiday_client: Arc<HolidayClient>,
    pub config: EngineConfig,
    pub started_at: Instant,
}

impl EngineState {
    pub fn new(service: ScheduleService, holiday_client: Arc<HolidayClient>, config: EngineConfig) -> Self {
        Self {
            service,
            holiday_client,
            config,
            started_at: Instant::now(),
        }
    }
}
