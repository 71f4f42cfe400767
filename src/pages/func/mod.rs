mod appointment;
mod dashboard;
mod followup;
pub mod lead;
mod log;
mod note;
pub mod property;
mod report;
mod target;
mod template;
use axum::Router;

use crate::AppState;

pub use followup::sweep_missed;

pub fn func_router() -> Router<AppState> {
    lead::lead_router()
        .merge(appointment::appointment_router())
        .merge(followup::followup_router())
        .merge(log::log_router())
        .merge(note::note_router())
        .merge(template::template_router())
        .merge(target::target_router())
        .merge(report::report_router())
        .merge(dashboard::dashboard_router())
        .merge(property::property_router())
}
