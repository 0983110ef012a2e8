pub mod plugin_events;
pub mod plugin_uploads;
