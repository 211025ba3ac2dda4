//! Recurring session generation for a language-school backend.
//!
//! A [`schedule::ScheduleDefinition`] is expanded into dated sessions, moved
//! off public holidays, checked against operating hours and existing
//! bookings, and persisted through [`db::SessionStore`]. The same pipeline
//! backs the read-only preview, so a preview shows exactly what create will
//! write.

pub mod config;
pub mod db;
pub mod holiday;
pub mod schedule;
pub mod server;
pub mod tasks;
pub mod types;
