//! Mission Control core library: the realtime gateway client, the agent,
//! session, cron and message types it reports, and the dashboard state built
//! from its events. Used by the CLI.

pub mod agent;
pub mod config;
pub mod cron;
pub mod dashboard;
pub mod gateway;
pub mod message;
pub mod session;
