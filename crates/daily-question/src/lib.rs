//! Daily question bot.
//!
//! Platform adapters around [`round_coordination`]: configuration, the
//! OpenAI question generator, the Discord REST transport, the daily
//! scheduler, and the inbound event bridge.

pub mod config;
pub mod discord;
pub mod events;
pub mod generator;
pub mod scheduler;

pub use config::{BotConfig, ConfigError};
pub use discord::DiscordTransport;
pub use events::{dispatch, parse_event, run_event_loop, Dispatch, InboundEvent};
pub use generator::OpenAiGenerator;
pub use scheduler::{run_daily, DailySchedule};
