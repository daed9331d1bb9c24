/*!
mentordesk: administrative web application for a mentorship platform.

An administrator signs in, creates mentee/mentor/user records, views the
aggregated student and tutor tables, and suspends or deletes accounts.
Data lives in a Postgres "data DB" (`store`); identities and session keys
live in a separate "auth DB" (`auth`).
*/
use time::{format_description::FormatItem, macros::format_description};

pub mod auth;
pub mod config;
pub mod inter;
pub mod store;
pub mod user;

/// Format for all dates that cross the HTTP boundary (form inputs,
/// rendered tables): `YYYY-MM-DD`.
pub const DATE_FMT: &[FormatItem] = format_description!("[year]-[month]-[day]");

pub fn log_level_from_env() -> simplelog::LevelFilter {
    use simplelog::LevelFilter;

    let mut level_string = match std::env::var("LOG_LEVEL") {
        Err(_) => { return LevelFilter::Warn; },
        Ok(s) => s,
    };

    level_string.make_ascii_lowercase();
    match level_string.as_str() {
        "max" => LevelFilter::max(),
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Warn,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub fn ensure_logging() {
        use simplelog::{TermLogger, TerminalMode, ColorChoice};
        let log_cfg = simplelog::ConfigBuilder::new()
            .add_filter_allow_str("mentordesk")
            .build();
        let res = TermLogger::init(
            log_level_from_env(),
            log_cfg,
            TerminalMode::Stdout,
            ColorChoice::Auto
        );

        match res {
            Ok(_) => { log::info!("Test logging started."); },
            Err(_) => { log::info!("Test logging already started."); },
        }
    }
}
