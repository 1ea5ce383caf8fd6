//! Global logging flags: `-v` (or `MDOC_LOG_LEVEL`) and `--log-json`.

use clap::{builder::ValueParser, Arg, ArgAction, ArgMatches, Command};
use tracing::Level;

pub const ARG_VERBOSITY: &str = "verbosity";
pub const ARG_LOG_JSON: &str = "log-json";

/// Index is the `-v` count that selects the level.
const LEVELS: [(&str, Level); 5] = [
    ("error", Level::ERROR),
    ("warn", Level::WARN),
    ("info", Level::INFO),
    ("debug", Level::DEBUG),
    ("trace", Level::TRACE),
];

/// Accepts a `-v` count or a level name.
#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(count) = level.parse::<u8>() {
            if usize::from(count) < LEVELS.len() {
                return Ok(count);
            }
        }
        LEVELS
            .iter()
            .position(|(name, _)| name.eq_ignore_ascii_case(level))
            .and_then(|index| u8::try_from(index).ok())
            .ok_or_else(|| format!("invalid log level {level:?}"))
    })
}

/// Level for a verbosity count; anything past `trace` stays `trace`.
#[must_use]
pub fn level_for(verbosity: u8) -> Level {
    LEVELS
        .get(usize::from(verbosity))
        .map_or(Level::TRACE, |(_, level)| *level)
}

/// Level selected on the command line, `error` when nothing was given.
#[must_use]
pub fn level(matches: &ArgMatches) -> Level {
    level_for(matches.get_one::<u8>(ARG_VERBOSITY).copied().unwrap_or(0))
}

#[must_use]
pub fn json(matches: &ArgMatches) -> bool {
    matches.get_flag(ARG_LOG_JSON)
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_VERBOSITY)
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("MDOC_LOG_LEVEL")
                .global(true)
                .action(ArgAction::Count)
                .value_parser(validator_log_level()),
        )
        .arg(
            Arg::new(ARG_LOG_JSON)
                .long(ARG_LOG_JSON)
                .help("Write logs as JSON lines")
                .env("MDOC_LOG_JSON")
                .global(true)
                .action(ArgAction::SetTrue),
        )
}
