use std::env;

pub const ENV_ACCEPT_UNORDERED: &str = "OCAP_COMMS_ACCEPT_UNORDERED";
pub const ENV_MAX_RESOLUTION_DEPTH: &str = "OCAP_COMMS_MAX_RESOLUTION_DEPTH";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommsConfig {
    /// Accept inbound messages with an empty seqNum (ordering guaranteed
    /// externally). They still advance the inbound counter.
    pub accept_unordered: bool,
    /// Upper bound on nested resolved promises followed when collecting
    /// auxiliary resolutions.
    pub max_resolution_depth: usize,
}

impl Default for CommsConfig {
    fn default() -> Self {
        Self {
            accept_unordered: true,
            max_resolution_depth: 1024,
        }
    }
}

impl CommsConfig {
    /// Defaults overridden by `OCAP_COMMS_*` variables; unparseable values
    /// fall back to the default with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = env::var(ENV_ACCEPT_UNORDERED) {
            match parse_bool(&raw) {
                Some(value) => config.accept_unordered = value,
                None => log::warn!("ignoring {ENV_ACCEPT_UNORDERED}={raw}: expected a boolean"),
            }
        }
        if let Ok(raw) = env::var(ENV_MAX_RESOLUTION_DEPTH) {
            match raw.trim().parse::<usize>() {
                Ok(value) if value > 0 => config.max_resolution_depth = value,
                _ => log::warn!(
                    "ignoring {ENV_MAX_RESOLUTION_DEPTH}={raw}: expected a positive integer"
                ),
            }
        }
        config
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_values_parse_loosely() {
        assert_eq!(parse_bool(" TRUE "), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn defaults_accept_unordered() {
        let config = CommsConfig::default();
        assert!(config.accept_unordered);
        assert_eq!(config.max_resolution_depth, 1024);
    }
}
