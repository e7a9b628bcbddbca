//! Panel configuration
//!
//! The agent identity and the service endpoint resolve in order: a dconf
//! override under `/com/confab/voice-panel/`, then the environment, then
//! a built-in default.

const DCONF_PATH: &str = "/com/confab/voice-panel/";

/// Keys for dconf settings
mod keys {
    pub const AGENT_ID: &str = "agent-id";
    pub const SERVICE_URL: &str = "service-url";
}

/// Environment variable naming the agent to converse with
pub const AGENT_ID_ENV: &str = "CONFAB_AGENT_ID";
/// Environment variable overriding the service endpoint
pub const SERVICE_URL_ENV: &str = "CONFAB_SERVICE_URL";

// TODO: ship the default agent id with the distro packaging instead of
// baking a development agent into the source.
const DEFAULT_AGENT_ID: &str = "agent_4720c9d1e8b2";
const DEFAULT_SERVICE_URL: &str = "wss://api.confab.chat/v1/conversation";

fn resolve(stored: Option<String>, env: Option<String>, fallback: &str) -> String {
    stored
        .filter(|v| !v.is_empty())
        .or(env.filter(|v| !v.is_empty()))
        .unwrap_or_else(|| fallback.to_string())
}

/// The agent the panel converses with
pub fn agent_id() -> String {
    let key = format!("{}{}", DCONF_PATH, keys::AGENT_ID);
    resolve(
        dconf_rs::get_string(&key).ok(),
        std::env::var(AGENT_ID_ENV).ok(),
        DEFAULT_AGENT_ID,
    )
}

/// The WebSocket endpoint of the conversation service
pub fn service_url() -> String {
    let key = format!("{}{}", DCONF_PATH, keys::SERVICE_URL);
    resolve(
        dconf_rs::get_string(&key).ok(),
        std::env::var(SERVICE_URL_ENV).ok(),
        DEFAULT_SERVICE_URL,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_value_wins() {
        let id = resolve(
            Some("agent_stored".to_string()),
            Some("agent_env".to_string()),
            DEFAULT_AGENT_ID,
        );
        assert_eq!(id, "agent_stored");
    }

    #[test]
    fn test_environment_beats_default() {
        let id = resolve(None, Some("agent_env".to_string()), DEFAULT_AGENT_ID);
        assert_eq!(id, "agent_env");
    }

    #[test]
    fn test_falls_back_to_default() {
        let id = resolve(None, None, DEFAULT_AGENT_ID);
        assert_eq!(id, DEFAULT_AGENT_ID);
    }

    #[test]
    fn test_empty_values_are_unset() {
        let id = resolve(Some(String::new()), Some(String::new()), DEFAULT_AGENT_ID);
        assert_eq!(id, DEFAULT_AGENT_ID);
    }
}
