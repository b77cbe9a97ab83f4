const LIVEWATCH_COOKIE: &str = "LIVEWATCH_COOKIE";

/// Upstream cookie from the environment, taking precedence over the config file
pub fn get_cookie() -> Option<String> {
    let cookie_from_env = std::env::var(LIVEWATCH_COOKIE);
    cookie_from_env.ok().filter(|cookie| !cookie.trim().is_empty())
}

const LIVEWATCH_CONFIG: &str = "LIVEWATCH_CONFIG";

const DEFAULT_CONFIG: &str = "./livewatch.json";

pub fn get_config_path() -> String {
    let path_from_env = std::env::var(LIVEWATCH_CONFIG);
    path_from_env.unwrap_or_else(|_| String::from(DEFAULT_CONFIG))
}
