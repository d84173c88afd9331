use tracing::{debug, warn};

/// fallback identity when USER_AGENTS_JSON is missing or unusable
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(clap::ValueEnum, Clone, Debug, Copy)]
pub enum CargoEnv {
    Development,
    Production,
}

#[derive(clap::Parser, Debug, Clone)]
pub struct AppConfig {
    // production or development
    #[clap(long, env, value_enum, default_value = "development")]
    pub cargo_env: CargoEnv,

    // port that the app will bind to
    #[clap(long, env, default_value = "5000")]
    pub port: u16,

    // redis url for the cache store, leaving it out means every request goes upstream
    #[clap(long, env)]
    pub redis_url: Option<String>,

    // seconds a cached body or processed playlist stays valid, also sent as max-age
    #[clap(long, env, default_value = "86400")]
    pub cache_ttl: u64,

    // how many master -> variant hops a single request may follow
    #[clap(long, env, default_value = "5")]
    pub max_recursion: u32,

    // json array of user agents to rotate through, ex '["UA1", "UA2"]'
    #[clap(long, env)]
    pub user_agents_json: Option<String>,

    // verbose diagnostics only, never changes behavior
    #[clap(long, env, default_value = "false")]
    pub debug: bool,

    // optional sentry integration
    #[clap(long, env)]
    pub sentry_dsn: Option<String>,
}

impl Default for AppConfig {
    // defaults aren't really needed here but it's here as a bad fallback
    fn default() -> Self {
        Self {
            cargo_env: CargoEnv::Development,
            port: 5000,
            redis_url: None,
            cache_ttl: 86400,
            max_recursion: 5,
            user_agents_json: None,
            debug: false,
            sentry_dsn: None,
        }
    }
}

impl AppConfig {
    /// resolve the raw env values into the settings every component reads
    pub fn proxy_settings(&self) -> ProxySettings {
        ProxySettings {
            cache_ttl: self.cache_ttl,
            max_recursion: self.max_recursion,
            user_agents: parse_user_agents(self.user_agents_json.as_deref()),
        }
    }
}

/// read-only settings handed to the proxy core, built once per process
#[derive(Debug, Clone)]
pub struct ProxySettings {
    pub cache_ttl: u64,
    pub max_recursion: u32,
    pub user_agents: Vec<String>,
}

impl Default for ProxySettings {
    fn default() -> Self {
        AppConfig::default().proxy_settings()
    }
}

impl ProxySettings {
    /// value used for the public cache-control directive
    pub fn cache_control(&self) -> String {
        format!("public, max-age={}", self.cache_ttl)
    }
}

/// a non-empty json array of strings wins, anything else keeps the built-in agent
pub fn parse_user_agents(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw else {
        return vec![DEFAULT_USER_AGENT.to_string()];
    };

    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(agents) if !agents.is_empty() => {
            debug!("loaded {} user agents from USER_AGENTS_JSON", agents.len());
            agents
        }
        Ok(_) => {
            debug!("USER_AGENTS_JSON is empty, using the default user agent");
            vec![DEFAULT_USER_AGENT.to_string()]
        }
        Err(e) => {
            warn!("failed to parse USER_AGENTS_JSON: {}, using the default user agent", e);
            vec![DEFAULT_USER_AGENT.to_string()]
        }
    }
}
