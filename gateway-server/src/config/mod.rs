pub(crate) use crate::config::handlers::HandlersConfig;
pub(crate) use crate::config::policy::PolicyConfig;
pub(crate) use crate::config::token::TokenConfig;
use confique::Config;

pub mod handlers;
pub mod policy;
pub mod token;

/// Optional TOML file layered under the environment
pub const CONFIG_FILE_ENV: &str = "DEEPFENCE_CONFIG_FILE";

/// Main configuration structure for the API gateway
#[derive(Debug, Config, Clone)]
pub struct Settings {
    /// The port the gateway listens on (default: 8080)
    #[config(env = "DEEPFENCE_PORT", default = 8080)]
    pub port: u16,

    /// Serve the generated OpenAPI document at /deepfence/openapi-docs (default: false)
    #[config(env = "DEEPFENCE_SERVE_OPENAPI_DOCS", default = false)]
    pub serve_openapi_docs: bool,

    /// Raw deployment flag; "true" in any letter case selects the SaaS deployment
    #[config(env = "SAAS_DEPLOYMENT")]
    pub saas_deployment: Option<String>,

    /// Authorization policy sources
    #[config(nested)]
    pub policy: PolicyConfig,

    /// Access token signing
    #[config(nested)]
    pub token: TokenConfig,

    /// Upstream handler service
    #[config(nested)]
    pub handlers: HandlersConfig,
}

impl Settings {
    /// Loads the configuration from the environment, then the optional config file
    pub fn new() -> Result<Self, confique::Error> {
        let mut builder = Settings::builder().env();
        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            builder = builder.file(path);
        }
        builder.load()
    }

    #[cfg(test)]
    pub fn for_test() -> Self {
        Self {
            port: 0, // Let the OS choose a port
            serve_openapi_docs: true,
            saas_deployment: None,
            policy: PolicyConfig {
                model_path: "auth/model.conf".to_string(),
                rules_path: "auth/policy.csv".to_string(),
            },
            token: TokenConfig {
                secret: Some("test-signing-key-that-is-at-least-32-bytes".to_string()),
                secret_file: None,
                ephemeral_key: false,
                ttl: 3600,
            },
            handlers: HandlersConfig {
                url: "http://127.0.0.1:9".to_string(),
                client_timeout: 5,
            },
        }
    }

    #[cfg(test)]
    pub fn for_test_with_mock(handlers_mock: &wiremock::MockServer) -> Self {
        let mut settings = Self::for_test();
        settings.handlers.url = handlers_mock.uri();
        settings
    }
}
