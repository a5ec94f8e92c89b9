use confique::Config;

/// Configuration for the upstream service that implements the business handlers
#[derive(Debug, Config, Clone)]
pub struct HandlersConfig {
    /// Base URL of the handler service (default: http://localhost:8081)
    #[config(env = "DEEPFENCE_HANDLERS_URL", default = "http://localhost:8081")]
    pub url: String,

    /// The timeout for handler service requests in seconds (default: 60)
    #[config(env = "DEEPFENCE_HANDLERS_CLIENT_TIMEOUT", default = 60)]
    pub client_timeout: u64,
}

impl HandlersConfig {
    /// Returns the handler service URL for the given path (and query)
    pub fn get_url<S: AsRef<str>>(&self, path: S) -> String {
        let base = self.url.trim_end_matches('/');
        let path = path.as_ref();
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }
}
