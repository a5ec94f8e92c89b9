//! Access token configuration

use confique::Config;

/// Access token signing configuration
#[derive(Config, Clone)]
pub struct TokenConfig {
    /// HMAC signing key for access tokens (at least 32 bytes)
    #[config(env = "DEEPFENCE_JWT_SECRET")]
    pub secret: Option<String>,

    /// File containing the HMAC signing key, used when no inline secret is set
    #[config(env = "DEEPFENCE_JWT_SECRET_FILE")]
    pub secret_file: Option<String>,

    /// Generate a random key at startup when none is configured (default: false).
    /// Tokens issued with a generated key stop verifying after a restart.
    #[config(env = "DEEPFENCE_JWT_EPHEMERAL_KEY", default = false)]
    pub ephemeral_key: bool,

    /// Access token lifetime in seconds (default: 3600 = 1 hour)
    #[config(env = "DEEPFENCE_TOKEN_TTL", default = 3600)]
    pub ttl: u64,
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("secret_file", &self.secret_file)
            .field("ephemeral_key", &self.ephemeral_key)
            .field("ttl", &self.ttl)
            .finish()
    }
}
