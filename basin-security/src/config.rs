/// Security configuration for the Auth Gate.
///
/// Narrowed from a JWKS/OIDC setup to a single shared HMAC secret, matching
/// the spec's "validates against the configured secret" contract rather
/// than a remote-issuer flow.
#[derive(Clone)]
pub struct SecurityConfig {
    /// Shared secret used to sign and verify bearer tokens (HS256).
    pub jwt_secret: String,
    /// Shared master key exchanged for a bearer token at `/auth/login`.
    pub master_key: String,
    /// When true, every authenticated session is treated as root,
    /// regardless of its `role` claim.
    pub dev_mode: bool,
    /// Token lifetime in seconds, used when issuing tokens at `/auth/login`.
    pub token_ttl_secs: i64,
}

impl SecurityConfig {
    pub fn new(jwt_secret: impl Into<String>, master_key: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            master_key: master_key.into(),
            dev_mode: false,
            token_ttl_secs: 24 * 3600,
        }
    }

    pub fn with_dev_mode(mut self, dev_mode: bool) -> Self {
        self.dev_mode = dev_mode;
        self
    }

    pub fn with_token_ttl(mut self, ttl_secs: i64) -> Self {
        self.token_ttl_secs = ttl_secs;
        self
    }

    pub fn from_basin_config(config: &basin_core::BasinConfig) -> Self {
        let dev_mode = config.get_or("app.dev_mode", false);
        Self::new(
            config.get_or("app.security.jwt_secret", "dev-secret-change-me".to_string()),
            config.get_or("app.master_key", "dev-master-key".to_string()),
        )
        .with_dev_mode(dev_mode)
    }
}
