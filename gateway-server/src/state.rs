use crate::config::Settings;
use crate::deployment::DeploymentMode;
use crate::errors::StartupError;
use crate::handlers::{HandlerCollaborator, UpstreamHandlers};
use crate::routes::RouteTable;
use crate::token::{SigningKey, TokenAuthority};
use log::{error, info};
use policy_engine::{Enforcer, PolicyEnforcer};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub routes: Arc<RouteTable>,
    pub tokens: Arc<TokenAuthority>,
    pub enforcer: Arc<dyn PolicyEnforcer>,
    pub handlers: Arc<dyn HandlerCollaborator>,
    pub deployment: DeploymentMode,
}

impl AppState {
    /// Builds every long-lived component; any failure is fatal for the process
    pub async fn new(settings: Settings) -> Result<Self, StartupError> {
        let routes = RouteTable::deepfence(settings.serve_openapi_docs)?;
        let key = SigningKey::from_config(&settings.token)?;
        let enforcer = Enforcer::from_files(
            &settings.policy.model_path,
            &settings.policy.rules_path,
        )
        .await?;
        let handlers = UpstreamHandlers::new(&settings.handlers)?;
        let deployment = DeploymentMode::resolve(settings.saas_deployment.as_deref());

        info!(
            "Gateway ready: {} routes, handler service at {}, SaaS deployment: {}",
            routes.entries().count(),
            settings.handlers.url,
            deployment.is_saas()
        );

        Ok(Self {
            tokens: Arc::new(TokenAuthority::new(&key, settings.token.ttl)),
            routes: Arc::new(routes),
            enforcer: Arc::new(enforcer),
            handlers: Arc::new(handlers),
            deployment,
            settings: Arc::new(settings),
        })
    }

    /// Re-reads the policy files; the current rules stay in effect when that fails
    pub async fn reload_policy(&self) -> bool {
        match self.enforcer.load_rules().await {
            Ok(stats) => {
                info!(
                    "Policy reloaded: {} rules, {} role bindings",
                    stats.rules, stats.bindings
                );
                true
            }
            Err(e) => {
                error!("Policy reload failed, keeping the previous rules: {}", e);
                false
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn for_testing(
        settings: Settings,
        enforcer: Arc<dyn PolicyEnforcer>,
        handlers: Arc<dyn HandlerCollaborator>,
    ) -> Self {
        let key = SigningKey::from_config(&settings.token).unwrap();
        Self {
            routes: Arc::new(RouteTable::deepfence(settings.serve_openapi_docs).unwrap()),
            tokens: Arc::new(TokenAuthority::new(&key, settings.token.ttl)),
            enforcer,
            handlers,
            deployment: DeploymentMode::resolve(settings.saas_deployment.as_deref()),
            settings: Arc::new(settings),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const MODEL: &str = "[request_definition]\nr = sub, obj, act\n\n[policy_definition]\np = sub, obj, act\n\n[role_definition]\ng = _, _\n\n[policy_effect]\ne = some(where (p.eft == allow))\n\n[matchers]\nm = g(r.sub, p.sub) && r.obj == p.obj && r.act == p.act\n";

    fn settings_with_policy(dir: &TempDir, policy: &str) -> Settings {
        let model_path = dir.path().join("model.conf");
        let rules_path = dir.path().join("policy.csv");
        fs::write(&model_path, MODEL).unwrap();
        fs::write(&rules_path, policy).unwrap();

        let mut settings = Settings::for_test();
        settings.policy.model_path = model_path.to_string_lossy().into_owned();
        settings.policy.rules_path = rules_path.to_string_lossy().into_owned();
        settings
    }

    #[tokio::test]
    async fn test_app_state_new() {
        let state = AppState::new(Settings::for_test()).await.unwrap();

        assert!(state.enforcer.enforce("admin", "all-users", "delete"));
        assert!(!state.enforcer.enforce("read-only-user", "user", "write"));
        assert!(state.routes.entries().count() > 0);
        assert!(!state.deployment.is_saas());
    }

    #[tokio::test]
    async fn test_app_state_saas_deployment() {
        let mut settings = Settings::for_test();
        settings.saas_deployment = Some("TRUE".to_string());
        assert!(AppState::new(settings).await.unwrap().deployment.is_saas());
    }

    #[tokio::test]
    async fn test_app_state_requires_signing_key() {
        let mut settings = Settings::for_test();
        settings.token.secret = None;
        assert!(matches!(
            AppState::new(settings).await,
            Err(StartupError::MissingSigningKey)
        ));
    }

    #[tokio::test]
    async fn test_app_state_requires_policy() {
        let mut settings = Settings::for_test();
        settings.policy.rules_path = "auth/does-not-exist.csv".to_string();
        assert!(matches!(
            AppState::new(settings).await,
            Err(StartupError::Policy(_))
        ));
    }

    #[tokio::test]
    async fn test_reload_policy() {
        let dir = TempDir::new().unwrap();
        let settings = settings_with_policy(&dir, "p, admin, user, read\n");
        let rules_path = settings.policy.rules_path.clone();
        let state = AppState::new(settings).await.unwrap();
        assert!(!state.enforcer.enforce("admin", "user", "write"));

        fs::write(&rules_path, "p, admin, user, read\np, admin, user, write\n").unwrap();
        assert!(state.reload_policy().await);
        assert!(state.enforcer.enforce("admin", "user", "write"));

        // Rule with too few fields for the policy definition
        fs::write(&rules_path, "p, admin, user\n").unwrap();
        assert!(!state.reload_policy().await);
        assert!(state.enforcer.enforce("admin", "user", "write"));
    }

    #[tokio::test]
    async fn test_app_state_clone() {
        let state = AppState::new(Settings::for_test()).await.unwrap();
        let state2 = state.clone();

        // After cloning, both instances should point to the same data
        assert_eq!(Arc::as_ptr(&state.settings), Arc::as_ptr(&state2.settings));
        assert_eq!(Arc::as_ptr(&state.routes), Arc::as_ptr(&state2.routes));
        assert!(Arc::ptr_eq(&state.enforcer, &state2.enforcer));
    }
}
