//! # policy-engine
//!
//! Default-deny evaluation of `(subject, resource, action)` requests against a
//! Casbin model and policy.
//!
//! ## Components
//!
//! - **Sources:** where the model and rules are loaded from ([`FileSource`], [`StaticSource`]).
//! - **Enforcer:** thread-safe evaluator with atomic reload.

pub mod error;
pub mod source;

pub use crate::error::LoadError;
pub use crate::source::{FileSource, PolicySource, StaticSource};

use async_trait::async_trait;
use casbin::{CoreApi, DefaultModel, Enforcer as CasbinEnforcer, MgmtApi, Model};
use log::{error, info};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

/// Effect under which a request is admitted unless an explicit deny rule matches
const NO_DENY_EFFECT: &str = "!some(where (p.eft == deny))";

/// Summary of a successful load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleStats {
    pub rules: usize,
    pub bindings: usize,
}

/// Capability interface for authorization decisions
#[async_trait]
pub trait PolicyEnforcer: Send + Sync {
    /// (Re)loads the model and rules from the backing source.
    ///
    /// On failure the previously loaded rules stay in effect.
    async fn load_rules(&self) -> Result<RuleStats, LoadError>;

    /// Returns `true` only when the model admits the request
    fn enforce(&self, subject: &str, resource: &str, action: &str) -> bool;

    /// Returns `true` when an explicit deny rule matches the request
    fn is_denied(&self, subject: &str, resource: &str, action: &str) -> bool;

    /// Decision for a subject that additionally holds `role` for this request.
    ///
    /// Either identity may supply the allow; a deny matching either one wins.
    fn authorize(&self, subject: &str, role: Option<&str>, resource: &str, action: &str) -> bool {
        let allowed = self.enforce(subject, resource, action)
            || role.is_some_and(|role| self.enforce(role, resource, action));
        allowed
            && !self.is_denied(subject, resource, action)
            && !role.is_some_and(|role| self.is_denied(role, resource, action))
    }
}

/// The casbin enforcers for one loaded policy version
struct Decision {
    /// Enforces the model as written
    model: CasbinEnforcer,
    /// Same rules with the effect replaced by [`NO_DENY_EFFECT`]
    deny: CasbinEnforcer,
}

impl Decision {
    async fn load(source: &dyn PolicySource) -> Result<Self, LoadError> {
        let text = source.model_text().await?;
        let model = source.enforcer(DefaultModel::from_str(&text).await?).await?;

        let mut deny_model = DefaultModel::from_str(&text).await?;
        deny_model.add_def("e", "e", NO_DENY_EFFECT);
        let deny = source.enforcer(deny_model).await?;

        // Evaluating once walks every rule, so arity mismatches and matchers that
        // do not take (sub, obj, act) requests are caught here instead of per request
        model.enforce(("", "", ""))?;
        deny.enforce(("", "", ""))?;

        Ok(Self { model, deny })
    }

    fn stats(&self) -> RuleStats {
        RuleStats {
            rules: self.model.get_policy().len(),
            bindings: self.model.get_grouping_policy().len(),
        }
    }
}

/// Casbin-backed enforcer reading from a [`PolicySource`]
///
/// Reads take a snapshot of the current decision; a reload builds complete new
/// enforcers before swapping the pointer, so an `enforce` call never sees a
/// partially loaded policy.
pub struct Enforcer {
    source: Box<dyn PolicySource>,
    current: RwLock<Arc<Decision>>,
}

impl fmt::Debug for Enforcer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Enforcer")
            .field("source", &self.source)
            .field("stats", &self.snapshot().stats())
            .finish()
    }
}

impl Enforcer {
    /// Creates an enforcer and performs the initial load; fails if the source is unusable
    pub async fn new(source: impl PolicySource + 'static) -> Result<Self, LoadError> {
        let decision = Decision::load(&source).await?;
        let enforcer = Self {
            source: Box::new(source),
            current: RwLock::new(Arc::new(decision)),
        };
        let stats = enforcer.snapshot().stats();
        info!(
            "Loaded {} policy rules and {} role bindings from {:?}",
            stats.rules, stats.bindings, enforcer.source
        );
        Ok(enforcer)
    }

    /// Creates an enforcer reading the model and rules from files
    pub async fn from_files(
        model_path: impl Into<PathBuf>,
        policy_path: impl Into<PathBuf>,
    ) -> Result<Self, LoadError> {
        Self::new(FileSource::new(model_path, policy_path)).await
    }

    fn snapshot(&self) -> Arc<Decision> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl PolicyEnforcer for Enforcer {
    async fn load_rules(&self) -> Result<RuleStats, LoadError> {
        let decision = Arc::new(Decision::load(self.source.as_ref()).await?);
        let stats = decision.stats();

        *self.current.write().unwrap_or_else(PoisonError::into_inner) = decision;

        info!(
            "Loaded {} policy rules and {} role bindings from {:?}",
            stats.rules, stats.bindings, self.source
        );
        Ok(stats)
    }

    fn enforce(&self, subject: &str, resource: &str, action: &str) -> bool {
        match self.snapshot().model.enforce((subject, resource, action)) {
            Ok(allowed) => allowed,
            Err(e) => {
                error!("Policy evaluation failed for '{subject}' on {resource}/{action}: {e}");
                false
            }
        }
    }

    fn is_denied(&self, subject: &str, resource: &str, action: &str) -> bool {
        match self.snapshot().deny.enforce((subject, resource, action)) {
            Ok(admitted) => !admitted,
            Err(e) => {
                error!("Policy evaluation failed for '{subject}' on {resource}/{action}: {e}");
                true
            }
        }
    }
}
