use crate::error::LoadError;
use async_trait::async_trait;
use casbin::{CoreApi, DefaultModel, Enforcer as CasbinEnforcer, FileAdapter, MemoryAdapter, MgmtApi};
use std::fmt;
use std::path::{Path, PathBuf};

/// Somewhere an authorization model and its rules can be loaded from
#[async_trait]
pub trait PolicySource: fmt::Debug + Send + Sync {
    /// Raw text of the model configuration
    async fn model_text(&self) -> Result<String, LoadError>;

    /// Builds an enforcer over this source's rules using `model`
    async fn enforcer(&self, model: DefaultModel) -> Result<CasbinEnforcer, LoadError>;
}

/// Model and rules stored as two files on disk
#[derive(Debug, Clone)]
pub struct FileSource {
    model_path: PathBuf,
    policy_path: PathBuf,
}

impl FileSource {
    pub fn new(model_path: impl Into<PathBuf>, policy_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            policy_path: policy_path.into(),
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> LoadError + '_ {
    move |source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[async_trait]
impl PolicySource for FileSource {
    async fn model_text(&self) -> Result<String, LoadError> {
        std::fs::read_to_string(&self.model_path).map_err(io_error(&self.model_path))
    }

    async fn enforcer(&self, model: DefaultModel) -> Result<CasbinEnforcer, LoadError> {
        // The file adapter reports a missing file as a generic adapter error
        std::fs::metadata(&self.policy_path).map_err(io_error(&self.policy_path))?;
        let adapter = FileAdapter::new(self.policy_path.clone());
        Ok(CasbinEnforcer::new(model, adapter).await?)
    }
}

/// Model and rules held in memory, rules in the same CSV form as a policy file
#[derive(Clone)]
pub struct StaticSource {
    model: String,
    policy: String,
}

impl fmt::Debug for StaticSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticSource")
            .field("model_bytes", &self.model.len())
            .field("policy_bytes", &self.policy.len())
            .finish()
    }
}

impl StaticSource {
    pub fn new(model: impl Into<String>, policy: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            policy: policy.into(),
        }
    }
}

#[async_trait]
impl PolicySource for StaticSource {
    async fn model_text(&self) -> Result<String, LoadError> {
        Ok(self.model.clone())
    }

    async fn enforcer(&self, model: DefaultModel) -> Result<CasbinEnforcer, LoadError> {
        let mut enforcer = CasbinEnforcer::new(model, MemoryAdapter::default()).await?;

        for (index, line) in self.policy.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut fields = line.split(',').map(|field| field.trim().to_string());
            let ptype = fields.next().unwrap_or_default();
            let rule: Vec<String> = fields.collect();

            if ptype.starts_with('p') {
                enforcer.add_named_policy(&ptype, rule).await?;
            } else if ptype.starts_with('g') {
                enforcer.add_named_grouping_policy(&ptype, rule).await?;
            } else {
                return Err(LoadError::InvalidRule {
                    line: index + 1,
                    message: format!("unknown rule type '{ptype}'"),
                });
            }
        }

        Ok(enforcer)
    }
}
