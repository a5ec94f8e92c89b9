use confique::Config;

/// Location of the authorization model and rule list
#[derive(Debug, Config, Clone)]
pub struct PolicyConfig {
    /// Authorization model file (default: auth/model.conf)
    #[config(env = "DEEPFENCE_POLICY_MODEL_PATH", default = "auth/model.conf")]
    pub model_path: String,

    /// Policy rule file (default: auth/policy.csv)
    #[config(env = "DEEPFENCE_POLICY_RULES_PATH", default = "auth/policy.csv")]
    pub rules_path: String,
}
