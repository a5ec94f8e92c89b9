/// Process-wide deployment flavour, resolved once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeploymentMode {
    saas: bool,
}

impl DeploymentMode {
    /// `"true"` in any letter case selects the SaaS deployment; anything else, or nothing, does not
    pub fn resolve(value: Option<&str>) -> Self {
        Self {
            saas: value.is_some_and(|v| v.to_lowercase() == "true"),
        }
    }

    pub fn is_saas(&self) -> bool {
        self.saas
    }
}
