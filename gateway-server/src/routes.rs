//! Declarative table of every endpoint the gateway exposes.
//!
//! Each [`RouteEntry`] names its method, full path, access class and the
//! operation it dispatches to. The router is built from this table alone, so
//! what is protected can be read off the table rather than audited across
//! registration call sites.

use crate::openapi::{
    AUTH_TAG, HEALTH_TAG, INGEST_TAG, SCANS_TAG, SESSION_TAG, THREAT_TAG, TOPOLOGY_TAG,
    USERS_TAG, USER_TAG,
};
use http::Method;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Common prefix of every route
pub const API_PREFIX: &str = "/deepfence";

/// What the gateway has to establish before a route's handler runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Authenticated,
    Permission(Permission),
}

impl Access {
    pub fn is_protected(&self) -> bool {
        !matches!(self, Access::Public)
    }
}

/// (resource, action) pair checked against the policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permission {
    pub resource: &'static str,
    pub action: &'static str,
}

/// Handler operations reachable through the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Ping,
    AsyncPing,
    RegisterUser,
    ApiToken,
    Login,
    OpenApiDocs,
    IngestAgentReport,
    TopologyGraph,
    ThreatGraph,
    IngestCves,
    IngestSecrets,
    IngestCompliance,
    IngestCloudCompliance,
    IngestCloudResources,
    StartCveScan,
    StartSecretScan,
    StartComplianceScan,
    Logout,
    GetCurrentUser,
    UpdateCurrentUser,
    DeleteCurrentUser,
    GetUser,
    UpdateUser,
    DeleteUser,
}

impl Operation {
    /// Stable identifier, used as the OpenAPI operation id
    pub fn id(&self) -> &'static str {
        match self {
            Operation::Ping => "ping",
            Operation::AsyncPing => "async_ping",
            Operation::RegisterUser => "register_user",
            Operation::ApiToken => "api_token",
            Operation::Login => "login",
            Operation::OpenApiDocs => "openapi_docs",
            Operation::IngestAgentReport => "ingest_agent_report",
            Operation::TopologyGraph => "get_topology_graph",
            Operation::ThreatGraph => "get_threat_graph",
            Operation::IngestCves => "ingest_cves_report",
            Operation::IngestSecrets => "ingest_secrets_report",
            Operation::IngestCompliance => "ingest_compliance_report",
            Operation::IngestCloudCompliance => "ingest_cloud_compliance_report",
            Operation::IngestCloudResources => "ingest_cloud_resources_report",
            Operation::StartCveScan => "start_cve_scan",
            Operation::StartSecretScan => "start_secret_scan",
            Operation::StartComplianceScan => "start_compliance_scan",
            Operation::Logout => "logout",
            Operation::GetCurrentUser => "get_current_user",
            Operation::UpdateCurrentUser => "update_current_user",
            Operation::DeleteCurrentUser => "delete_current_user",
            Operation::GetUser => "get_user",
            Operation::UpdateUser => "update_user",
            Operation::DeleteUser => "delete_user",
        }
    }

    /// Operations whose successful outcome is a freshly issued access token
    pub fn mints_token(&self) -> bool {
        matches!(
            self,
            Operation::RegisterUser | Operation::ApiToken | Operation::Login
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub method: Method,
    /// Full path pattern, `{name}` marks a path parameter
    pub path: String,
    pub access: Access,
    pub operation: Operation,
}

/// Routes sharing a path prefix and a documentation tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteGroup {
    pub tag: &'static str,
    pub prefix: String,
    pub entries: Vec<RouteEntry>,
}

impl RouteGroup {
    pub fn new(tag: &'static str, prefix: impl Into<String>) -> Self {
        Self {
            tag,
            prefix: prefix.into(),
            entries: Vec::new(),
        }
    }

    pub fn route(mut self, method: Method, path: &str, access: Access, operation: Operation) -> Self {
        self.entries.push(RouteEntry {
            method,
            path: format!("{}{}", self.prefix, path),
            access,
            operation,
        });
        self
    }

    pub fn public(self, method: Method, path: &str, operation: Operation) -> Self {
        self.route(method, path, Access::Public, operation)
    }

    pub fn authenticated(self, method: Method, path: &str, operation: Operation) -> Self {
        self.route(method, path, Access::Authenticated, operation)
    }

    pub fn permission(
        self,
        method: Method,
        path: &str,
        resource: &'static str,
        action: &'static str,
        operation: Operation,
    ) -> Self {
        self.route(
            method,
            path,
            Access::Permission(Permission { resource, action }),
            operation,
        )
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteTableError {
    #[error("{method} {path} is declared more than once")]
    Duplicate { method: Method, path: String },

    #[error("{path} mixes public and protected methods")]
    MixedAccess { path: String },

    #[error("{path} is outside of {prefix}", prefix = API_PREFIX)]
    OutsidePrefix { path: String },

    #[error("{method} {path} uses an unsupported method")]
    UnsupportedMethod { method: Method, path: String },
}

/// Validated, immutable set of route groups
#[derive(Debug, Clone)]
pub struct RouteTable {
    groups: Vec<RouteGroup>,
    index: HashMap<(Method, String), RouteEntry>,
}

impl RouteTable {
    pub fn new(groups: Vec<RouteGroup>) -> Result<Self, RouteTableError> {
        let supported = [Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::PATCH];
        let mut index = HashMap::new();
        let mut public_paths = HashSet::new();
        let mut protected_paths = HashSet::new();

        for entry in groups.iter().flat_map(|group| group.entries.iter()) {
            if !entry.path.starts_with(API_PREFIX) {
                return Err(RouteTableError::OutsidePrefix {
                    path: entry.path.clone(),
                });
            }
            if !supported.contains(&entry.method) {
                return Err(RouteTableError::UnsupportedMethod {
                    method: entry.method.clone(),
                    path: entry.path.clone(),
                });
            }

            let key = (entry.method.clone(), entry.path.clone());
            if index.insert(key, entry.clone()).is_some() {
                return Err(RouteTableError::Duplicate {
                    method: entry.method.clone(),
                    path: entry.path.clone(),
                });
            }

            let (same, other) = if entry.access.is_protected() {
                (&mut protected_paths, &public_paths)
            } else {
                (&mut public_paths, &protected_paths)
            };
            if other.contains(&entry.path) {
                return Err(RouteTableError::MixedAccess {
                    path: entry.path.clone(),
                });
            }
            same.insert(entry.path.clone());
        }

        Ok(Self { groups, index })
    }

    /// The console API surface
    pub fn deepfence(serve_openapi_docs: bool) -> Result<Self, RouteTableError> {
        let mut auth = RouteGroup::new(AUTH_TAG, API_PREFIX)
            .public(Method::POST, "/user/register", Operation::RegisterUser)
            .public(Method::POST, "/auth/token", Operation::ApiToken)
            .public(Method::POST, "/user/login", Operation::Login);
        if serve_openapi_docs {
            auth = auth.public(Method::GET, "/openapi-docs", Operation::OpenApiDocs);
        }

        Self::new(vec![
            RouteGroup::new(HEALTH_TAG, API_PREFIX)
                .public(Method::GET, "/ping", Operation::Ping)
                .public(Method::GET, "/async_ping", Operation::AsyncPing),
            auth,
            RouteGroup::new(TOPOLOGY_TAG, format!("{API_PREFIX}/topology"))
                .public(Method::POST, "/report", Operation::IngestAgentReport)
                .public(Method::POST, "/graph", Operation::TopologyGraph),
            RouteGroup::new(THREAT_TAG, format!("{API_PREFIX}/threat"))
                .public(Method::POST, "/graph", Operation::ThreatGraph),
            RouteGroup::new(INGEST_TAG, format!("{API_PREFIX}/ingest"))
                .public(Method::POST, "/cves", Operation::IngestCves)
                .public(Method::POST, "/secrets", Operation::IngestSecrets)
                .public(Method::POST, "/compliance", Operation::IngestCompliance)
                .public(Method::POST, "/cloud-compliance", Operation::IngestCloudCompliance)
                .public(Method::POST, "/cloud-resources", Operation::IngestCloudResources),
            RouteGroup::new(SCANS_TAG, format!("{API_PREFIX}/scan/start"))
                .public(Method::GET, "/cves", Operation::StartCveScan)
                .public(Method::GET, "/secrets", Operation::StartSecretScan)
                .public(Method::GET, "/compliances", Operation::StartComplianceScan),
            RouteGroup::new(SESSION_TAG, API_PREFIX)
                .authenticated(Method::POST, "/user/logout", Operation::Logout),
            RouteGroup::new(USER_TAG, format!("{API_PREFIX}/user"))
                .permission(Method::GET, "", "user", "read", Operation::GetCurrentUser)
                .permission(Method::PUT, "", "user", "write", Operation::UpdateCurrentUser)
                .permission(Method::DELETE, "", "user", "delete", Operation::DeleteCurrentUser),
            RouteGroup::new(USERS_TAG, format!("{API_PREFIX}/users/{{userId}}"))
                .permission(Method::GET, "", "all-users", "read", Operation::GetUser)
                .permission(Method::PUT, "", "all-users", "write", Operation::UpdateUser)
                .permission(Method::DELETE, "", "all-users", "delete", Operation::DeleteUser),
        ])
    }

    pub fn groups(&self) -> &[RouteGroup] {
        &self.groups
    }

    pub fn entries(&self) -> impl Iterator<Item = &RouteEntry> {
        self.groups.iter().flat_map(|group| group.entries.iter())
    }

    /// Looks up a route by method and path pattern
    pub fn find(&self, method: &Method, path: &str) -> Option<&RouteEntry> {
        self.index.get(&(method.clone(), path.to_string()))
    }
}
