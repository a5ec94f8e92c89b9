use crate::routes::{Access, RouteEntry, RouteGroup};
use http::Method;
use utoipa::openapi::path::{HttpMethod, OperationBuilder, ParameterBuilder, ParameterIn};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityRequirement, SecurityScheme};
use utoipa::openapi::{OpenApi as OpenApiDocument, Required, ResponseBuilder};
use utoipa::{Modify, OpenApi};

pub(crate) const HEALTH_TAG: &str = "Health API";
pub(crate) const AUTH_TAG: &str = "Authentication API";
pub(crate) const TOPOLOGY_TAG: &str = "Topology API";
pub(crate) const THREAT_TAG: &str = "Threat Graph API";
pub(crate) const INGEST_TAG: &str = "Ingestion API";
pub(crate) const SCANS_TAG: &str = "Scans API";
pub(crate) const SESSION_TAG: &str = "Session API";
pub(crate) const USER_TAG: &str = "User API";
pub(crate) const USERS_TAG: &str = "User Management API";

pub(crate) const BEARER_SCHEME: &str = "bearer_token";

#[derive(OpenApi)]
#[openapi(
    modifiers(&BearerSecurity),
    tags(
        (name = HEALTH_TAG, description = "Liveness endpoints"),
        (name = AUTH_TAG, description = "Registration, login and API token exchange"),
        (name = TOPOLOGY_TAG, description = "Agent report ingestion and topology queries"),
        (name = THREAT_TAG, description = "Threat graph queries"),
        (name = INGEST_TAG, description = "Scan report ingestion"),
        (name = SCANS_TAG, description = "Scan triggers"),
        (name = SESSION_TAG, description = "Session management"),
        (name = USER_TAG, description = "The calling user"),
        (name = USERS_TAG, description = "Management of other users"),
    ),
    info(
        title = "Deepfence Console API",
        description = "Authorization-gated API of the Deepfence console",
        version = "2.0.0"
    )
)]
pub(crate) struct ApiDoc;

struct BearerSecurity;

impl Modify for BearerSecurity {
    fn modify(&self, openapi: &mut OpenApiDocument) {
        openapi
            .components
            .get_or_insert_with(Default::default)
            .add_security_scheme(
                BEARER_SCHEME,
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
    }
}

/// Told about every route group as the router registers it
pub(crate) trait RouteObserver {
    fn group_registered(&mut self, group: &RouteGroup);
}

/// Accumulates the OpenAPI document describing the registered routes
pub(crate) struct ApiDocs {
    document: OpenApiDocument,
}

impl ApiDocs {
    pub fn new() -> Self {
        Self {
            document: ApiDoc::openapi(),
        }
    }

    pub fn into_document(self) -> OpenApiDocument {
        self.document
    }
}

impl RouteObserver for ApiDocs {
    fn group_registered(&mut self, group: &RouteGroup) {
        for entry in &group.entries {
            let Some(method) = http_method(&entry.method) else {
                continue;
            };
            self.document
                .paths
                .add_path_operation(&entry.path, vec![method], describe(group.tag, entry));
        }
    }
}

fn http_method(method: &Method) -> Option<HttpMethod> {
    match *method {
        Method::GET => Some(HttpMethod::Get),
        Method::POST => Some(HttpMethod::Post),
        Method::PUT => Some(HttpMethod::Put),
        Method::DELETE => Some(HttpMethod::Delete),
        Method::PATCH => Some(HttpMethod::Patch),
        _ => None,
    }
}

fn describe(tag: &str, entry: &RouteEntry) -> utoipa::openapi::path::Operation {
    let mut operation = OperationBuilder::new()
        .operation_id(Some(entry.operation.id()))
        .tags(Some(vec![tag.to_string()]))
        .response(
            "200",
            ResponseBuilder::new().description("Operation completed").build(),
        );

    for name in path_parameters(&entry.path) {
        operation = operation.parameter(
            ParameterBuilder::new()
                .name(name)
                .parameter_in(ParameterIn::Path)
                .required(Required::True)
                .build(),
        );
    }

    match entry.access {
        Access::Public => {}
        Access::Authenticated => {
            operation = protect(operation);
        }
        Access::Permission(permission) => {
            operation = protect(operation)
                .description(Some(format!(
                    "Requires `{}` permission on `{}`",
                    permission.action, permission.resource
                )))
                .response(
                    "403",
                    ResponseBuilder::new().description("Permission denied").build(),
                );
        }
    }

    operation.build()
}

fn protect(operation: OperationBuilder) -> OperationBuilder {
    operation
        .securities(Some(vec![SecurityRequirement::new(
            BEARER_SCHEME,
            Vec::<String>::new(),
        )]))
        .response(
            "401",
            ResponseBuilder::new()
                .description("Missing, malformed or expired access token")
                .build(),
        )
}

fn path_parameters(path: &str) -> impl Iterator<Item = &str> {
    path.split('/')
        .filter_map(|segment| segment.strip_prefix('{')?.strip_suffix('}'))
}
