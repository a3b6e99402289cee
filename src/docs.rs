use utoipa::openapi::security::{
    ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme,
};
use utoipa::OpenApi;

use crate::{
    brief::{Brief, GeneratorFormData, Visibility},
    catalog::{Category, Keywords},
    clock::Countdown,
    provider::{ProxyReq, ProxyResp},
    server::{ErrorResponse, DEVICE_HEADER},
    types::{PaymentTier, Role, TokenStatus, User},
};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::server::health_check,
        crate::server::catalog_handler,
        crate::server::generate_proxy,
        crate::server::tokens,
        crate::server::me,
        crate::server::create_brief,
        crate::server::pregenerated_brief,
        crate::server::history,
        crate::server::brief,
        crate::server::export_brief,
    ),
    components(
        schemas(
            Brief,
            GeneratorFormData,
            Visibility,
            Category,
            Keywords,
            Countdown,
            TokenStatus,
            User,
            PaymentTier,
            Role,
            ProxyReq,
            ProxyResp,
            ErrorResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "briefsmith", description = "Practice design brief generation")
    ),
    info(
        title = "Briefsmith API",
        version = "1.0",
        description = "Generate, store and export practice project briefs, \
            paid for from a daily token allowance",
        license(
            name = "BSD-3-Clause"
        )
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "jwt",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
            components.add_security_scheme(
                "device",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(
                    DEVICE_HEADER,
                ))),
            );
        }
    }
}
