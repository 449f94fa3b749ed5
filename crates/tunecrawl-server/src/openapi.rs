use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "tunecrawl API",
        version = "0.3.0",
        description = "Control and monitoring surface of the song ingestion crawler."
    ),
    paths(
        crate::routes::start_crawl,
        crate::routes::stop_crawl,
        crate::routes::test_connection,
        crate::routes::progress,
        crate::routes::stats,
        crate::routes::duplicate_stats,
        crate::routes::crawler_config,
        crate::routes::health,
    ),
    components(schemas(
        crate::dto::StartCrawlRequest,
        crate::dto::StartCrawlResponse,
        crate::dto::StopCrawlResponse,
        crate::dto::JobResponse,
        crate::dto::ProgressResponse,
        crate::dto::StatsResponse,
        crate::dto::DuplicateStatsResponse,
        crate::dto::JobDuplicateResponse,
        crate::dto::ConfigResponse,
        crate::dto::ConnectionTestResponse,
        crate::dto::HealthResponse,
        crate::dto::ErrorResponse,
    )),
    tags(
        (name = "crawler", description = "Crawl job control and monitoring"),
        (name = "system", description = "Health and system status"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Adds Bearer token security scheme to the OpenAPI spec.
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::HttpBuilder::new()
                        .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                        .bearer_format("token")
                        .description(Some(
                            "Admin token. Set via TUNECRAWL_ADMIN_TOKEN environment variable.",
                        ))
                        .build(),
                ),
            );
        }
    }
}
