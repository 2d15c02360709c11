use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Compress, web, App, HttpServer};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{info, warn, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use ryugaku::cache::FileCacheStore;
use ryugaku::config::AppConfig;
use ryugaku::events::ContentEvents;
use ryugaku::gateway::postgrest::PostgrestGateway;
use ryugaku::openapi::ApiDoc;
use ryugaku::routes::{config, AppState};
use ryugaku::sync::Synchronizer;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env automatically only in debug builds; deployments set the environment themselves.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Bootstrapping ryugaku data service");

    let cfg = AppConfig::from_env();
    info!("Remote store configured: {}", cfg.remote.is_available());
    info!("Local cache: {}", cfg.cache_path().display());
    info!("Frontend URL: {}", cfg.frontend_url);
    if !cfg.jwt_configured {
        warn!("SUPABASE_JWT_SECRET not set; bearer tokens will be rejected and callers treated as anonymous");
    }

    let cache = Arc::new(FileCacheStore::open(cfg.cache_path(), cfg.cache_quota_bytes));
    let gateway = Arc::new(PostgrestGateway::new(cfg.remote.clone()));
    let sync = Arc::new(Synchronizer::new(gateway, cache, ContentEvents::default()));

    let metrics = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Prometheus recorder not installed: {e}");
            None
        }
    };
    let state = AppState { sync, metrics };

    let openapi = ApiDoc::openapi();
    info!("OpenAPI spec generated");

    let frontend_url = cfg.frontend_url.clone();
    let server = HttpServer::new(move || {
        let cors = Cors::default()
            // local Next.js dev server
            .allowed_origin("http://localhost:3000")
            .allowed_origin("http://127.0.0.1:3000")
            .allowed_origin(&frontend_url)
            .allow_any_header()
            .allowed_methods(["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(cors)
            .app_data(web::Data::new(state.clone()))
            .configure(config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind(cfg.bind_addr.as_str())?;

    info!("Listening on http://{}", cfg.bind_addr);

    server.run().await?;
    Ok(())
}
