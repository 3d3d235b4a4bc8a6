use actix_web::{web, App, HttpServer};
use actix_cors::Cors;
use utoipa_swagger_ui::SwaggerUi;

use linkedout::auth::TokenService;
use linkedout::cache::FeedCache;
use linkedout::openapi::ApiDoc;
use linkedout::rate_limit::{CredentialThrottle, InMemoryRateLimiter};
#[cfg(feature = "inmem-store")]
use linkedout::repo::inmem::InMemRepo;
use linkedout::{configure_routes, AppState, Config};
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;
use tracing_actix_web::TracingLogger;

#[cfg(not(feature = "inmem-store"))]
compile_error!("the server binary needs a storage backend; enable the `inmem-store` feature");

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env automatically only in debug builds; elsewhere the environment is set externally.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Invalid configuration: {e:#}");
            eprintln!("Please copy .env.example to .env and configure it");
            std::process::exit(1);
        }
    };

    info!("Bootstrapping LinkedOut API");
    info!("Frontend URL: {}", cfg.frontend_url);
    info!("Follow target must exist: {}", cfg.follow_policy.require_existing_target);

    let repo = match &cfg.data_dir {
        Some(dir) => {
            info!("Using in-memory repository with snapshots in '{}'", dir.display());
            InMemRepo::with_snapshot(dir)
        }
        None => {
            warn!("LINKEDOUT_DATA_DIR not set; state is lost on restart");
            InMemRepo::new()
        }
    };

    let mut state = AppState::new(
        Arc::new(repo),
        build_feed_cache(&cfg).await,
        TokenService::new(&cfg.jwt_secret, cfg.token_ttl),
    )
    .with_follow_policy(cfg.follow_policy);
    if cfg.rate_limit_enabled {
        state = state.with_throttle(CredentialThrottle::new(
            InMemoryRateLimiter::new(true),
            cfg.rate_limits.clone(),
        ));
    }

    let openapi = ApiDoc::openapi();
    info!("OpenAPI spec generated");

    let frontend_url = cfg.frontend_url.clone();
    let server = HttpServer::new(move || {
        let cors = Cors::default()
            // during local dev allow the Expo / web client ports
            .allowed_origin("http://localhost:5173")
            .allowed_origin("http://localhost:8081")
            .allowed_origin(&frontend_url)
            .allow_any_header()
            .allowed_methods(["GET", "POST", "OPTIONS"])
            .max_age(3600);

        App::new()
            .wrap(TracingLogger::default())
            .wrap(cors)
            .app_data(web::Data::new(state.clone()))
            .configure(configure_routes)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind(cfg.bind_addr.as_str())?;

    info!("Listening on http://{}", cfg.bind_addr);

    server.run().await
}

/// Redis when configured and compiled in, otherwise process-local.
async fn build_feed_cache(cfg: &Config) -> FeedCache {
    #[cfg(feature = "redis-cache")]
    {
        if let Some(url) = &cfg.redis_url {
            match linkedout::cache::redis_store::RedisCacheStore::connect(url).await {
                Ok(store) => {
                    info!("Feed cache backed by Redis");
                    return FeedCache::new(Arc::new(store));
                }
                Err(e) => warn!("Redis unavailable ({e:#}); falling back to in-memory feed cache"),
            }
        }
    }
    #[cfg(not(feature = "redis-cache"))]
    {
        if cfg.redis_url.is_some() {
            warn!("REDIS_URL is set but this build lacks the `redis-cache` feature");
        }
    }
    info!("Using in-memory feed cache");
    FeedCache::in_memory()
}
