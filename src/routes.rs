use crate::{api::payroll, auth::middleware::auth_middleware, config::Config};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};

fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let per_ms = if requests_per_min == 0 {
        1
    } else {
        (60_000 / requests_per_min as u64).max(1)
    };
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(requests_per_min.max(1))
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .expect("non-zero rate limiter settings");
    Governor::new(&cfg)
}

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(build_limiter(config.rate_protected_per_min)) // rate limiting
            .configure(payroll_routes),
    );
}

pub fn payroll_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/payroll")
            .app_data(payroll::json_config())
            .app_data(payroll::query_config())
            .app_data(payroll::path_config())
            // /payroll
            .service(
                web::resource("")
                    .route(web::post().to(payroll::create_payroll))
                    .route(web::get().to(payroll::list_payrolls)),
            )
            // /payroll/stats (before /{id})
            .service(web::resource("/stats").route(web::get().to(payroll::payroll_stats)))
            // /payroll/{id}
            .service(
                web::resource("/{id}")
                    .route(web::get().to(payroll::get_payroll))
                    .route(web::delete().to(payroll::delete_payroll)),
            )
            .service(web::resource("/{id}/generate").route(web::post().to(payroll::generate_items)))
            .service(
                web::resource("/{id}/finalize").route(web::post().to(payroll::finalize_payroll)),
            )
            .service(web::resource("/{id}/pay").route(web::post().to(payroll::mark_paid))),
    );
}

// API REQUEST
//  └─ Authorization: Bearer access_token
//       └─ auth_middleware -> AuthUser in request extensions
//            └─ handler checks role (HR/Admin, Admin for pay + delete)
