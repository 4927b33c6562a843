pub mod handlers;

use actix_web::web;

/// Register the HTTP routes. The run endpoint is optional.
pub fn configure_routes(cfg: &mut web::ServiceConfig, enable_controller: bool) {
    cfg.service(web::scope("/api/v1").route("/health", web::get().to(handlers::health_check)));

    if enable_controller {
        cfg.route("/k6/run", web::post().to(handlers::run_k6_test));
    }
}
