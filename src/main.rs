use std::sync::Arc;
use std::time::Duration;

use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use anyhow::Context;
use dotenvy::dotenv;

mod api;
mod auth;
mod config;
mod db;
mod docs;
mod model;
mod models;
mod payroll;
mod routes;

use config::Config;
use db::cache::CachedDepartmentDirectory;
use db::init_db;
use db::mysql::{MySqlDepartmentDirectory, MySqlEmployeeDirectory, MySqlPayrollStore};
use payroll::PayrollManager;
use payroll::store::FlatSalary;

use crate::docs::ApiDoc;
use tracing::info;
use tracing_appender::rolling;
use utoipa::OpenApi; // ← needed for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "HRM payroll service"
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!("Server starting...");

    let pool = init_db(&config.database_url, config.db_max_connections).await?;

    let departments = CachedDepartmentDirectory::new(
        Arc::new(MySqlDepartmentDirectory::new(pool.clone())),
        Duration::from_secs(config.department_cache_ttl_secs),
    );
    let manager = PayrollManager::new(
        Arc::new(MySqlPayrollStore::new(pool.clone())),
        Arc::new(MySqlEmployeeDirectory::new(pool)),
        Arc::new(departments),
        Arc::new(FlatSalary(config.payroll_default_gross)),
    );

    let server_addr = config.server_addr.clone();
    let manager = Data::new(manager);
    let config_data = Data::new(config.clone());

    info!(%server_addr, "Listening");

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // ← important: wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(manager.clone())
            .app_data(config_data.clone())
            .service(index)
            // Protected payroll routes with rate limiting
            .configure(|cfg| routes::configure(cfg, config.clone()))
    })
    .bind(&server_addr)
    .with_context(|| format!("Failed to bind {server_addr}"))?
    .run()
    .await?;

    Ok(())
}
