#[macro_use]
extern crate rocket;

mod api;
mod auth;
mod db;
mod env;
mod error;
mod models;
mod telemetry;
#[cfg(test)]
mod test;
mod uploads;
mod validation;

use api::{
    api_add_task, api_application_history, api_apply_to_opportunity, api_calendar,
    api_create_link, api_create_opportunity, api_delete_link, api_delete_material,
    api_delete_opportunity, api_edit_link, api_edit_material, api_list_links,
    api_list_materials, api_list_opportunities, api_list_tasks, api_login, api_logout, api_me,
    api_register, api_update_opportunity, api_update_profile, api_update_task_status,
    api_upload_material, api_view_opportunity, health,
};
use auth::{forbidden, unauthorized};
use db::clean_expired_sessions;
use rocket::{Build, Rocket, tokio};
use telemetry::TelemetryFairing;
use telemetry::init_tracing;
use uploads::UploadConfig;

use sqlx::SqlitePool;
use sqlx::sqlite::SqliteConnectOptions;
use std::str::FromStr;
use tracing::{error, info};

#[launch]
async fn rocket() -> _ {
    if let Err(e) = env::load_environment() {
        eprintln!("Failed to load environment files: {}", e);
    }

    init_tracing();

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://opportunity_tracker.db".to_string());

    let options = SqliteConnectOptions::from_str(&database_url)
        .expect("Invalid DATABASE_URL")
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePool::connect_with(options)
        .await
        .expect("Failed to connect to SQLite database");

    let pool_clone = pool.clone();

    tokio::spawn(async move {
        tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;

        loop {
            match clean_expired_sessions(&pool_clone).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Cleaned up {} expired sessions", count);
                    }
                }
                Err(e) => {
                    error!("Failed to clean expired sessions: {}", e);
                }
            }

            tokio::time::sleep(tokio::time::Duration::from_secs(3600)).await;
        }
    });

    info!("Running database migrations...");
    match sqlx::migrate!("./migrations").run(&pool).await {
        Ok(_) => info!("Migrations completed successfully"),
        Err(e) => {
            error!("Failed to run migrations: {}", e);
            panic!("Database migration failed: {}", e);
        }
    }

    init_rocket(pool).await
}

pub async fn init_rocket(pool: SqlitePool) -> Rocket<Build> {
    info!("Starting opportunity tracker");

    rocket::build()
        .manage(pool)
        .manage(UploadConfig::from_env())
        .mount(
            "/api",
            routes![
                api_login,
                api_register,
                api_logout,
                api_me,
                api_update_profile,
                api_list_opportunities,
                api_create_opportunity,
                api_view_opportunity,
                api_update_opportunity,
                api_delete_opportunity,
                api_apply_to_opportunity,
                api_calendar,
                api_application_history,
                api_add_task,
                api_list_tasks,
                api_update_task_status,
                api_upload_material,
                api_list_materials,
                api_edit_material,
                api_delete_material,
                api_create_link,
                api_list_links,
                api_edit_link,
                api_delete_link,
            ],
        )
        .mount("/api", routes![health])
        .register("/", catchers![unauthorized, forbidden])
        .attach(TelemetryFairing)
}
