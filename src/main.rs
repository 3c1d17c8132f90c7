#[macro_use]
extern crate rocket;

mod config;
mod db;
mod guards;
mod models;
mod routes;
mod services;
mod store;
mod utils;

#[cfg(test)]
mod tests;

use dotenvy::dotenv;
use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::Header;
use rocket::{Build, Request, Response, Rocket};
use rocket_okapi::openapi_get_routes;
use rocket_okapi::swagger_ui::{SwaggerUIConfig, make_swagger_ui};

/* ----------------------------- CORS ----------------------------- */

pub struct CORS;

#[rocket::async_trait]
impl Fairing for CORS {
    fn info(&self) -> Info {
        Info {
            name: "CORS",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        if let Some(origin) = request.headers().get_one("Origin") {
            response.set_header(Header::new("Access-Control-Allow-Origin", origin));
        }

        response.set_header(Header::new(
            "Access-Control-Allow-Methods",
            "GET, POST, PUT, DELETE, OPTIONS",
        ));

        response.set_header(Header::new(
            "Access-Control-Allow-Headers",
            "Content-Type, Authorization, X-Webhook-Signature",
        ));

        response.set_header(Header::new("Access-Control-Allow-Credentials", "true"));
    }
}

/* ----------------------------- OPTIONS ----------------------------- */

#[options("/<_..>")]
fn options_handler() {}

/* ----------------------------- ERRORS ----------------------------- */

fn error_body(message: &str) -> rocket::serde::json::Value {
    rocket::serde::json::json!({
        "success": false,
        "message": message
    })
}

#[catch(400)]
fn bad_request() -> rocket::serde::json::Value {
    error_body("Malformed request")
}

#[catch(401)]
fn unauthorized() -> rocket::serde::json::Value {
    error_body("Authentication required")
}

#[catch(403)]
fn forbidden() -> rocket::serde::json::Value {
    error_body("Forbidden")
}

#[catch(404)]
fn not_found() -> rocket::serde::json::Value {
    error_body("Resource not found (check /api/v1 prefix)")
}

#[catch(422)]
fn unprocessable() -> rocket::serde::json::Value {
    error_body("Request body could not be parsed")
}

#[catch(500)]
fn internal_error() -> rocket::serde::json::Value {
    error_body("Internal server error")
}

/* ----------------------------- SWAGGER ----------------------------- */

fn swagger_config() -> SwaggerUIConfig {
    SwaggerUIConfig {
        url: "/api/v1/openapi.json".to_string(),
        ..Default::default()
    }
}

/* ----------------------------- ROUTES ----------------------------- */

/// Routes, docs and catchers; storage and gateway are attached by the caller.
fn assemble(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket
        .attach(CORS)
        .mount("/", routes![options_handler])
        .mount(
            "/api/v1",
            openapi_get_routes![
                // Auth
                routes::auth::register,
                routes::auth::login,
                routes::auth::refresh_token,
                routes::auth::me,
                // Destinations
                routes::destination::create_destination,
                routes::destination::list_destinations,
                routes::destination::get_destination,
                // Packages
                routes::package::create_package,
                routes::package::list_packages,
                routes::package::get_package,
                routes::package::update_package,
                routes::package::delete_package,
                // Bookings
                routes::booking::create_booking,
                routes::booking::my_bookings,
                routes::booking::get_booking,
                routes::booking::update_booking,
                routes::booking::cancel_booking,
                // Payments
                routes::payment::create_payment,
                routes::payment::my_payments,
                routes::payment::booking_payments,
                routes::payment::payment_webhook,
                // Reviews
                routes::review::review_package,
                routes::review::review_destination,
                routes::review::package_reviews,
                routes::review::destination_reviews,
                routes::review::mark_helpful,
                routes::review::delete_review,
                // Admin
                routes::admin::all_bookings,
                routes::admin::refund_booking,
                routes::admin::all_payments,
            ],
        )
        .mount("/api/docs", make_swagger_ui(&swagger_config()))
        .register(
            "/",
            catchers![
                bad_request,
                unauthorized,
                forbidden,
                not_found,
                unprocessable,
                internal_error
            ],
        )
}

/* ----------------------------- LAUNCH ----------------------------- */

#[launch]
fn rocket() -> Rocket<Build> {
    dotenv().ok();
    env_logger::init();

    log::info!("🚀 Travel booking API running");
    log::info!("📚 Swagger UI → http://localhost:8000/api/docs");

    assemble(
        rocket::custom(config::Config::figment())
            .attach(config::check_secrets())
            .attach(db::init())
            .attach(services::gateway::init()),
    )
}
