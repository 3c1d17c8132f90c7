use mongodb::bson::{oid::ObjectId, DateTime};
use rocket::http::{ContentType, Header, Status};
use rocket::local::asynchronous::{Client, LocalResponse};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::Config;
use crate::db::DbConn;
use crate::guards::webhook::SIGNATURE_HEADER;
use crate::models::{Role, User};
use crate::services::gateway::{sign_payload, SimulatedGateway};
use crate::services::{GatewayConn, JwtService};
use crate::store::MemoryStore;

async fn client() -> Client {
    let store: DbConn = Arc::new(MemoryStore::new());
    let gateway: GatewayConn = Arc::new(SimulatedGateway);
    let rocket = crate::assemble(rocket::build().manage(store).manage(gateway));
    Client::tracked(rocket).await.expect("valid rocket instance")
}

async fn user_token(client: &Client, role: Role, email: &str) -> String {
    let db = client.rocket().state::<DbConn>().unwrap();
    let now = DateTime::now();
    let user = User {
        id: None,
        name: email.split('@').next().unwrap_or("user").to_string(),
        email: email.to_string(),
        password_hash: String::new(),
        role,
        is_active: true,
        last_login_at: now,
        created_at: now,
        updated_at: now,
    };
    let id: ObjectId = db.insert_user(&user).await.unwrap();
    JwtService::generate_access_token(&id, &user).unwrap()
}

fn bearer(token: &str) -> Header<'static> {
    Header::new("Authorization", format!("Bearer {}", token))
}

async fn body(response: LocalResponse<'_>) -> Value {
    response.into_json::<Value>().await.unwrap_or(Value::Null)
}

async fn post(client: &Client, token: &str, uri: &str, payload: Value) -> (Status, Value) {
    let response = client
        .post(uri.to_string())
        .header(bearer(token))
        .json(&payload)
        .dispatch()
        .await;
    (response.status(), body(response).await)
}

async fn put(client: &Client, token: &str, uri: &str, payload: Value) -> (Status, Value) {
    let response = client
        .put(uri.to_string())
        .header(bearer(token))
        .json(&payload)
        .dispatch()
        .await;
    (response.status(), body(response).await)
}

async fn get(client: &Client, token: &str, uri: &str) -> (Status, Value) {
    let response = client.get(uri.to_string()).header(bearer(token)).dispatch().await;
    (response.status(), body(response).await)
}

/// Destination plus one package; returns the package id.
async fn seed_catalog(client: &Client, admin: &str, seats: i32, price: f64) -> String {
    let (status, destination) = post(
        client,
        admin,
        "/api/v1/destinations",
        json!({ "name": "Diani", "country": "Kenya" }),
    )
    .await;
    assert_eq!(status, Status::Ok);
    let destination_id = destination["data"]["id"].as_str().unwrap().to_string();

    let (status, package) = post(
        client,
        admin,
        "/api/v1/packages",
        json!({
            "name": "Diani Beach Week",
            "destination_id": destination_id,
            "price": price,
            "total_seats": seats,
        }),
    )
    .await;
    assert_eq!(status, Status::Ok);
    package["data"]["id"].as_str().unwrap().to_string()
}

fn booking(package_id: &str, travelers: i32) -> Value {
    let travel_date = (chrono::Utc::now().date_naive() + chrono::Duration::days(14))
        .format("%Y-%m-%d")
        .to_string();
    json!({
        "package_id": package_id,
        "number_of_travelers": travelers,
        "travel_date": travel_date,
        "customer_info": {
            "name": "Wanjiru Kamau",
            "email": "wanjiru@example.com",
            "phone": "0712345678",
            "emergency_contact": "Kamau 0722111222"
        }
    })
}

async fn available_seats(client: &Client, token: &str, package_id: &str) -> i64 {
    let (_, package) = get(client, token, &format!("/api/v1/packages/{}", package_id)).await;
    package["data"]["available_seats"].as_i64().unwrap()
}

#[rocket::async_test]
async fn ten_seat_package_scenario() {
    let client = client().await;
    let admin = user_token(&client, Role::Admin, "ops@example.com").await;
    let alice = user_token(&client, Role::User, "alice@example.com").await;
    let bob = user_token(&client, Role::User, "bob@example.com").await;
    let package_id = seed_catalog(&client, &admin, 10, 120.0).await;

    let (status, first) = post(&client, &alice, "/api/v1/bookings", booking(&package_id, 4)).await;
    assert_eq!(status, Status::Ok);
    assert_eq!(first["data"]["total_amount"], 480.0);
    assert_eq!(available_seats(&client, &alice, &package_id).await, 6);

    let (status, rejected) = post(&client, &bob, "/api/v1/bookings", booking(&package_id, 7)).await;
    assert_eq!(status, Status::Conflict);
    assert!(rejected["message"].as_str().unwrap().contains('6'));
    assert_eq!(available_seats(&client, &bob, &package_id).await, 6);

    let booking_id = first["data"]["id"].as_str().unwrap();
    let (status, cancelled) = put(
        &client,
        &alice,
        &format!("/api/v1/bookings/{}/cancel", booking_id),
        json!({ "reason": "Change of plans" }),
    )
    .await;
    assert_eq!(status, Status::Ok);
    assert_eq!(cancelled["data"]["booking"]["status"], "cancelled");
    assert_eq!(available_seats(&client, &alice, &package_id).await, 10);

    let (status, _) = post(&client, &bob, "/api/v1/bookings", booking(&package_id, 7)).await;
    assert_eq!(status, Status::Ok);
    assert_eq!(available_seats(&client, &bob, &package_id).await, 3);
}

#[rocket::async_test]
async fn validation_errors_name_the_field() {
    let client = client().await;
    let admin = user_token(&client, Role::Admin, "ops@example.com").await;
    let user = user_token(&client, Role::User, "user@example.com").await;
    let package_id = seed_catalog(&client, &admin, 5, 80.0).await;

    let mut request = booking(&package_id, 1);
    request["customer_info"]
        .as_object_mut()
        .unwrap()
        .remove("phone");
    let (status, response) = post(&client, &user, "/api/v1/bookings", request).await;
    assert_eq!(status, Status::BadRequest);
    assert_eq!(response["message"], "customer_info.phone is required");
    assert_eq!(available_seats(&client, &user, &package_id).await, 5);
}

#[rocket::async_test]
async fn auth_gate_protects_routes() {
    let client = client().await;
    let user = user_token(&client, Role::User, "user@example.com").await;

    let response = client.get("/api/v1/bookings/my").dispatch().await;
    assert_eq!(response.status(), Status::Unauthorized);

    let (status, _) = post(
        &client,
        &user,
        "/api/v1/destinations",
        json!({ "name": "Lamu", "country": "Kenya" }),
    )
    .await;
    assert_eq!(status, Status::Forbidden);

    let (status, body) = get(&client, &user, "/api/v1/admin/bookings").await;
    assert_eq!(status, Status::Forbidden);
    assert_eq!(body["message"], "Forbidden");
}

#[rocket::async_test]
async fn register_login_and_me() {
    let client = client().await;

    let response = client
        .post("/api/v1/auth/register")
        .header(ContentType::JSON)
        .body(json!({ "name": "Njeri", "email": "Njeri@Example.com", "password": "safari-2030" }).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);

    let response = client
        .post("/api/v1/auth/register")
        .header(ContentType::JSON)
        .body(json!({ "name": "Njeri", "email": "njeri@example.com", "password": "safari-2030" }).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Conflict);

    let response = client
        .post("/api/v1/auth/login")
        .header(ContentType::JSON)
        .body(json!({ "email": "njeri@example.com", "password": "wrong-password" }).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Unauthorized);

    let response = client
        .post("/api/v1/auth/login")
        .header(ContentType::JSON)
        .body(json!({ "email": "njeri@example.com", "password": "safari-2030" }).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let login = body(response).await;
    let token = login["data"]["access_token"].as_str().unwrap();

    let (status, me) = get(&client, token, "/api/v1/auth/me").await;
    assert_eq!(status, Status::Ok);
    assert_eq!(me["data"]["email"], "njeri@example.com");
    assert_eq!(me["data"]["role"], "user");
}

#[rocket::async_test]
async fn signed_webhook_confirms_mpesa_booking() {
    let client = client().await;
    let admin = user_token(&client, Role::Admin, "ops@example.com").await;
    let user = user_token(&client, Role::User, "user@example.com").await;
    let package_id = seed_catalog(&client, &admin, 5, 50.0).await;

    let (_, created) = post(&client, &user, "/api/v1/bookings", booking(&package_id, 2)).await;
    let booking_id = created["data"]["id"].as_str().unwrap().to_string();

    let (status, payment) = post(
        &client,
        &user,
        "/api/v1/payments",
        json!({ "booking_id": booking_id, "amount": 100.0, "method": "mpesa", "phone_number": "+254712345678" }),
    )
    .await;
    assert_eq!(status, Status::Ok);
    assert_eq!(payment["data"]["status"], "pending");
    let transaction_id = payment["data"]["transaction_id"].as_str().unwrap().to_string();

    let notification = json!({ "transactionId": transaction_id, "outcome": "success" }).to_string();

    let forged = client
        .post("/api/v1/payments/webhook")
        .header(Header::new(SIGNATURE_HEADER, "00ff"))
        .body(notification.clone())
        .dispatch()
        .await;
    assert_eq!(forged.status(), Status::Unauthorized);

    let signature = sign_payload(&Config::webhook_secret(), notification.as_bytes());
    for _ in 0..2 {
        let response = client
            .post("/api/v1/payments/webhook")
            .header(Header::new(SIGNATURE_HEADER, signature.clone()))
            .body(notification.clone())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(body(response).await["data"]["status"], "completed");
    }

    let (_, confirmed) = get(&client, &user, &format!("/api/v1/bookings/{}", booking_id)).await;
    assert_eq!(confirmed["data"]["status"], "confirmed");
    assert_eq!(confirmed["data"]["payment_status"], "paid");

    let (_, payments) = get(&client, &user, &format!("/api/v1/payments/booking/{}", booking_id)).await;
    assert_eq!(payments["data"]["pagination"]["total"], 1);
}

#[rocket::async_test]
async fn declined_card_then_admin_refund() {
    let client = client().await;
    let admin = user_token(&client, Role::Admin, "ops@example.com").await;
    let user = user_token(&client, Role::User, "user@example.com").await;
    let package_id = seed_catalog(&client, &admin, 5, 75.0).await;

    let (_, created) = post(&client, &user, "/api/v1/bookings", booking(&package_id, 1)).await;
    let booking_id = created["data"]["id"].as_str().unwrap().to_string();
    let card = |number: &str| {
        json!({
            "booking_id": booking_id,
            "amount": 75.0,
            "method": "card",
            "card": { "holder_name": "W Kamau", "number": number, "expiry": "09/31", "cvv": "321" }
        })
    };

    let (status, declined) = post(&client, &user, "/api/v1/payments", card("4000 0000 0000 0002")).await;
    assert_eq!(status, Status::Ok);
    assert_eq!(declined["data"]["status"], "failed");

    let (status, _) = post(&client, &user, "/api/v1/payments", card("4000 0000 0000 0119")).await;
    assert_eq!(status, Status::ServiceUnavailable);

    let (status, paid) = post(&client, &user, "/api/v1/payments", card("4242 4242 4242 4242")).await;
    assert_eq!(status, Status::Ok);
    assert_eq!(paid["data"]["status"], "completed");

    let (status, _) = post(&client, &user, "/api/v1/payments", card("4242 4242 4242 4242")).await;
    assert_eq!(status, Status::Conflict);

    let (status, refunded) = post(
        &client,
        &admin,
        &format!("/api/v1/admin/bookings/{}/refund", booking_id),
        json!({ "reason": "Operator cancelled departure" }),
    )
    .await;
    assert_eq!(status, Status::Ok);
    assert_eq!(refunded["data"]["booking"]["payment_status"], "refunded");
    assert_eq!(refunded["data"]["refund"]["amount"], 75.0);
    assert_eq!(refunded["data"]["package"]["available_seats"], 5);

    let (_, payments) = get(&client, &admin, "/api/v1/admin/payments?status=refunded").await;
    assert_eq!(payments["data"]["pagination"]["total"], 1);
}

#[rocket::async_test]
async fn reviews_aggregate_and_reject_duplicates() {
    let client = client().await;
    let admin = user_token(&client, Role::Admin, "ops@example.com").await;
    let package_id = seed_catalog(&client, &admin, 5, 60.0).await;

    for (i, rating) in [5, 4, 4].into_iter().enumerate() {
        let reviewer = user_token(&client, Role::User, &format!("r{}@example.com", i)).await;
        let (status, _) = post(
            &client,
            &reviewer,
            "/api/v1/reviews/package",
            json!({ "target_id": package_id, "rating": rating, "title": "Lovely", "comment": "Clear water" }),
        )
        .await;
        assert_eq!(status, Status::Ok);
    }

    let repeat = user_token(&client, Role::User, "repeat@example.com").await;
    let review = json!({ "target_id": package_id, "rating": 3, "title": "Fine", "comment": "Okay" });
    let (status, _) = post(&client, &repeat, "/api/v1/reviews/package", review.clone()).await;
    assert_eq!(status, Status::Ok);
    let (status, _) = post(&client, &repeat, "/api/v1/reviews/package", review).await;
    assert_eq!(status, Status::Conflict);

    let (status, _) = post(
        &client,
        &repeat,
        "/api/v1/reviews/package",
        json!({ "target_id": package_id, "rating": 9, "title": "x", "comment": "y" }),
    )
    .await;
    assert_eq!(status, Status::BadRequest);

    let (_, package) = get(&client, &admin, &format!("/api/v1/packages/{}", package_id)).await;
    assert_eq!(package["data"]["total_reviews"], 4);
    assert_eq!(package["data"]["average_rating"], 4.0);

    let (_, listed) = get(&client, &admin, &format!("/api/v1/reviews/package/{}?limit=2", package_id)).await;
    assert_eq!(listed["data"]["reviews"].as_array().unwrap().len(), 2);
    assert_eq!(listed["data"]["pagination"]["pages"], 2);
}

#[rocket::async_test]
async fn openapi_document_is_served() {
    let client = client().await;
    let response = client.get("/api/v1/openapi.json").dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    let document = body(response).await;
    let paths = document["paths"].as_object().unwrap();
    assert!(paths.keys().any(|path| path.ends_with("/bookings")));
}
