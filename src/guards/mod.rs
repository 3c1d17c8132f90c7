pub mod admin;
pub mod auth;
pub mod webhook;

pub use admin::AdminGuard;
pub use auth::AuthGuard;
pub use webhook::WebhookSignature;
