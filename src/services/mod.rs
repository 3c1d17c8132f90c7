pub mod booking;
pub mod catalog;
pub mod gateway;
pub mod jwt;
pub mod payment;
pub mod review;

pub use booking::{BookingService, CancellationOutcome};
pub use catalog::CatalogService;
pub use gateway::{GatewayConn, PaymentGateway};
pub use jwt::JwtService;
pub use payment::PaymentService;
pub use review::ReviewService;
