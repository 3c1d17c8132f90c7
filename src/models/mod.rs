pub mod booking;
pub mod destination;
pub mod package;
pub mod payment;
pub mod review;
pub mod user;

pub use booking::*;
pub use destination::*;
pub use package::*;
pub use payment::*;
pub use review::*;
pub use user::*;

use mongodb::bson::DateTime;

pub(crate) fn timestamp(value: &DateTime) -> String {
    value.try_to_rfc3339_string().unwrap_or_default()
}

pub(crate) fn hex_id(id: &Option<mongodb::bson::oid::ObjectId>) -> String {
    id.map(|id| id.to_hex()).unwrap_or_default()
}
