pub mod admin;
pub mod auth;
pub mod booking;
pub mod destination;
pub mod package;
pub mod payment;
pub mod review;
