pub mod error;
pub mod pagination;
pub mod response;
pub mod validation;

pub use error::*;
pub use pagination::Pagination;
pub use response::*;
pub use validation::*;
