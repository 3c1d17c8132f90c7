use rand::Rng;
use rand::distributions::Alphanumeric;
use regex::Regex;
use validator::ValidationError;

use crate::models::PaymentMethod;

pub fn validate_email(email: &str) -> bool {
    let re = Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap();
    re.is_match(email)
}

/// Safaricom numbers in local (07xx/01xx) or international (2547xx/+2547xx) form.
pub fn validate_mpesa_phone(phone: &str) -> bool {
    let re = Regex::new(r"^(?:\+?254|0)[17]\d{8}$").unwrap();
    re.is_match(phone)
}

/// Required text field: rejects empty and whitespace-only values.
pub fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut error = ValidationError::new("blank");
        error.message = Some("is required".into());
        return Err(error);
    }
    Ok(())
}

/// `YYYY-MM-DD`.
pub fn parse_date(value: &str) -> Option<chrono::NaiveDate> {
    chrono::NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

pub fn generate_transaction_id(method: PaymentMethod) -> String {
    let prefix = match method {
        PaymentMethod::Mpesa => "MP",
        PaymentMethod::Card => "CD",
        PaymentMethod::Bank => "BK",
    };
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(|c| char::from(c).to_ascii_uppercase())
        .collect();
    format!("{}{}", prefix, suffix)
}
