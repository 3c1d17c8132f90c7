use rocket::request::{self, FromRequest, Request, Outcome};
use rocket::http::Status;
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};
use rocket_okapi::r#gen::OpenApiGenerator;

pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// Hex HMAC-SHA256 of the raw webhook body, as sent by the gateway.
pub struct WebhookSignature(pub String);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for WebhookSignature {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        match req.headers().get_one(SIGNATURE_HEADER) {
            Some(signature) if !signature.trim().is_empty() => {
                Outcome::Success(WebhookSignature(signature.trim().to_string()))
            }
            _ => Outcome::Error((Status::Unauthorized, ())),
        }
    }
}

impl<'a> OpenApiFromRequest<'a> for WebhookSignature {
    fn from_request_input(
        _gen: &mut OpenApiGenerator,
        _name: String,
        _required: bool,
    ) -> rocket_okapi::Result<RequestHeaderInput> {
        Ok(RequestHeaderInput::None)
    }
}
