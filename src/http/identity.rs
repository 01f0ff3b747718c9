use actix_web::dev::Payload;
use actix_web::{FromRequest, HttpRequest};
use futures_util::future::{ready, Ready};
use uuid::Uuid;

use crate::domain::order::{Actor, ActorRole, OrderError};

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// Caller identity as asserted by the authentication layer in front of
/// this service. Requests without it are rejected, never defaulted.
#[derive(Debug, Clone, Copy)]
pub struct Identity(pub Actor);

impl Identity {
    pub fn actor(&self) -> Actor {
        self.0
    }

    fn from_headers(req: &HttpRequest) -> Result<Self, OrderError> {
        let id = header(req, ACTOR_ID_HEADER)?;
        let id = Uuid::parse_str(id)
            .map_err(|e| OrderError::InvalidRequest(format!("malformed {} header: {}", ACTOR_ID_HEADER, e)))?;

        let role = header(req, ACTOR_ROLE_HEADER)?
            .parse::<ActorRole>()
            .map_err(OrderError::InvalidRequest)?;

        Ok(Identity(Actor { id, role }))
    }
}

fn header<'a>(req: &'a HttpRequest, name: &str) -> Result<&'a str, OrderError> {
    req.headers()
        .get(name)
        .ok_or_else(|| OrderError::InvalidRequest(format!("missing {} header", name)))?
        .to_str()
        .map_err(|_| OrderError::InvalidRequest(format!("{} header is not valid text", name)))
}

impl FromRequest for Identity {
    type Error = OrderError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let identity = Identity::from_headers(req);
        if let Err(e) = &identity {
            tracing::warn!(error = %e, path = %req.path(), "Rejected request without usable identity");
        }
        ready(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_identity_from_headers() {
        let id = Uuid::new_v4();
        let req = TestRequest::default()
            .insert_header((ACTOR_ID_HEADER, id.to_string()))
            .insert_header((ACTOR_ROLE_HEADER, "farmer"))
            .to_http_request();

        let identity = Identity::from_headers(&req).unwrap();
        assert_eq!(identity.actor(), Actor::farmer(id));
    }

    #[test]
    fn test_missing_or_malformed_identity_is_invalid_request() {
        let no_headers = TestRequest::default().to_http_request();
        assert!(matches!(
            Identity::from_headers(&no_headers),
            Err(OrderError::InvalidRequest(_))
        ));

        let bad_id = TestRequest::default()
            .insert_header((ACTOR_ID_HEADER, "demo-user"))
            .insert_header((ACTOR_ROLE_HEADER, "BUYER"))
            .to_http_request();
        assert!(matches!(Identity::from_headers(&bad_id), Err(OrderError::InvalidRequest(_))));

        let bad_role = TestRequest::default()
            .insert_header((ACTOR_ID_HEADER, Uuid::new_v4().to_string()))
            .insert_header((ACTOR_ROLE_HEADER, "admin"))
            .to_http_request();
        assert!(matches!(Identity::from_headers(&bad_role), Err(OrderError::InvalidRequest(_))));
    }
}
