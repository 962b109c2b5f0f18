use unitgate_auth::Principal;
use unitgate_core::RequestId;

/// Header carrying the request correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Per-request correlation context.
///
/// Inserted by the request-id middleware before anything else runs; every
/// audit entry written while serving the request carries this id.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RequestContext {
    request_id: RequestId,
}

impl RequestContext {
    pub fn new(request_id: RequestId) -> Self {
        Self { request_id }
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }
}

/// The request's principal, built once by the auth middleware.
///
/// Anonymous when no credentials were presented; the decision engine turns
/// that into `UNAUTHENTICATED` wherever a guard runs.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal: Principal,
}

impl PrincipalContext {
    pub fn new(principal: Principal) -> Self {
        Self { principal }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }
}
