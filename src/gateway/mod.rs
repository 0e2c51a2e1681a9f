//! Request admission gateway and its HTTP surface.

mod admission;
mod middleware;
mod server;

pub use admission::{Admitted, Gateway, GatewayRequest, Rejection};
pub use middleware::{admission_middleware, forward_auth_middleware, ErrorBody, Session};
pub use server::{router, GatewayServer, HEALTH_PATH};
