//! `minerep-auth`: authentication/authorization boundary.
//!
//! Session handling lives elsewhere; this crate only turns a bearer token into
//! verified claims and answers permission questions. It is decoupled from HTTP
//! and storage.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{authorize, permissions_for_roles, AuthzError, CommandAuthorization, Principal};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtValidator};
pub use permissions::Permission;
pub use principal::PrincipalId;
pub use roles::Role;
