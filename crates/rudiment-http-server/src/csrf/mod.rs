//! Double-submit cookie CSRF protection
//!
//! A client first receives its token in a readable cookie (answered with 204).
//! State-changing requests must then echo the token. Stateless mode compares
//! the cookie with a request header; stateful mode compares it with the token
//! bound to the client's session.

mod filter;
mod store;

pub use filter::CsrfTokenValidationFilter;
pub use store::CsrfTokenStore;
