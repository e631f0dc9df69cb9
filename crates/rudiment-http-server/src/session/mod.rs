//! Session management for the request pipeline
//!
//! - [`SessionManager`] - Binds requests to stored sessions via the session cookie
//! - [`SessionFilter`] - Acquires (and creates) the session of every request
//! - [`InactiveSessionFilter`] - Expires sessions idle for longer than allowed

mod filter;
mod inactive;
mod manager;

pub use filter::SessionFilter;
pub use inactive::InactiveSessionFilter;
pub use manager::SessionManager;
