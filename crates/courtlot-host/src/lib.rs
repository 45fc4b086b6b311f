//! Lottery operations over a stored profile, and the request/response
//! service a front end talks to.

mod error;
pub mod lottery;
pub mod service;

pub use error::SettingError;
pub use lottery::{ApplyRun, Lottery};
pub use service::{Request, serve, spawn};
