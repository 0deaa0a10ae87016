//! Session extraction subsystem.
//!
//! # Data Flow
//! ```text
//! Completed response
//!     → extractor.rs (find `zuid` Set-Cookie, read `user` from JSON body)
//!     → token.rs (seal cookie attributes under the host-supplied key)
//!     → SessionInfo { identifier, token }
//!     → session listener on its delivery queue
//! ```
//!
//! # Design Decisions
//! - All or nothing: no partial SessionInfo, no error events
//! - The key is injected; this crate never creates or stores it

pub mod extractor;
pub mod token;

pub use extractor::{SessionExtractor, SessionInfo, IDENTITY_FIELD, SESSION_COOKIE_NAME};
pub use token::{CookieProperties, SessionKey, SessionToken, TokenError};
