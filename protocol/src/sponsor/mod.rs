//! # Sponsor Module
//!
//! Gas-free transfers. The user signs as sender, a sponsor signs as gas
//! owner, and the ledger accepts the transaction only with both.
//!
//! | Side    | Type                       | Role                                   |
//! |---------|----------------------------|----------------------------------------|
//! | device  | [`SponsorshipCoordinator`] | validate, get sponsored, sign, submit  |
//! | device  | [`HttpBackend`]            | `POST /user`, `POST /sponsor` client   |
//! | backend | [`SponsorService`]         | authenticate, build, co-sign as sponsor|

pub mod backend;
pub mod coordinator;
pub mod error;
pub mod request;
pub mod service;

pub use backend::{ErrorBody, HttpBackend, RegisterUserBody, SponsorBackend, SponsoredResponse};
pub use coordinator::SponsorshipCoordinator;
pub use error::{ServiceError, SponsorError};
pub use request::{SponsorshipRequest, ValidatedRequest};
pub use service::{Registration, SponsorService};
