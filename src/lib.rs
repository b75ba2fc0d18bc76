//! sni-renew obtains Let's Encrypt certificates for the custom domains of a hosted app and
//! installs them on the app's SNI endpoint. It is meant to run on a schedule: most runs find
//! the installed certificate fresh enough and stop without touching anything.
//!
//! Domain ownership is proven with http-01 challenges. The app has to answer
//! `GET /.well-known/acme-challenge/{token}` itself, and there are two ways to feed it the
//! proof:
//!
//! * [`StoreChallengeProvider`] writes proofs to a store the app reads from, usually the
//!   app's redis ([`stores::RedisStore`]).
//! * [`RestartChallengeProvider`] writes the proof to a config var, restarts the app and
//!   polls the challenge url until the restarted app serves it. This needs no shared store
//!   but takes as long as a restart does.
//!
//! ```rust,no_run
//! use sni_renew::*;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), RenewError> {
//! let config = RenewConfig::new().server("staging").challenge(ChallengeMode::Restart);
//! let platform = Arc::new(HerokuApi::new("myapp", "api-key"));
//! let issuer = config.acme_client();
//! match Renewal::new(platform, issuer, config).run().await? {
//!     RenewOutcome::Skipped => println!("still fresh"),
//!     RenewOutcome::Created(endpoint) | RenewOutcome::Updated(endpoint) => println!("installed on {}", endpoint.id),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## The acme module
//!
//! The underlying ACME client is exposed as a module. It only implements what http-01
//! issuance needs and is not covered by any stability promises.

pub mod acme;
mod certificate;
mod challenge;
pub mod challenges;
mod config;
mod freshness;
mod heroku;
mod https_helper;
mod jose;
mod order;
mod platform;
mod publish;
mod renew;
mod shutdown;
mod store;
pub mod stores;

#[cfg(test)]
mod test_support;

pub use certificate::*;
pub use challenge::*;
pub use challenges::*;
pub use config::*;
pub use freshness::*;
pub use heroku::*;
pub use https_helper::HttpsRequestError;
pub use order::*;
pub use platform::*;
pub use publish::*;
pub use renew::*;
pub use shutdown::*;
pub use store::*;
