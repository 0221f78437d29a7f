//! Cache of resource authorisation decisions made by an external policy service.
//!
//! Decisions are cached per user email with different lifetimes for allowed and
//! denied resources. A [`Sweeper`] removes expired entries in the background.
//! The [`ResourceAuthorizer`] batches cache misses into one policy request.
mod authorizer;
mod bypass;
mod cache;
mod conf;
pub mod crn;
pub mod errors;
mod http;
pub mod iam;
pub mod policy;
mod sweeper;
pub mod telemetry;

#[cfg(any(test, feature = "test-fixture"))]
mod fixture;

#[cfg(any(test, feature = "test-fixture"))]
pub use self::fixture::PolicyFixture;

pub use self::authorizer::ResourceAuthorizer;
pub use self::bypass::BypassFlag;
pub use self::cache::ResourceAuth;
pub use self::cache::ResourceAuthCache;
pub use self::conf::IamConf;
pub use self::conf::PolicyConf;
pub use self::conf::ResourceAuthConf;
pub use self::conf::IAM_URL_ENV;
pub use self::sweeper::Sweeper;
