//! Feature flag repository and rollout evaluation.
//!
//! Flags live in a [DurableStore] and are read through a [CacheStore]. [FlagRepository] owns the
//! tiering rules; [evaluate] decides, as a pure function of the flag and the subject id,
//! whether a flag is enabled for that subject.

mod bucket;
mod cache;
mod config;
mod error;
mod eval;
mod flag;
mod parameter_store;
mod repository;
mod rule;
mod store;
mod test_common;

pub use bucket::*;
pub use cache::*;
pub use config::*;
pub use error::*;
pub use eval::*;
pub use flag::*;
pub use parameter_store::*;
pub use repository::*;
pub use rule::*;
pub use store::*;
