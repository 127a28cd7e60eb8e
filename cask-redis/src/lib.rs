#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod error;
mod hash;
pub mod pool;
pub mod store;

#[doc(inline)]
pub use crate::config::RedisConfig;
#[doc(inline)]
pub use crate::error::Error;
#[doc(inline)]
pub use crate::pool::RedisConnectionManager;
#[doc(inline)]
pub use crate::store::{RedisConnection, RedisStore, RedisStoreBuilder};
