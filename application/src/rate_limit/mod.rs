//! Rate limiting shared across models of the same service
//!
//! - [`TokenBucket`]: one continuously refilling resource
//! - [`ModelBuckets`]: the requests + tokens pair of one service
//! - [`BucketCollection`]: model → service → buckets registry

pub mod bucket_collection;
pub mod token_bucket;

pub use bucket_collection::{BucketCollection, BucketLevel, BucketSnapshot, ModelBuckets};
pub use token_bucket::{RateLimitError, TokenBucket};
