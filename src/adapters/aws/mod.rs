//! AWS adapters: S3 for blobs, SQS for job messages.

pub mod s3;
pub mod sqs;

pub use s3::S3Adapter;
pub use sqs::SqsAdapter;
