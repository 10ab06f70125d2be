//! psync-storage: OpenDAL operators for the photo bucket

pub mod health;
pub mod operator;

pub use health::check_health;
pub use operator::{
    build_cold_operator, build_from_core_config, build_operator, BucketOperators, Credentials,
    StorageConfig,
};
