//! OpenDAL Operator factory for the photo bucket

use anyhow::{Context, Result};
use opendal::Operator;

/// Static S3 credentials. When absent OpenDAL falls back to its own chain
/// (environment, profile files, instance metadata).
#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .finish()
    }
}

/// Minimal config needed to build an operator
/// (full config lives in psync-core's StorageConfig)
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// `None` uses the AWS endpoint for `region`
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub credentials: Option<Credentials>,
    /// Storage class applied to every object this operator writes
    pub storage_class: Option<String>,
}

/// Operators for one bucket: `live` for listing and reads, `cold` for
/// rewriting fetched objects into the archival tier.
#[derive(Debug, Clone)]
pub struct BucketOperators {
    pub live: Operator,
    pub cold: Operator,
}

/// Build an OpenDAL Operator for S3 (or any S3-compatible endpoint)
pub fn build_operator(cfg: &StorageConfig) -> Result<Operator> {
    // opendal 0.55: S3 builder uses consuming pattern (methods take `self`, return `Self`)
    let mut builder = opendal::services::S3::default()
        .region(&cfg.region)
        .bucket(&cfg.bucket);
    if let Some(endpoint) = &cfg.endpoint {
        builder = builder.endpoint(endpoint);
    }
    if let Some(creds) = &cfg.credentials {
        builder = builder
            .access_key_id(&creds.access_key_id)
            .secret_access_key(&creds.secret_access_key);
    }
    if let Some(class) = &cfg.storage_class {
        builder = builder.default_storage_class(class);
    }

    let op = Operator::new(builder)
        .context("creating OpenDAL S3 operator")?
        .layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(5)
                .with_jitter(),
        )
        .finish();

    Ok(op)
}

/// Same bucket as `cfg`, but every write lands in `storage_class`.
pub fn build_cold_operator(cfg: &StorageConfig, storage_class: &str) -> Result<Operator> {
    build_operator(&StorageConfig {
        storage_class: Some(storage_class.to_string()),
        ..cfg.clone()
    })
    .with_context(|| format!("creating {storage_class} operator"))
}

/// Build both operators from psync-core config + optional credentials.
///
/// If `enforce_tls` is true and the endpoint uses HTTP, this returns an error.
/// Otherwise, a warning is logged for non-HTTPS endpoints.
pub fn build_from_core_config(
    storage: &psync_core::config::StorageConfig,
    credentials: Option<Credentials>,
) -> Result<BucketOperators> {
    if storage.endpoint.starts_with("http://") {
        if storage.enforce_tls {
            anyhow::bail!(
                "S3 endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
                 Use an HTTPS endpoint or set storage.enforce_tls = false for local development.",
                storage.endpoint
            );
        }
        tracing::warn!(
            endpoint = %storage.endpoint,
            "S3 endpoint uses plaintext HTTP; credentials are transmitted unencrypted"
        );
    }

    let cfg = StorageConfig {
        endpoint: (!storage.endpoint.is_empty()).then(|| storage.endpoint.clone()),
        region: storage.region.clone(),
        bucket: storage.bucket.clone(),
        credentials,
        storage_class: None,
    };

    Ok(BucketOperators {
        live: build_operator(&cfg)?,
        cold: build_cold_operator(&cfg, &storage.cold_storage_class)?,
    })
}
