//! Database connection pool
//!
//! Builds the deadpool-postgres pool used by the introspector and the
//! metadata repository, with rustls when the server requires TLS.

use crate::config::DatabaseConfig;
use crate::error::{AppError, AppResult};
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tracing::info;

/// Create a pool and verify it with a trivial query
pub async fn create_pool(db: &DatabaseConfig) -> AppResult<Pool> {
    let mut cfg = Config::new();
    cfg.host = Some(db.host.clone());
    cfg.port = Some(db.port);
    cfg.user = Some(db.user.clone());
    cfg.password = Some(db.password.clone());
    cfg.dbname = Some(db.database.clone());
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    cfg.pool = Some(deadpool_postgres::PoolConfig::new(db.max_pool_size));

    let pool = if db.use_tls {
        let certs = rustls_native_certs::load_native_certs();
        let mut root_store = rustls::RootCertStore::empty();
        for cert in certs.certs {
            root_store.add(cert).ok();
        }

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);
        cfg.create_pool(Some(Runtime::Tokio1), tls)
    } else {
        cfg.create_pool(Some(Runtime::Tokio1), tokio_postgres::NoTls)
    }
    .map_err(|e| AppError::Config(format!("Failed to create pool: {}", e)))?;

    let client = pool.get().await?;
    client.query_one("SELECT 1 AS ok", &[]).await?;

    info!(
        "Database connection to {}:{}/{} verified (TLS: {})",
        db.host, db.port, db.database, db.use_tls
    );
    Ok(pool)
}
