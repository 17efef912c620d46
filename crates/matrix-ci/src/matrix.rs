//! Matrix expansion: cross product of runtime versions and backends.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::backend::{BackendKind, BackendSpec};

/// One concrete (runtime version, backend) combination, executed as an
/// isolated unit. Owned exclusively by the run instance processing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixCell {
    pub runtime_version: String,
    pub backend: BackendKind,
    /// Connection URI with the provisioned ports already populated.
    pub connection_uri: String,
    pub db_port: Option<u16>,
    pub cache_port: u16,
}

impl MatrixCell {
    /// Short identifier used in container names and log fields.
    pub fn id(&self) -> String {
        format!("{}-{}", self.backend, self.runtime_version.replace('.', "-"))
    }

    /// Environment contract consumed by the test suite.
    pub fn suite_env(&self, settings_module: &str) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert("DATABASE_URI".to_string(), self.connection_uri.clone());
        env.insert("CACHE_PORT".to_string(), self.cache_port.to_string());
        env.insert("APP_SETTINGS".to_string(), settings_module.to_string());
        env.insert(
            "RUNTIME_VERSION".to_string(),
            self.runtime_version.clone(),
        );
        env
    }
}

/// Expand the version x backend cross product.
///
/// Produces exactly `versions.len() * backends.len()` cells with unique
/// (version, backend) pairs. Each cell takes its position in the matrix
/// as its port slot, so the cells bind pairwise-disjoint host ports and
/// can all run concurrently on one host. Cells are independent; no
/// ordering between them is implied.
pub fn expand(versions: &[String], backends: &[BackendKind], data_dir: &Path) -> Vec<MatrixCell> {
    let mut cells = Vec::with_capacity(versions.len() * backends.len());
    for version in versions {
        for &backend in backends {
            let spec = BackendSpec::for_slot(backend, cells.len() as u16);
            cells.push(MatrixCell {
                runtime_version: version.clone(),
                backend,
                connection_uri: spec.connection_uri(data_dir),
                db_port: spec.db_port,
                cache_port: spec.cache_port,
            });
        }
    }
    cells
}

/// Deterministic digest of the ordered matrix axes.
pub fn matrix_digest(versions: &[String], backends: &[BackendKind]) -> String {
    let mut hasher = Sha256::new();
    for version in versions {
        hasher.update(version.as_bytes());
        hasher.update(b"\0");
    }
    for backend in backends {
        hasher.update(backend.name().as_bytes());
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}
