//! TLS bootstrap. Grounded on the teacher's `paracord-server::tls` role
//! (`ensure_certs`, called from `main` before binding), scoped down to the
//! two schemes this system supports: a self-signed cert generated on first
//! run, or operator-supplied cert/key files. ACME automation and the
//! teacher's renewal task are a collaborator concern (§1 "TLS termination").

use crate::config::TlsConfig;
use anyhow::{bail, Context, Result};
use axum_server::tls_rustls::RustlsConfig;
use std::path::Path;

/// Loads or, for `self-signed` mode, generates the cert/key pair named by
/// `config`, and builds the `RustlsConfig` `axum_server` binds with. Returns
/// `None` when `tls_mode = "off"`.
pub async fn load(config: &TlsConfig) -> Result<Option<RustlsConfig>> {
    match config.tls_mode.as_str() {
        "off" => Ok(None),
        "self-signed" => Ok(Some(load_self_signed(config).await?)),
        "manual" => Ok(Some(load_manual(config).await?)),
        other => bail!("unsupported tls_mode '{other}'"),
    }
}

async fn load_self_signed(config: &TlsConfig) -> Result<RustlsConfig> {
    let cert_path = config.tls_cert.as_deref().unwrap_or("./data/tls/cert.pem");
    let key_path = config.tls_key.as_deref().unwrap_or("./data/tls/key.pem");

    if !Path::new(cert_path).exists() || !Path::new(key_path).exists() {
        tracing::info!("generating self-signed TLS certificate at '{}'", cert_path);
        generate_self_signed(config.tls_domain.as_deref(), cert_path, key_path)?;
    }

    RustlsConfig::from_pem_file(cert_path, key_path)
        .await
        .with_context(|| format!("loading self-signed cert '{cert_path}' / key '{key_path}'"))
}

async fn load_manual(config: &TlsConfig) -> Result<RustlsConfig> {
    let cert_path = config
        .tls_cert
        .as_deref()
        .context("[tls] tls_cert is required when tls_mode = \"manual\"")?;
    let key_path = config
        .tls_key
        .as_deref()
        .context("[tls] tls_key is required when tls_mode = \"manual\"")?;

    RustlsConfig::from_pem_file(cert_path, key_path)
        .await
        .with_context(|| format!("loading TLS cert '{cert_path}' / key '{key_path}'"))
}

fn generate_self_signed(domain: Option<&str>, cert_path: &str, key_path: &str) -> Result<()> {
    let subject_alt_names = vec![domain.unwrap_or("localhost").to_string()];
    let cert_key = rcgen::generate_simple_self_signed(subject_alt_names)
        .context("generating self-signed certificate")?;

    if let Some(parent) = Path::new(cert_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    if let Some(parent) = Path::new(key_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(cert_path, cert_key.cert.pem())?;
    std::fs::write(key_path, cert_key.signing_key.serialize_pem())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(key_path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_cert_and_key_files() {
        let dir = tempfile::tempdir().unwrap();
        let cert_path = dir.path().join("cert.pem");
        let key_path = dir.path().join("key.pem");

        generate_self_signed(
            Some("parley.local"),
            cert_path.to_str().unwrap(),
            key_path.to_str().unwrap(),
        )
        .unwrap();

        assert!(cert_path.exists());
        assert!(key_path.exists());
    }
}
