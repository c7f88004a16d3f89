//! Key file handling for the daemon's long-term identity.

use std::path::Path;

use anyhow::{bail, Context, Result};
use iroh::SecretKey;

/// Load a 32-byte secret key from `path`, generating and persisting one
/// when the file does not exist yet. The file holds the raw seed bytes;
/// the public key is always derived on load.
pub fn load_or_generate(path: &Path) -> Result<SecretKey> {
    if path.exists() {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read key file {}", path.display()))?;
        let Ok(seed) = <[u8; 32]>::try_from(bytes.as_slice()) else {
            bail!(
                "key file {} must hold exactly 32 bytes, found {}",
                path.display(),
                bytes.len()
            );
        };
        return Ok(SecretKey::from(seed));
    }

    let key = SecretKey::generate(&mut rand_core::OsRng);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    std::fs::write(path, key.to_bytes())
        .with_context(|| format!("failed to write key file {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("failed to chmod key file {}", path.display()))?;
    }
    tracing::info!(path = %path.display(), "generated new identity key");
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_key_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("lighthouse-keys-{}-{name}", std::process::id()))
    }

    #[test]
    fn generates_then_reloads_the_same_key() {
        let path = temp_key_path("roundtrip");
        let _ = std::fs::remove_file(&path);

        let generated = load_or_generate(&path).unwrap();
        assert!(path.exists());

        let reloaded = load_or_generate(&path).unwrap();
        assert_eq!(generated.public(), reloaded.public());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn rejects_wrong_sized_key_files() {
        let path = temp_key_path("short");
        std::fs::write(&path, [0u8; 7]).unwrap();
        assert!(load_or_generate(&path).is_err());
        let _ = std::fs::remove_file(&path);
    }
}
