//! Disk I/O for container files

use crate::core::error::Result;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// Read a whole container file
pub fn read<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    let bytes = fs::read(&path)?;
    debug!("Read {} bytes from {:?}", bytes.len(), path.as_ref());
    Ok(bytes)
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Replace `path` with `bytes` without ever exposing a partial file
///
/// The bytes go to a temporary file in the same directory, which is synced
/// and then renamed over the target. On any error the target is untouched.
pub fn write_atomic<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let mut temp = NamedTempFile::new_in(parent_dir(path))?;
    temp.write_all(bytes)?;
    temp.flush()?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    debug!("Wrote {} bytes to {:?}", bytes.len(), path);
    Ok(())
}

/// Async counterpart of [`write_atomic`]
#[cfg(feature = "async")]
pub async fn write_atomic_async<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<()> {
    use tokio::io::AsyncWriteExt;

    let path = path.as_ref().to_path_buf();
    let (file, temp_path) = NamedTempFile::new_in(parent_dir(&path))?.into_parts();
    let mut file = tokio::fs::File::from_std(file);
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);
    temp_path.persist(&path).map_err(|e| e.error)?;
    debug!("Wrote {} bytes to {:?}", bytes.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("City - Test.sc4");

        write_atomic(&path, b"DBPF first").unwrap();
        write_atomic(&path, b"DBPF second").unwrap();
        assert_eq!(read(&path).unwrap(), b"DBPF second");

        // no temporary files left behind
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_failed_write_leaves_target() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("City.sc4");
        assert!(write_atomic(&path, b"DBPF").is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_bare_file_name_uses_current_dir() {
        assert_eq!(parent_dir(Path::new("City.sc4")), Path::new("."));
    }
}
