use anyhow::{Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use super::FileSystem;

/// The host filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {
    fn scheme(&self) -> &str {
        "file"
    }

    fn exists(&self, path: &str) -> Result<bool> {
        Ok(Path::new(path).exists())
    }

    fn delete(&self, path: &str) -> Result<()> {
        let path = Path::new(path);
        let result = if path.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete {}", path.display())),
        }
    }

    fn mkdirs(&self, path: &str) -> Result<()> {
        fs::create_dir_all(path).with_context(|| format!("Failed to create directory {}", path))
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let path = Path::new(path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, data).with_context(|| format!("Failed to write {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_creates_parents_and_delete_is_recursive() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("dataset");
        let root = root.to_str().unwrap();
        let file = format!("{}/Country=France/part-0.parquet", root);

        let fs = LocalFileSystem;
        fs.write(&file, b"data").unwrap();
        assert!(fs.exists(&file).unwrap());
        assert_eq!(std::fs::read(&file).unwrap(), b"data");

        fs.delete(root).unwrap();
        assert!(!fs.exists(root).unwrap());
    }

    #[test]
    fn deleting_missing_path_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        LocalFileSystem.delete(missing.to_str().unwrap()).unwrap();
    }
}
