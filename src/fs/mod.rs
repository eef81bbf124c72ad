//! Filesystems the writer can target, selected by URI scheme.

use anyhow::Result;
use percent_encoding::percent_decode_str;
use std::sync::Arc;
use url::Url;

use crate::config::WebHdfsSettings;
use crate::error::IngestError;

mod local;
mod webhdfs;

pub use local::LocalFileSystem;
pub use webhdfs::WebHdfsFileSystem;

/// Minimal directory-tree operations the dataset writer needs.
///
/// Paths are in the filesystem's own namespace: host paths for the local
/// filesystem, absolute `/...` paths for HDFS.
pub trait FileSystem: Send + Sync {
    fn scheme(&self) -> &str;

    fn exists(&self, path: &str) -> Result<bool>;

    /// Recursively delete `path`. Deleting a missing path is not an error.
    fn delete(&self, path: &str) -> Result<()>;

    fn mkdirs(&self, path: &str) -> Result<()>;

    /// Create or replace the file at `path`, creating missing parent directories.
    fn write(&self, path: &str, data: &[u8]) -> Result<()>;
}

/// Pick the filesystem for `uri` and return it with the path inside it.
pub fn resolve(uri: &str, settings: &WebHdfsSettings) -> Result<(Arc<dyn FileSystem>, String)> {
    let parsed = match Url::parse(uri) {
        Ok(url) => url,
        // Plain host paths have no scheme
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            return Ok((Arc::new(LocalFileSystem), uri.to_string()))
        }
        Err(e) => return Err(anyhow::Error::from(e).context(format!("Invalid URI: {}", uri))),
    };

    match parsed.scheme() {
        "file" => {
            let path = parsed
                .to_file_path()
                .map_err(|_| IngestError::Config(format!("Invalid file URI: {}", uri)))?;
            Ok((Arc::new(LocalFileSystem), path.to_string_lossy().to_string()))
        }
        "hdfs" => {
            let host = parsed
                .host_str()
                .ok_or_else(|| IngestError::Config(format!("HDFS URI has no host: {}", uri)))?;
            let fs = WebHdfsFileSystem::new(host, settings)?;
            Ok((Arc::new(fs), decoded_path(&parsed)?))
        }
        other => Err(IngestError::UnsupportedScheme(other.to_string()).into()),
    }
}

/// The URI's path with percent-escapes undone, so `sales%20data` names the
/// directory `sales data`.
fn decoded_path(url: &Url) -> Result<String> {
    let mut path = String::new();
    for segment in url.path_segments().into_iter().flatten() {
        if segment.is_empty() {
            continue;
        }
        let decoded = percent_decode_str(segment)
            .decode_utf8()
            .map_err(|_| IngestError::Config(format!("Path is not valid UTF-8: {}", url)))?;
        path.push('/');
        path.push_str(&decoded);
    }
    if path.is_empty() {
        path.push('/');
    }
    Ok(path)
}

/// Append `segment` to a directory path using `/`.
pub fn join(base: &str, segment: &str) -> String {
    if base.is_empty() {
        return segment.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), segment)
}
