use anyhow::{Context, Result};
use reqwest::blocking::{Client, ClientBuilder, Response};
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::FileSystem;
use crate::config::WebHdfsSettings;
use crate::error::IngestError;

/// HDFS through the namenode's WebHDFS REST gateway.
///
/// File creation uses the two-step protocol: the namenode answers `CREATE` with a
/// redirect to a datanode, which receives the file body.
pub struct WebHdfsFileSystem {
    client: Client,
    endpoint: String,
    user: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BooleanResponse {
    boolean: bool,
}

#[derive(Debug, Deserialize)]
struct RemoteExceptionResponse {
    #[serde(rename = "RemoteException")]
    remote_exception: RemoteException,
}

#[derive(Debug, Deserialize)]
struct RemoteException {
    exception: String,
    message: String,
}

impl WebHdfsFileSystem {
    pub fn new(host: &str, settings: &WebHdfsSettings) -> Result<Self> {
        let client = client_builder(settings)
            .build()
            .context("Failed to create WebHDFS client")?;
        Ok(Self::with_client(client, host, settings))
    }

    fn with_client(client: Client, host: &str, settings: &WebHdfsSettings) -> Self {
        Self {
            client,
            endpoint: format!("http://{}:{}/webhdfs/v1", host, settings.port),
            user: settings.user.clone(),
        }
    }

    /// REST URL for `op` on `path`.
    ///
    /// Segments are percent-encoded individually, so already-escaped partition
    /// directory names such as `Country=a%2Fb` reach HDFS unchanged.
    pub fn op_url(&self, path: &str, op: &str, params: &[(&str, &str)]) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint)
            .with_context(|| format!("Invalid WebHDFS endpoint: {}", self.endpoint))?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("WebHDFS endpoint cannot be a base: {}", self.endpoint))?
            .extend(path.split('/').filter(|s| !s.is_empty()));
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("op", op);
            for (key, value) in params {
                query.append_pair(key, value);
            }
            if let Some(user) = &self.user {
                query.append_pair("user.name", user);
            }
        }
        Ok(url)
    }

    fn boolean_op(&self, response: Response, what: &str) -> Result<bool> {
        let response = check(response)?;
        let body: BooleanResponse = response
            .json()
            .with_context(|| format!("Malformed WebHDFS {} response", what))?;
        debug!(op = what, result = body.boolean, "webhdfs");
        Ok(body.boolean)
    }
}

/// Redirects are not followed; `write` handles the namenode's 307 itself.
fn client_builder(settings: &WebHdfsSettings) -> ClientBuilder {
    Client::builder()
        .timeout(Duration::from_secs(settings.request_timeout_secs))
        .redirect(Policy::none())
}

/// Turn a non-success response into `IngestError::WebHdfs`, using the
/// `RemoteException` body when the gateway sent one.
fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().unwrap_or_default();
    let message = match serde_json::from_str::<RemoteExceptionResponse>(&body) {
        Ok(remote) => format!(
            "{}: {}",
            remote.remote_exception.exception, remote.remote_exception.message
        ),
        Err(_) => body,
    };
    Err(IngestError::WebHdfs {
        status: status.as_u16(),
        message,
    }
    .into())
}

impl FileSystem for WebHdfsFileSystem {
    fn scheme(&self) -> &str {
        "hdfs"
    }

    fn exists(&self, path: &str) -> Result<bool> {
        let response = self
            .client
            .get(self.op_url(path, "GETFILESTATUS", &[])?)
            .send()?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check(response)?;
        Ok(true)
    }

    fn delete(&self, path: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.op_url(path, "DELETE", &[("recursive", "true")])?)
            .send()?;
        // `false` means the path was not there
        self.boolean_op(response, "DELETE")?;
        Ok(())
    }

    fn mkdirs(&self, path: &str) -> Result<()> {
        let response = self
            .client
            .put(self.op_url(path, "MKDIRS", &[])?)
            .send()?;
        let status = response.status();
        if !self.boolean_op(response, "MKDIRS")? {
            return Err(IngestError::WebHdfs {
                status: status.as_u16(),
                message: format!("MKDIRS {} returned false", path),
            }
            .into());
        }
        Ok(())
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let url = self.op_url(path, "CREATE", &[("overwrite", "true")])?;
        let response = self.client.put(url).send()?;

        let response = if response.status() == StatusCode::TEMPORARY_REDIRECT {
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .context("WebHDFS CREATE redirect without Location header")?
                .to_string();
            debug!(%location, "webhdfs CREATE redirected to datanode");
            self.client
                .put(location)
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(data.to_vec())
                .send()?
        } else {
            response
        };

        check(response).with_context(|| format!("Failed to write hdfs://{}", path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread;

    fn fs_with_user(user: Option<&str>) -> WebHdfsFileSystem {
        let settings = WebHdfsSettings {
            user: user.map(str::to_string),
            ..WebHdfsSettings::default()
        };
        WebHdfsFileSystem::new("hadoop-namenode", &settings).unwrap()
    }

    #[test]
    fn builds_operation_urls() {
        let fs = fs_with_user(None);
        let url = fs
            .op_url("/sales/salesRecord_1.parquet", "DELETE", &[("recursive", "true")])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://hadoop-namenode:9870/webhdfs/v1/sales/salesRecord_1.parquet?op=DELETE&recursive=true"
        );
    }

    #[test]
    fn adds_user_name_and_escapes_partition_paths() {
        let fs = fs_with_user(Some("hadoop"));
        let url = fs
            .op_url("sales/x.parquet/Country=Costa Rica", "MKDIRS", &[])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://hadoop-namenode:9870/webhdfs/v1/sales/x.parquet/Country=Costa%20Rica?op=MKDIRS&user.name=hadoop"
        );
    }

    #[test]
    fn keeps_escaped_partition_values_literal() {
        let fs = fs_with_user(None);
        let url = fs
            .op_url("/sales/x.parquet/Country=a%2Fb", "GETFILESTATUS", &[])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://hadoop-namenode:9870/webhdfs/v1/sales/x.parquet/Country=a%252Fb?op=GETFILESTATUS"
        );
    }

    #[test]
    fn remote_exception_bodies_are_parsed() {
        let body = r#"{"RemoteException":{"exception":"FileNotFoundException","javaClassName":"java.io.FileNotFoundException","message":"File does not exist: /sales"}}"#;
        let parsed: RemoteExceptionResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.remote_exception.exception, "FileNotFoundException");
        assert_eq!(parsed.remote_exception.message, "File does not exist: /sales");
    }

    /// A single-threaded HTTP server that answers connections in order with
    /// canned responses and records what it received.
    struct StubServer {
        port: u16,
        handle: thread::JoinHandle<Vec<RecordedRequest>>,
    }

    #[derive(Debug)]
    struct RecordedRequest {
        method: String,
        target: String,
        body: Vec<u8>,
    }

    fn http_response(status: &str, headers: &[(&str, &str)], body: &str) -> String {
        let mut out = format!("HTTP/1.1 {}\r\n", status);
        for (name, value) in headers {
            out.push_str(&format!("{}: {}\r\n", name, value));
        }
        out.push_str(&format!(
            "Content-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        ));
        out
    }

    fn json_response(status: &str, body: &str) -> String {
        http_response(status, &[("Content-Type", "application/json")], body)
    }

    impl StubServer {
        /// `respond` gets the server port and builds the responses, so redirects
        /// can point back at the same server.
        fn start(respond: impl FnOnce(u16) -> Vec<String>) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let port = listener.local_addr().unwrap().port();
            let responses = respond(port);
            let handle = thread::spawn(move || {
                let mut recorded = Vec::new();
                for response in responses {
                    let (stream, _) = listener.accept().unwrap();
                    let mut reader = BufReader::new(stream);
                    recorded.push(read_request(&mut reader));
                    let mut stream = reader.into_inner();
                    stream.write_all(response.as_bytes()).unwrap();
                    stream.flush().unwrap();
                }
                recorded
            });
            Self { port, handle }
        }

        fn filesystem(&self, user: Option<&str>) -> WebHdfsFileSystem {
            let settings = WebHdfsSettings {
                port: self.port,
                user: user.map(str::to_string),
                request_timeout_secs: 10,
            };
            let client = client_builder(&settings).no_proxy().build().unwrap();
            WebHdfsFileSystem::with_client(client, "127.0.0.1", &settings)
        }

        fn finish(self) -> Vec<RecordedRequest> {
            self.handle.join().unwrap()
        }
    }

    fn read_request(reader: &mut BufReader<TcpStream>) -> RecordedRequest {
        let mut request_line = String::new();
        reader.read_line(&mut request_line).unwrap();
        let mut parts = request_line.split_whitespace();
        let method = parts.next().unwrap_or_default().to_string();
        let target = parts.next().unwrap_or_default().to_string();

        let mut content_length = 0;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().unwrap();
                }
            }
        }

        let mut body = vec![0; content_length];
        reader.read_exact(&mut body).unwrap();
        RecordedRequest {
            method,
            target,
            body,
        }
    }

    #[test]
    fn missing_path_reports_not_exists() {
        let server = StubServer::start(|_| {
            vec![
                json_response(
                    "404 Not Found",
                    r#"{"RemoteException":{"exception":"FileNotFoundException","message":"File does not exist: /sales"}}"#,
                ),
                json_response("200 OK", r#"{"FileStatus":{"type":"DIRECTORY"}}"#),
            ]
        });
        let fs = server.filesystem(None);

        assert!(!fs.exists("/sales").unwrap());
        assert!(fs.exists("/sales").unwrap());

        let requests = server.finish();
        assert_eq!(requests[0].method, "GET");
        assert_eq!(requests[0].target, "/webhdfs/v1/sales?op=GETFILESTATUS");
    }

    #[test]
    fn create_follows_redirect_to_datanode() {
        let server = StubServer::start(|port| {
            let location = format!(
                "http://127.0.0.1:{}/webhdfs/v1/sales/part-0.parquet?op=CREATE&namenoderpcaddress=nn:9000&overwrite=true",
                port
            );
            vec![
                http_response("307 Temporary Redirect", &[("Location", location.as_str())], ""),
                http_response("201 Created", &[], ""),
            ]
        });
        let fs = server.filesystem(Some("hadoop"));

        fs.write("/sales/part-0.parquet", b"PAR1 bytes").unwrap();

        let requests = server.finish();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].method, "PUT");
        assert_eq!(
            requests[0].target,
            "/webhdfs/v1/sales/part-0.parquet?op=CREATE&overwrite=true&user.name=hadoop"
        );
        assert!(requests[0].body.is_empty());
        assert_eq!(requests[1].method, "PUT");
        assert!(requests[1].target.contains("namenoderpcaddress=nn:9000"));
        assert_eq!(requests[1].body, b"PAR1 bytes");
    }

    #[test]
    fn redirect_without_location_is_an_error() {
        let server =
            StubServer::start(|_| vec![http_response("307 Temporary Redirect", &[], "")]);
        let fs = server.filesystem(None);

        let err = fs.write("/sales/part-0.parquet", b"x").unwrap_err();
        assert!(err.to_string().contains("Location"));
        server.finish();
    }

    #[test]
    fn remote_exception_becomes_webhdfs_error() {
        let server = StubServer::start(|_| {
            vec![json_response(
                "403 Forbidden",
                r#"{"RemoteException":{"exception":"AccessControlException","message":"Permission denied: user=dr.who"}}"#,
            )]
        });
        let fs = server.filesystem(None);

        let err = fs.mkdirs("/sales").unwrap_err();
        match err.downcast_ref::<IngestError>() {
            Some(IngestError::WebHdfs { status, message }) => {
                assert_eq!(*status, 403);
                assert_eq!(message, "AccessControlException: Permission denied: user=dr.who");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        server.finish();
    }

    #[test]
    fn mkdirs_false_is_an_error_but_delete_false_is_not() {
        let server = StubServer::start(|_| {
            vec![
                json_response("200 OK", r#"{"boolean":true}"#),
                json_response("200 OK", r#"{"boolean":false}"#),
                json_response("200 OK", r#"{"boolean":false}"#),
            ]
        });
        let fs = server.filesystem(None);

        fs.mkdirs("/sales").unwrap();
        let err = fs.mkdirs("/sales").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IngestError>(),
            Some(IngestError::WebHdfs { status: 200, .. })
        ));
        fs.delete("/sales/missing").unwrap();

        let requests = server.finish();
        assert_eq!(requests[0].target, "/webhdfs/v1/sales?op=MKDIRS");
        assert_eq!(requests[2].method, "DELETE");
        assert_eq!(
            requests[2].target,
            "/webhdfs/v1/sales/missing?op=DELETE&recursive=true"
        );
    }
}
