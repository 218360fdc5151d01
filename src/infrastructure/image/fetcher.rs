//! HTTP fetcher that tees response bodies into the disk cache.

use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, Url, redirect};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace, warn};

use crate::domain::errors::{FetchError, LoaderError};
use crate::domain::ports::{FetchPort, FetchedBody};
use crate::domain::stream::RewindableStream;

use super::disk_cache::partial_path;

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(1000);
/// Default read timeout.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(5000);
/// Default redirect ceiling.
pub const DEFAULT_MAX_REDIRECTS: usize = 10;
/// Default rewind window for bodies that are not persisted.
pub const DEFAULT_STREAM_MARK_LIMIT: usize = 1024 * 1024;
/// Default ceiling on a response body (32 MiB).
pub const DEFAULT_MAX_BODY_BYTES: u64 = 32 * 1024 * 1024;

/// Fetches images over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    stream_mark_limit: usize,
    max_body_bytes: u64,
}

impl HttpFetcher {
    /// Creates a fetcher with explicit timeouts.
    ///
    /// # Errors
    /// Returns [`LoaderError::HttpClient`] if the client cannot be built.
    pub fn new(
        connect_timeout: Duration,
        read_timeout: Duration,
        max_redirects: usize,
    ) -> Result<Self, LoaderError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .redirect(redirect::Policy::limited(max_redirects))
            .build()
            .map_err(|e| LoaderError::HttpClient {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            stream_mark_limit: DEFAULT_STREAM_MARK_LIMIT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        })
    }

    /// Creates a fetcher with the list-view defaults (1s connect, 5s read).
    ///
    /// # Errors
    /// Returns [`LoaderError::HttpClient`] if the client cannot be built.
    pub fn with_defaults() -> Result<Self, LoaderError> {
        Self::new(
            DEFAULT_CONNECT_TIMEOUT,
            DEFAULT_READ_TIMEOUT,
            DEFAULT_MAX_REDIRECTS,
        )
    }

    /// Sets how many bytes of an unpersisted body may be replayed.
    #[must_use]
    pub const fn with_stream_mark_limit(mut self, bytes: usize) -> Self {
        self.stream_mark_limit = bytes;
        self
    }

    /// Sets the largest body accepted; bigger responses fail.
    #[must_use]
    pub const fn with_max_body_bytes(mut self, bytes: u64) -> Self {
        self.max_body_bytes = bytes;
        self
    }

    fn check_body_size(&self, bytes: u64) -> Result<(), FetchError> {
        if bytes > self.max_body_bytes {
            return Err(FetchError::network(format!(
                "response body exceeds {} bytes",
                self.max_body_bytes
            )));
        }
        Ok(())
    }

    async fn open(&self, url: Url) -> Result<Response, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::network(format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }
        if let Some(length) = response.content_length() {
            self.check_body_size(length)?;
        }
        Ok(response)
    }

    fn stream_body(&self, body: Vec<u8>) -> FetchedBody {
        FetchedBody::Stream(RewindableStream::new(
            Cursor::new(body),
            self.stream_mark_limit,
        ))
    }

    async fn collect(
        &self,
        mut response: Response,
        mut body: Vec<u8>,
    ) -> Result<FetchedBody, FetchError> {
        while let Some(chunk) = response.chunk().await? {
            self.check_body_size((body.len() + chunk.len()) as u64)?;
            body.extend_from_slice(&chunk);
        }
        Ok(self.stream_body(body))
    }

    /// Writes the body to a partial file beside `path`, then renames it into
    /// place. If the disk gives out the rest of the body is kept in memory.
    async fn persist(
        &self,
        mut response: Response,
        path: &Path,
    ) -> Result<FetchedBody, FetchError> {
        let partial = partial_path(path);
        let mut file = match fs::File::create(&partial).await {
            Ok(file) => file,
            Err(e) => {
                warn!(
                    path = %partial.display(),
                    error = %e,
                    "Cannot create cache file, streaming instead"
                );
                return self.collect(response, Vec::new()).await;
            }
        };

        let mut written = 0usize;
        loop {
            let chunk = match response.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    drop(file);
                    let _ = fs::remove_file(&partial).await;
                    return Err(e.into());
                }
            };
            if let Err(e) = self.check_body_size((written + chunk.len()) as u64) {
                drop(file);
                let _ = fs::remove_file(&partial).await;
                return Err(e);
            }

            if let Err(e) = file.write_all(&chunk).await {
                warn!(
                    path = %partial.display(),
                    error = %e,
                    written,
                    "Cache write failed, streaming the rest"
                );
                let prefix = read_back(file, &partial, written).await?;
                let mut body = prefix;
                body.extend_from_slice(&chunk);
                return self.collect(response, body).await;
            }
            written += chunk.len();
        }

        if let Err(e) = finish(file, &partial, path).await {
            warn!(
                path = %path.display(),
                error = %e,
                "Failed to finalize cache file, streaming instead"
            );
            let body = fs::read(&partial)
                .await
                .map_err(|e| FetchError::network(e.to_string()))?;
            let _ = fs::remove_file(&partial).await;
            return Ok(self.stream_body(body));
        }

        debug!(path = %path.display(), bytes = written, "Persisted fetched image");
        Ok(FetchedBody::Persisted(path.to_path_buf()))
    }
}

async fn finish(mut file: fs::File, partial: &Path, path: &Path) -> std::io::Result<()> {
    file.flush().await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(partial, path).await
}

/// Recovers the first `written` bytes of an abandoned partial file.
async fn read_back(
    mut file: fs::File,
    partial: &Path,
    written: usize,
) -> Result<Vec<u8>, FetchError> {
    let _ = file.flush().await;
    drop(file);
    let mut prefix = fs::read(partial).await.unwrap_or_default();
    let _ = fs::remove_file(partial).await;
    if prefix.len() < written {
        return Err(FetchError::network(format!(
            "lost {} bytes after cache write failure",
            written - prefix.len()
        )));
    }
    prefix.truncate(written);
    Ok(prefix)
}

fn parse_url(raw: &str) -> Result<Url, FetchError> {
    let url = Url::parse(raw).map_err(|e| FetchError::malformed(raw, e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(FetchError::malformed(
            raw,
            format!("unsupported scheme `{other}`"),
        )),
    }
}

#[async_trait]
impl FetchPort for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        persist_to: Option<&Path>,
    ) -> Result<FetchedBody, FetchError> {
        let parsed = parse_url(url)?;
        trace!(url, persist = persist_to.is_some(), "Fetching image");
        let response = self.open(parsed).await?;

        match persist_to {
            Some(path) => self.persist(response, path).await,
            None => self.collect(response, Vec::new()).await,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// Serves `body` with `status` to every connection. Returns the base URL.
    pub(crate) async fn serve(status: u16, body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let body = body.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let mut request = Vec::new();
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }
                    let head = format!(
                        "HTTP/1.1 {status} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        body.len()
                    );
                    let _ = socket.write_all(head.as_bytes()).await;
                    let _ = socket.write_all(&body).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_fetch_persists_to_path() {
        let url = serve(200, b"pixels".to_vec()).await;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blob.img");

        let fetcher = HttpFetcher::with_defaults().unwrap();
        let body = fetcher.fetch(&url, Some(&path)).await.unwrap();

        assert!(matches!(body, FetchedBody::Persisted(ref p) if *p == path));
        assert_eq!(std::fs::read(&path).unwrap(), b"pixels");
        assert!(!partial_path(&path).exists());
    }

    #[tokio::test]
    async fn test_fetch_without_path_streams() {
        let url = serve(200, b"pixels".to_vec()).await;
        let fetcher = HttpFetcher::with_defaults().unwrap();

        let FetchedBody::Stream(mut stream) = fetcher.fetch(&url, None).await.unwrap() else {
            panic!("expected a stream");
        };
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"pixels");
    }

    #[tokio::test]
    async fn test_missing_directory_falls_back_to_stream() {
        let url = serve(200, b"pixels".to_vec()).await;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gone").join("blob.img");

        let fetcher = HttpFetcher::with_defaults().unwrap();
        let body = fetcher.fetch(&url, Some(&path)).await.unwrap();
        assert!(matches!(body, FetchedBody::Stream(_)));
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let url = serve(200, vec![7u8; 2048]).await;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blob.img");
        let fetcher = HttpFetcher::with_defaults().unwrap().with_max_body_bytes(1024);

        let err = fetcher.fetch(&url, None).await.unwrap_err();
        assert!(matches!(err, FetchError::Network { ref message } if message.contains("1024")));

        let err = fetcher.fetch(&url, Some(&path)).await.unwrap_err();
        assert!(matches!(err, FetchError::Network { .. }));
        assert!(!path.exists());
        assert!(!partial_path(&path).exists());
    }

    #[tokio::test]
    async fn test_body_at_limit_is_accepted() {
        let url = serve(200, vec![7u8; 1024]).await;
        let fetcher = HttpFetcher::with_defaults().unwrap().with_max_body_bytes(1024);

        let FetchedBody::Stream(mut stream) = fetcher.fetch(&url, None).await.unwrap() else {
            panic!("expected a stream");
        };
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out.len(), 1024);
    }

    #[tokio::test]
    async fn test_http_error_status_is_network_error() {
        let url = serve(404, Vec::new()).await;
        let fetcher = HttpFetcher::with_defaults().unwrap();

        let err = fetcher.fetch(&url, None).await.unwrap_err();
        assert!(matches!(err, FetchError::Network { ref message } if message.contains("404")));
    }

    #[tokio::test]
    async fn test_malformed_urls() {
        let fetcher = HttpFetcher::with_defaults().unwrap();
        for raw in ["not a url", "ftp://example.com/a.png"] {
            let err = fetcher.fetch(raw, None).await.unwrap_err();
            assert!(matches!(err, FetchError::MalformedUrl { .. }), "{raw}: {err}");
        }
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let fetcher = HttpFetcher::new(
            Duration::from_millis(200),
            Duration::from_millis(100),
            DEFAULT_MAX_REDIRECTS,
        )
        .unwrap();
        let err = fetcher
            .fetch(&format!("http://{addr}/slow.png"), None)
            .await
            .unwrap_err();
        assert!(err.is_timeout(), "{err}");
    }
}
