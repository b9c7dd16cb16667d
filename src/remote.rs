//! Remote listing and fetch.
//!
//! The accumulation files live on an FTP site partitioned by year and month.
//! The production environment cannot reach that site directly, so the fetch
//! capability is transport-agnostic: a direct FTP implementation and an
//! HTTP-relay implementation sit behind one [`Transport`] trait, selected at
//! configuration time. [`RemoteClient`] layers the reliability policy on top
//! of whichever transport is plugged in: per-operation timeouts, bounded
//! retries with backoff, and removal of partially written files on every
//! fetch failure path.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Datelike, NaiveDate};
use futures::StreamExt;
use indicatif::ProgressStyle;
use suppaftp::FtpStream;
use tokio::task;
use tracing::{debug, info, warn};

use crate::cli::create_spinner;
use crate::error::{IngestError, Result};

const MAX_ATTEMPTS: u32 = 3;
const RETRY_DELAY_SECS: u64 = 5;

pub trait Transport {
    /// Lists the file names available in a remote folder.
    async fn list(&self, folder: &str) -> Result<Vec<String>>;

    /// Retrieves a remote file into `dest`. Implementations may leave a
    /// partial file behind on failure; [`RemoteClient`] cleans it up.
    async fn fetch(&self, remote_path: &str, dest: &Path) -> Result<()>;
}

/// Remote partition for a reference date: `<base>/<year>/<zero-padded month>`.
pub fn remote_folder(base: &str, as_of: NaiveDate) -> String {
    format!(
        "{}/{}/{:02}",
        base.trim_end_matches('/'),
        as_of.year(),
        as_of.month()
    )
}

/// Direct FTP access. Blocking `suppaftp` calls run on the blocking thread
/// pool; extended passive mode keeps the data channel working behind NAT.
#[derive(Clone)]
pub struct FtpTransport {
    host: String,
    port: u16,
    username: String,
    password: String,
}

impl FtpTransport {
    pub fn new(host: &str, port: u16, username: &str, password: &str) -> Self {
        FtpTransport {
            host: host.to_string(),
            port,
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    fn connect(&self) -> Result<FtpStream> {
        debug!(host = %self.host, port = self.port, "connecting to FTP server");
        let mut ftp = FtpStream::connect(format!("{}:{}", self.host, self.port))?;
        ftp.set_mode(suppaftp::Mode::ExtendedPassive);
        ftp.login(&self.username, &self.password)?;

        Ok(ftp)
    }

    fn list_sync(&self, folder: &str) -> Result<Vec<String>> {
        let mut ftp = self.connect()?;
        ftp.cwd(folder)?;
        let names = ftp.nlst(None)?;

        if let Err(e) = ftp.quit() {
            warn!(error = %e, "FTP session not closed cleanly");
        }

        Ok(names)
    }

    fn fetch_sync(&self, remote_path: &str, dest: &Path) -> Result<()> {
        let mut ftp = self.connect()?;
        ftp.transfer_type(suppaftp::types::FileType::Binary)?;

        let mut reader = ftp.retr_as_buffer(remote_path)?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        fs::write(dest, &data)?;

        if let Err(e) = ftp.quit() {
            warn!(error = %e, "FTP session not closed cleanly");
        }

        info!(file = remote_path, bytes = data.len(), "downloaded via FTP");

        Ok(())
    }
}

impl Transport for FtpTransport {
    async fn list(&self, folder: &str) -> Result<Vec<String>> {
        let client = self.clone();
        let folder = folder.to_string();

        task::spawn_blocking(move || client.list_sync(&folder)).await?
    }

    async fn fetch(&self, remote_path: &str, dest: &Path) -> Result<()> {
        let client = self.clone();
        let remote_path = remote_path.to_string();
        let dest = dest.to_path_buf();

        task::spawn_blocking(move || client.fetch_sync(&remote_path, &dest)).await?
    }
}

/// FTP access through the HTTP relay. The relay lists a directory as a
/// comma-delimited name string and proxies file retrieval byte-for-byte.
pub struct RelayTransport {
    client: reqwest::Client,
    relay_url: String,
    ftp_root: String,
}

impl RelayTransport {
    pub fn new(relay_url: &str, ftp_host: &str) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;

        Ok(RelayTransport {
            client,
            relay_url: relay_url.to_string(),
            ftp_root: format!("ftp://{ftp_host}"),
        })
    }
}

impl Transport for RelayTransport {
    async fn list(&self, folder: &str) -> Result<Vec<String>> {
        // The relay requires the trailing slash on directory listings.
        let url = format!("{}?directory={}{}/", self.relay_url, self.ftp_root, folder);
        debug!(url, "listing remote folder via relay");

        let body = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        Ok(body
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect())
    }

    async fn fetch(&self, remote_path: &str, dest: &Path) -> Result<()> {
        let url = format!("{}?url={}{}", self.relay_url, self.ftp_root, remote_path);
        debug!(url, "fetching remote file via relay");

        let response = self.client.get(&url).send().await?.error_for_status()?;

        let bar = create_spinner(format!("Downloading {remote_path}..."));
        if let Some(total) = response.content_length() {
            bar.set_length(total);
            bar.set_style(
                ProgressStyle::with_template(
                    "{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({percent}%) {eta}",
                )
                .unwrap()
                .progress_chars("=> "),
            );
        }

        let mut file = File::create(dest)?;
        let mut downloaded = 0u64;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)?;
            downloaded += chunk.len() as u64;
            bar.set_position(downloaded);
        }

        bar.finish_and_clear();
        info!(file = remote_path, bytes = downloaded, "downloaded via relay");

        Ok(())
    }
}

/// Reliability wrapper around a [`Transport`].
pub struct RemoteClient<T> {
    transport: T,
    timeout: Duration,
    max_attempts: u32,
    retry_delay: Duration,
}

impl<T: Transport> RemoteClient<T> {
    pub fn new(transport: T, timeout: Duration) -> Self {
        Self::with_policy(
            transport,
            timeout,
            MAX_ATTEMPTS,
            Duration::from_secs(RETRY_DELAY_SECS),
        )
    }

    pub fn with_policy(
        transport: T,
        timeout: Duration,
        max_attempts: u32,
        retry_delay: Duration,
    ) -> Self {
        RemoteClient {
            transport,
            timeout,
            max_attempts,
            retry_delay,
        }
    }

    /// Lists the remote folder, retrying transient failures. Failure on the
    /// last attempt is fatal to the run.
    pub async fn list_directory(&self, folder: &str) -> Result<Vec<String>> {
        for attempt in 1..=self.max_attempts {
            debug!(folder, attempt, "listing remote folder");

            let outcome = match tokio::time::timeout(self.timeout, self.transport.list(folder))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(IngestError::Timeout {
                    operation: format!("listing of {folder}"),
                    secs: self.timeout.as_secs(),
                }),
            };

            match outcome {
                Ok(names) => {
                    info!(folder, count = names.len(), "listed remote folder");
                    return Ok(names);
                }
                Err(e) if attempt < self.max_attempts => {
                    let delay = self.retry_delay * attempt;
                    warn!(folder, attempt, error = %e, "listing failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(IngestError::listing(folder, e)),
            }
        }

        unreachable!("retry loop always returns")
    }

    /// Fetches one remote file, retrying transient failures. Whatever the
    /// transport leaves behind after a failed transfer is removed so a
    /// half-written file can never be mistaken for valid input later.
    pub async fn fetch(&self, remote_path: &str, dest: &Path) -> Result<PathBuf> {
        for attempt in 1..=self.max_attempts {
            debug!(file = remote_path, attempt, "fetching remote file");

            let outcome = match tokio::time::timeout(
                self.timeout,
                self.transport.fetch(remote_path, dest),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(IngestError::Timeout {
                    operation: format!("fetch of {remote_path}"),
                    secs: self.timeout.as_secs(),
                }),
            };

            match outcome {
                Ok(()) => return Ok(dest.to_path_buf()),
                Err(e) => {
                    remove_partial(dest);

                    if attempt < self.max_attempts {
                        let delay = self.retry_delay * attempt;
                        warn!(file = remote_path, attempt, error = %e, "fetch failed, retrying");
                        tokio::time::sleep(delay).await;
                    } else {
                        return Err(IngestError::fetch(remote_path, e));
                    }
                }
            }
        }

        unreachable!("retry loop always returns")
    }
}

fn remove_partial(dest: &Path) {
    if dest.exists() {
        if let Err(e) = fs::remove_file(dest) {
            warn!(file = %dest.display(), error = %e, "could not remove partial download");
        }
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};

    use tempfile::TempDir;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn should_build_partitioned_folder_path() {
        let as_of = NaiveDate::from_ymd_opt(2018, 8, 5).unwrap();
        assert_eq!(
            remote_folder("/data/imerg/gis", as_of),
            "/data/imerg/gis/2018/08"
        );
        assert_eq!(
            remote_folder("/data/imerg/gis/", as_of),
            "/data/imerg/gis/2018/08"
        );
    }

    #[tokio::test]
    async fn should_list_names_from_relay() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .and(query_param(
                "directory",
                "ftp://example.org/data/imerg/gis/2018/08/",
            ))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("a.1day.tif, b.3day.tif ,c.7day.tif,"),
            )
            .mount(&server)
            .await;

        let transport = RelayTransport::new(&server.uri(), "example.org").unwrap();
        let names = transport.list("/data/imerg/gis/2018/08").await.unwrap();

        assert_eq!(names, vec!["a.1day.tif", "b.3day.tif", "c.7day.tif"]);
    }

    #[tokio::test]
    async fn should_fetch_bytes_to_disk_via_relay() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .and(query_param(
                "url",
                "ftp://example.org/data/imerg/gis/2018/08/a.1day.tif",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"raster-bytes".to_vec()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("a.1day.tif");
        let transport = RelayTransport::new(&server.uri(), "example.org").unwrap();

        transport
            .fetch("/data/imerg/gis/2018/08/a.1day.tif", &dest)
            .await
            .unwrap();

        assert_eq!(fs::read(dest).unwrap(), b"raster-bytes");
    }

    #[tokio::test]
    async fn should_report_http_error_status_as_fetch_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("a.1day.tif");
        let transport = RelayTransport::new(&server.uri(), "example.org").unwrap();
        let client = RemoteClient::with_policy(transport, Duration::from_secs(5), 1, Duration::ZERO);

        let err = client.fetch("/x/a.1day.tif", &dest).await.unwrap_err();

        assert!(matches!(err, IngestError::Fetch { .. }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn should_time_out_a_hung_transfer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"slow".to_vec())
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("a.1day.tif");
        let transport = RelayTransport::new(&server.uri(), "example.org").unwrap();
        let client =
            RemoteClient::with_policy(transport, Duration::from_millis(50), 1, Duration::ZERO);

        let err = client.fetch("/x/a.1day.tif", &dest).await.unwrap_err();

        match err {
            IngestError::Fetch { source, .. } => {
                assert!(matches!(*source, IngestError::Timeout { .. }))
            }
            other => panic!("expected fetch error, got {other}"),
        }
        assert!(!dest.exists());
    }

    /// Transport stub that writes a partial file before failing, then
    /// succeeds once the failure budget is spent.
    struct FlakyTransport {
        failures: AtomicU32,
    }

    impl Transport for FlakyTransport {
        async fn list(&self, _folder: &str) -> Result<Vec<String>> {
            Ok(vec![])
        }

        async fn fetch(&self, _remote_path: &str, dest: &Path) -> Result<()> {
            if self.failures.fetch_sub(1, Ordering::SeqCst) > 0 {
                fs::write(dest, b"partial")?;
                return Err(io::Error::new(io::ErrorKind::Other, "transfer aborted").into());
            }

            fs::write(dest, b"complete")?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn should_remove_partial_file_and_retry() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("a.1day.tif");
        let transport = FlakyTransport {
            failures: AtomicU32::new(1),
        };
        let client = RemoteClient::with_policy(transport, Duration::from_secs(5), 2, Duration::ZERO);

        client.fetch("/x/a.1day.tif", &dest).await.unwrap();

        assert_eq!(fs::read(dest).unwrap(), b"complete");
    }

    #[tokio::test]
    async fn should_clean_up_after_exhausting_retries() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("a.1day.tif");
        let transport = FlakyTransport {
            failures: AtomicU32::new(10),
        };
        let client = RemoteClient::with_policy(transport, Duration::from_secs(5), 2, Duration::ZERO);

        let err = client.fetch("/x/a.1day.tif", &dest).await.unwrap_err();

        assert!(matches!(err, IngestError::Fetch { .. }));
        assert!(!dest.exists());
    }
}
