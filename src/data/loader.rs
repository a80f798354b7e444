//! Source Loader Module
//! Fetches the raw case-count and economic tables as Polars frames.

use crate::error::PipelineError;
use polars::prelude::*;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Johns Hopkins CSSE global confirmed-case time series.
pub const DEFAULT_COVID_URL: &str = "https://raw.githubusercontent.com/CSSEGISandData/COVID-19/master/csse_covid_19_data/csse_covid_19_time_series/time_series_covid19_confirmed_global.csv";

pub const DEFAULT_ECONOMIC_PATH: &str = "economic_data_sample.csv";

const INFER_SCHEMA_ROWS: usize = 10000;

/// The two untouched input tables.
#[derive(Debug, Clone)]
pub struct RawSources {
    /// Wide case counts: one row per country/province, one column per date.
    pub cases: DataFrame,
    /// Economic indicators: one row per (country, year).
    pub economic: DataFrame,
}

/// Anything that can produce the raw tables.
pub trait SourceLoader {
    fn load(&self) -> Result<RawSources, PipelineError>;
}

impl<L: SourceLoader + ?Sized> SourceLoader for Box<L> {
    fn load(&self) -> Result<RawSources, PipelineError> {
        (**self).load()
    }
}

/// Read a local CSV file.
pub fn read_csv_file(path: &Path) -> Result<DataFrame, PipelineError> {
    let source_name = path.display().to_string();
    if !path.is_file() {
        return Err(PipelineError::fetch(&source_name, "file not found"));
    }

    LazyCsvReader::new(path)
        .with_infer_schema_length(Some(INFER_SCHEMA_ROWS))
        .finish()
        .and_then(|lazy| lazy.collect())
        .map_err(|e| PipelineError::fetch(&source_name, e))
}

/// Parse an in-memory CSV document, e.g. an HTTP response body.
pub fn read_csv_bytes(source_name: &str, bytes: Vec<u8>) -> Result<DataFrame, PipelineError> {
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(INFER_SCHEMA_ROWS))
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()
        .map_err(|e| PipelineError::fetch(source_name, e))
}

/// Downloads the case table over HTTP and reads the economic table from disk.
pub struct RemoteSourceLoader {
    covid_url: String,
    economic_path: PathBuf,
    http_client: reqwest::blocking::Client,
}

impl RemoteSourceLoader {
    pub fn new(covid_url: &str, economic_path: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let http_client = reqwest::blocking::Client::builder()
            .user_agent(concat!("covid-dashboard/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PipelineError::fetch(covid_url, e))?;

        Ok(Self {
            covid_url: covid_url.to_string(),
            economic_path: economic_path.into(),
            http_client,
        })
    }

    fn fetch_cases(&self) -> Result<DataFrame, PipelineError> {
        info!(url = %self.covid_url, "Downloading case counts");

        let response = self
            .http_client
            .get(&self.covid_url)
            .send()
            .map_err(|e| PipelineError::fetch(&self.covid_url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::fetch(
                &self.covid_url,
                format!("HTTP status {}", status),
            ));
        }

        let body = response
            .bytes()
            .map_err(|e| PipelineError::fetch(&self.covid_url, e))?;
        debug!(bytes = body.len(), "Case count download complete");

        read_csv_bytes(&self.covid_url, body.to_vec())
    }
}

impl SourceLoader for RemoteSourceLoader {
    fn load(&self) -> Result<RawSources, PipelineError> {
        let cases = self.fetch_cases()?;
        let economic = read_csv_file(&self.economic_path)?;
        Ok(RawSources { cases, economic })
    }
}

/// Reads both tables from local CSV files.
pub struct FileSourceLoader {
    cases_path: PathBuf,
    economic_path: PathBuf,
}

impl FileSourceLoader {
    pub fn new(cases_path: impl Into<PathBuf>, economic_path: impl Into<PathBuf>) -> Self {
        Self {
            cases_path: cases_path.into(),
            economic_path: economic_path.into(),
        }
    }
}

impl SourceLoader for FileSourceLoader {
    fn load(&self) -> Result<RawSources, PipelineError> {
        info!(path = %self.cases_path.display(), "Reading case counts");
        let cases = read_csv_file(&self.cases_path)?;
        let economic = read_csv_file(&self.economic_path)?;
        Ok(RawSources { cases, economic })
    }
}

/// When a memoized load goes stale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CachePolicy {
    /// `None` keeps the value until [`MemoizedLoader::invalidate`] is called.
    pub ttl: Option<Duration>,
}

impl CachePolicy {
    pub fn until_invalidated() -> Self {
        Self { ttl: None }
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self { ttl: Some(ttl) }
    }
}

/// Caches the result of an inner loader between pipeline runs.
pub struct MemoizedLoader<L: SourceLoader> {
    inner: L,
    policy: CachePolicy,
    cached: Option<(Instant, RawSources)>,
    fetch_count: usize,
}

impl<L: SourceLoader> MemoizedLoader<L> {
    pub fn new(inner: L, policy: CachePolicy) -> Self {
        Self {
            inner,
            policy,
            cached: None,
            fetch_count: 0,
        }
    }

    /// Return the cached tables, loading them first if absent or expired.
    /// Errors are returned as-is and leave the cache empty.
    pub fn load(&mut self) -> Result<RawSources, PipelineError> {
        if let Some((loaded_at, sources)) = &self.cached {
            let fresh = self
                .policy
                .ttl
                .map_or(true, |ttl| loaded_at.elapsed() < ttl);
            if fresh {
                debug!("Serving sources from cache");
                return Ok(sources.clone());
            }
            debug!("Cached sources expired");
        }

        self.cached = None;
        let sources = self.inner.load()?;
        self.fetch_count += 1;
        self.cached = Some((Instant::now(), sources.clone()));
        Ok(sources)
    }

    /// Drop the cached value; the next [`load`](Self::load) refetches.
    pub fn invalidate(&mut self) {
        if self.cached.take().is_some() {
            info!("Source cache invalidated");
        }
    }

    pub fn is_cached(&self) -> bool {
        self.cached.is_some()
    }

    /// How many times the inner loader has succeeded.
    pub fn fetch_count(&self) -> usize {
        self.fetch_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    struct CountingLoader {
        calls: Cell<usize>,
        fail: bool,
    }

    impl CountingLoader {
        fn new(fail: bool) -> Self {
            Self {
                calls: Cell::new(0),
                fail,
            }
        }
    }

    impl SourceLoader for CountingLoader {
        fn load(&self) -> Result<RawSources, PipelineError> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err(PipelineError::fetch("test", "unreachable"));
            }
            let cases = df!("Country/Region" => ["Chile"], "1/1/21" => [1i64])?;
            let economic = df!(
                "Country" => ["Chile"],
                "Year" => [2021i64],
                "GDP" => [1.0],
                "Unemployment" => [2.0]
            )?;
            Ok(RawSources { cases, economic })
        }
    }

    #[test]
    fn memoized_loader_reuses_value_until_invalidated() {
        let mut loader = MemoizedLoader::new(CountingLoader::new(false), CachePolicy::default());
        loader.load().unwrap();
        loader.load().unwrap();
        assert_eq!(loader.fetch_count(), 1);
        assert!(loader.is_cached());

        loader.invalidate();
        assert!(!loader.is_cached());
        loader.load().unwrap();
        assert_eq!(loader.fetch_count(), 2);
        assert_eq!(loader.inner.calls.get(), 2);
    }

    #[test]
    fn memoized_loader_refetches_after_ttl() {
        let mut loader = MemoizedLoader::new(
            CountingLoader::new(false),
            CachePolicy::with_ttl(Duration::ZERO),
        );
        loader.load().unwrap();
        loader.load().unwrap();
        assert_eq!(loader.fetch_count(), 2);

        let mut long_lived = MemoizedLoader::new(
            CountingLoader::new(false),
            CachePolicy::with_ttl(Duration::from_secs(3600)),
        );
        long_lived.load().unwrap();
        long_lived.load().unwrap();
        assert_eq!(long_lived.fetch_count(), 1);
    }

    #[test]
    fn memoized_loader_does_not_cache_failures() {
        let mut loader = MemoizedLoader::new(CountingLoader::new(true), CachePolicy::default());
        assert!(matches!(loader.load(), Err(PipelineError::Fetch { .. })));
        assert!(loader.load().is_err());
        assert!(!loader.is_cached());
        assert_eq!(loader.inner.calls.get(), 2);
        assert_eq!(loader.fetch_count(), 0);
    }

    #[test]
    fn missing_file_is_a_fetch_error() {
        let loader = FileSourceLoader::new("/nonexistent/cases.csv", "/nonexistent/econ.csv");
        assert!(matches!(loader.load(), Err(PipelineError::Fetch { .. })));
    }

    #[test]
    fn reads_csv_from_bytes_and_files() {
        let body = b"Country/Region,1/22/20\nChile,3\n".to_vec();
        let df = read_csv_bytes("memory", body).unwrap();
        assert_eq!(df.height(), 1);
        assert_eq!(df.width(), 2);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Country,Year,GDP,Unemployment").unwrap();
        writeln!(file, "Chile,2021,3200.5,8.1").unwrap();
        file.flush().unwrap();
        let df = read_csv_file(file.path()).unwrap();
        assert_eq!(df.height(), 1);
        assert_eq!(df.width(), 4);
    }

    /// Serve a single canned HTTP response on a loopback port.
    fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf);
                let _ = stream.write_all(response.as_bytes());
            }
        });
        format!("http://{}/cases.csv", addr)
    }

    #[test]
    fn non_success_status_is_a_fetch_error() {
        let url = serve_once(
            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );
        let loader = RemoteSourceLoader::new(&url, "/nonexistent/econ.csv").unwrap();
        match loader.load() {
            Err(PipelineError::Fetch { message, .. }) => {
                assert!(message.contains("404"), "{}", message)
            }
            other => panic!("expected fetch error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn downloaded_body_is_parsed_as_csv() {
        let url = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 31\r\nConnection: close\r\n\r\nCountry/Region,1/22/20\nChile,3\n",
        );
        let loader = RemoteSourceLoader::new(&url, "/nonexistent/econ.csv").unwrap();
        let cases = loader.fetch_cases().unwrap();
        assert_eq!(cases.height(), 1);
        assert_eq!(cases.width(), 2);
    }

    #[test]
    fn malformed_csv_body_is_a_fetch_error() {
        let ragged = b"Country/Region,1/22/20\nChile,3,9,12\n".to_vec();
        assert!(matches!(
            read_csv_bytes("memory", ragged),
            Err(PipelineError::Fetch { .. })
        ));
    }
}
