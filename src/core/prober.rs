//! Single-attempt reachability checks. A `Prober` never throws past its caller;
//! every outcome is a `Result<(), ProbeError>` tagged with a classification, and
//! the envelope/breaker pattern-match on that tag instead of on exception types.

use crate::config::{SslMode, Target};
use crate::error::ProbeError;
use async_trait::async_trait;
use std::time::{Duration, Instant};

/// Dependency-injection seam for the probe transports, mirroring the
/// `HttpClientTrait`/`ClockTrait` split used for network probing elsewhere in this
/// codebase: production code talks to real sockets, tests talk to a fake.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Attempt the target once, bounded by its own timeout. Latency is measured
    /// by the caller so every implementation's success and failure paths agree
    /// on what "latency" means.
    async fn attempt(&self, target: &Target) -> Result<(), ProbeError>;
}

/// Clock abstraction so retry/breaker timing tests don't depend on wall time.
pub trait ClockTrait: Send + Sync {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

impl ClockTrait for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Run one timed attempt through `prober` and produce the `ProbeOutcome`-shaped
/// `(healthy, latency, error)` triple the rest of the pipeline consumes.
pub async fn timed_attempt(
    prober: &dyn Prober,
    target: &Target,
) -> (bool, f64, Option<String>, crate::error::ErrorKind) {
    let start = Instant::now();
    match prober.attempt(target).await {
        Ok(()) => (true, start.elapsed().as_secs_f64(), None, crate::error::ErrorKind::Retryable),
        Err(err) => (
            false,
            start.elapsed().as_secs_f64(),
            Some(err.message.clone()),
            err.kind,
        ),
    }
}

/// HTTP GET against `target.url`, healthy iff the status equals `expected_status`.
pub struct HttpProber {
    client: isahc::HttpClient,
}

impl HttpProber {
    pub fn new() -> Result<Self, isahc::Error> {
        Ok(Self {
            client: isahc::HttpClient::new()?,
        })
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn attempt(&self, target: &Target) -> Result<(), ProbeError> {
        let Target::Http(site) = target else {
            return Err(ProbeError::fatal("HttpProber received a non-HTTP target"));
        };

        use isahc::config::{Configurable, RedirectPolicy};
        use isahc::AsyncReadResponseExt;

        let request = isahc::Request::get(&site.url)
            .redirect_policy(RedirectPolicy::Follow)
            .timeout(Duration::from_secs(site.timeout as u64))
            .body(())
            .map_err(|e| ProbeError::fatal(format!("invalid request: {e}")))?;

        let response = self.client.send_async(request).await;

        let mut response = match response {
            Ok(resp) => resp,
            Err(e) => {
                return Err(classify_isahc_error(&e));
            }
        };

        // Drain the body so the connection can be reused by the pool.
        let mut sink = Vec::new();
        let _ = response.copy_to(&mut sink).await;

        let status = response.status().as_u16();
        if status == site.expected_status {
            Ok(())
        } else if (500..600).contains(&status) {
            Err(ProbeError::retryable(format!(
                "unexpected status {status} (expected {})",
                site.expected_status
            )))
        } else {
            Err(ProbeError::fatal(format!(
                "unexpected status {status} (expected {})",
                site.expected_status
            )))
        }
    }
}

fn classify_isahc_error(err: &isahc::Error) -> ProbeError {
    use isahc::error::ErrorKind as IsahcKind;
    let retryable = matches!(
        err.kind(),
        IsahcKind::ConnectionFailed
            | IsahcKind::Timeout
            | IsahcKind::NameResolution
            | IsahcKind::TlsEngine
            | IsahcKind::Io
    );
    let message = err.to_string();
    if retryable {
        ProbeError::retryable(message)
    } else {
        ProbeError::fatal(message)
    }
}

/// `SELECT 1` against a PostgreSQL target. Connection timeout is a fixed 5s
/// regardless of the overall probe deadline.
pub struct DatabaseProber;

impl DatabaseProber {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DatabaseProber {
    fn default() -> Self {
        Self::new()
    }
}

const DB_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
impl Prober for DatabaseProber {
    async fn attempt(&self, target: &Target) -> Result<(), ProbeError> {
        let Target::Database(db) = target else {
            return Err(ProbeError::fatal("DatabaseProber received a non-database target"));
        };

        let connect = connect_and_check(db);
        match tokio::time::timeout(DB_CONNECT_TIMEOUT, connect).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::retryable("connection timeout")),
        }
    }
}

async fn connect_and_check(db: &crate::config::DatabaseTarget) -> Result<(), ProbeError> {
    let config = build_connect_config(db);

    // §4.1/§6: sslmode picks the connection strategy, not just whether TLS runs.
    // `allow`/`prefer` try one transport and fall back to the other; `require`
    // skips cert/hostname checks entirely; `verify-ca`/`verify-full` differ only
    // in whether the hostname is checked against the cert.
    let client = match db.sslmode {
        SslMode::Disable => connect_plain(&config).await.map_err(classify_postgres_error)?,
        SslMode::Allow => match connect_plain(&config).await {
            Ok(client) => client,
            Err(_) => connect_tls(&config, false, false).await?,
        },
        SslMode::Prefer => match connect_tls(&config, false, false).await {
            Ok(client) => client,
            Err(_) => connect_plain(&config).await.map_err(classify_postgres_error)?,
        },
        SslMode::Require => connect_tls(&config, false, false).await?,
        SslMode::VerifyCa => connect_tls(&config, false, true).await?,
        SslMode::VerifyFull => connect_tls(&config, true, true).await?,
    };

    let row = client
        .query_one("SELECT 1", &[])
        .await
        .map_err(|e| ProbeError::fatal(format!("query error: {e}")))?;
    let value: i32 = row
        .try_get(0)
        .map_err(|e| ProbeError::fatal(format!("unexpected query result: {e}")))?;

    if value == 1 {
        Ok(())
    } else {
        Err(ProbeError::fatal("query returned unexpected result"))
    }
}

async fn connect_plain(config: &str) -> Result<tokio_postgres::Client, tokio_postgres::Error> {
    let (client, connection) = tokio_postgres::connect(config, tokio_postgres::NoTls).await?;
    tokio::spawn(async move {
        let _ = connection.await;
    });
    Ok(client)
}

/// `verify_hostname` and `verify_cert` independently gate `native_tls`'s
/// `danger_accept_invalid_hostnames`/`danger_accept_invalid_certs`: both false
/// is `require`, cert-only is `verify-ca`, both true is `verify-full`.
async fn connect_tls(
    config: &str,
    verify_hostname: bool,
    verify_cert: bool,
) -> Result<tokio_postgres::Client, ProbeError> {
    let connector = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(!verify_cert)
        .danger_accept_invalid_hostnames(!verify_hostname)
        .build()
        .map_err(|e| ProbeError::fatal(format!("TLS setup failed: {e}")))?;
    let tls = postgres_native_tls::MakeTlsConnector::new(connector);
    let (client, connection) = tokio_postgres::connect(config, tls)
        .await
        .map_err(classify_postgres_error)?;
    tokio::spawn(async move {
        let _ = connection.await;
    });
    Ok(client)
}

fn build_connect_config(db: &crate::config::DatabaseTarget) -> String {
    format!(
        "host={} port={} dbname={} user={} password={}",
        db.host, db.port, db.database, db.username, db.password
    )
}

fn classify_postgres_error(err: tokio_postgres::Error) -> ProbeError {
    let message = err.to_string();
    let lower = message.to_lowercase();
    if lower.contains("password") || lower.contains("authentication") {
        ProbeError::fatal(format!("authentication failed: {message}"))
    } else if lower.contains("timeout") || lower.contains("connection") || lower.contains("refused")
    {
        ProbeError::retryable(format!("connection failed: {message}"))
    } else {
        ProbeError::fatal(message)
    }
}
