//! Shared plumbing for the purlog binaries: tracing setup, signal
//! handling, database DSN resolution and duration parsing.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use purlog_witness::Dialect;
use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber.
///
/// Call once at startup. `RUST_LOG` overrides `level`; `json` switches to
/// line-delimited JSON output.
pub fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Wait for SIGTERM or SIGINT (Ctrl-C).
///
/// Resolving this future initiates graceful shutdown: servers stop
/// accepting and in-flight requests drain.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received SIGINT, shutting down"),
        () = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

/// Resolve the witness database selection flags into a dialect and DSN.
///
/// Exactly one of `database_path` and `db_dsn` must be set, and
/// `database_path` only combines with the sqlite dialect.
pub fn resolve_db(
    db_type: &str,
    database_path: Option<&str>,
    db_dsn: Option<&str>,
) -> Result<(Dialect, String)> {
    let dialect = Dialect::from_db_type(db_type).with_context(|| {
        format!("unsupported --db-type: {db_type}. Must be one of 'sqlite', 'mysql', 'postgres'")
    })?;

    match (database_path, db_dsn) {
        (None, None) | (Some(_), Some(_)) => {
            bail!("exactly one of --database-path or --db-dsn must be set")
        }
        (Some(path), None) => {
            if dialect != Dialect::Sqlite {
                bail!("--database-path can only be used with --db-type=sqlite");
            }
            Ok((dialect, format!("sqlite://{path}?mode=rwc")))
        }
        (None, Some(dsn)) => Ok((dialect, dsn.to_string())),
    }
}

/// Parse a duration flag: plain seconds (`"60"`) or `s`/`m`/`h` suffixed
/// (`"30s"`, `"5m"`, `"1h"`).
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    let (number, multiplier) = if let Some(n) = s.strip_suffix('h') {
        (n, 3600)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, 60)
    } else if let Some(n) = s.strip_suffix('s') {
        (n, 1)
    } else {
        (s, 1)
    };
    let value: u64 = number
        .trim()
        .parse()
        .with_context(|| format!("invalid duration {s:?}"))?;
    Ok(Duration::from_secs(value * multiplier))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("60").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_resolve_db_requires_exactly_one_source() {
        assert!(resolve_db("sqlite", None, None).is_err());
        assert!(resolve_db("sqlite", Some("/tmp/a.db"), Some("sqlite://x")).is_err());

        let (dialect, dsn) = resolve_db("sqlite", Some("/tmp/a.db"), None).unwrap();
        assert_eq!(dialect, Dialect::Sqlite);
        assert_eq!(dsn, "sqlite:///tmp/a.db?mode=rwc");
    }

    #[test]
    fn test_resolve_db_path_is_sqlite_only() {
        assert!(resolve_db("postgres", Some("/tmp/a.db"), None).is_err());
        let (dialect, dsn) =
            resolve_db("postgres", None, Some("postgres://u@localhost/tlog")).unwrap();
        assert_eq!(dialect, Dialect::Postgres);
        assert_eq!(dsn, "postgres://u@localhost/tlog");
    }

    #[test]
    fn test_resolve_db_rejects_unknown_type() {
        assert!(resolve_db("oracle", None, Some("x")).is_err());
    }
}
