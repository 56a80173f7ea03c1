use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::RepositoryError;
use crate::model::DataSource;

/// Read-only source of exchange descriptions.
pub trait DataSourceRepository {
    fn find_all(&self) -> Result<Vec<DataSource>, RepositoryError>;

    fn find_by_id(&self, id: i64) -> Result<DataSource, RepositoryError> {
        self.find_all()?
            .into_iter()
            .find(|source| source.id == id)
            .ok_or(RepositoryError::NotFound(id))
    }
}

/// Data sources stored as a JSON array in a file.
#[derive(Debug, Clone)]
pub struct JsonFileRepository {
    path: PathBuf,
}

impl JsonFileRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DataSourceRepository for JsonFileRepository {
    fn find_all(&self) -> Result<Vec<DataSource>, RepositoryError> {
        let raw = fs::read_to_string(&self.path).map_err(|source| RepositoryError::Io {
            path: self.path.display().to_string(),
            source,
        })?;

        let sources = parse_data_sources(&raw)?;
        debug!(path = %self.path.display(), count = sources.len(), "data sources loaded");
        Ok(sources)
    }
}

pub fn parse_data_sources(raw: &str) -> Result<Vec<DataSource>, RepositoryError> {
    Ok(serde_json::from_str(raw)?)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    const SOURCES: &str = r#"[
        {
            "id": 2,
            "name": "binance",
            "connection_string": "wss://stream.binance.com:9443/ws",
            "rate_limit": 200,
            "symbol_pairs": [
                {
                    "id": 1,
                    "market": { "id": 1, "name": "spot" },
                    "base": { "id": 10, "name": "BTC" },
                    "quote": { "id": 11, "name": "USDT" }
                }
            ]
        },
        {
            "id": 7,
            "name": "bitfinex",
            "connection_string": "wss://api-pub.bitfinex.com/ws/2",
            "credentials": { "login": "bot", "password": "secret" }
        }
    ]"#;

    #[test]
    fn parses_optional_fields() {
        let sources = parse_data_sources(SOURCES).unwrap();

        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].rate_limit, 200);
        assert_eq!(sources[0].symbol_pairs[0].concatenated(), "BTCUSDT");
        assert!(sources[0].credentials.is_none());
        assert_eq!(sources[1].rate_limit, 0);
        assert!(sources[1].symbol_pairs.is_empty());
        assert_eq!(sources[1].credentials.as_ref().unwrap().login, "bot");
    }

    #[test]
    fn finds_sources_by_id_in_a_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SOURCES.as_bytes()).unwrap();
        let repository = JsonFileRepository::new(file.path());

        assert_eq!(repository.find_by_id(7).unwrap().name, "bitfinex");
        assert!(matches!(
            repository.find_by_id(3),
            Err(RepositoryError::NotFound(3))
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let repository = JsonFileRepository::new("/nonexistent/data_sources.json");
        assert!(matches!(
            repository.find_all(),
            Err(RepositoryError::Io { .. })
        ));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            parse_data_sources("{\"id\": 2}"),
            Err(RepositoryError::Parse(_))
        ));
    }
}
