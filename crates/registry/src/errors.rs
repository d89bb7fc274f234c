use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("test `{0}` not found")]
    NotFound(String),

    #[error("failed to read test directory `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse test definition `{path}`: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
