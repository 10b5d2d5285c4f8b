use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProverError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Job source error: {0}")]
    Source(#[from] crate::api::SourceError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProverError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::SourceError;

    #[test]
    fn source_errors_convert() {
        let err: ProverError = SourceError::RateLimited("429".into()).into();
        assert!(matches!(err, ProverError::Source(_)));
        assert!(err.to_string().contains("rate limited"));
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: ProverError = io.into();
        assert!(matches!(err, ProverError::Io(_)));
    }
}
