use thiserror::Error;

/// Errors shared across the daemon's core types.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The URL could not be parsed or has no usable scheme/host.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// A string did not match any variant of a closed enum.
    #[error("unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CoreError::InvalidUrl("not a url".into());
        assert_eq!(err.to_string(), "invalid url: not a url");

        let err = CoreError::UnknownVariant {
            kind: "archive service",
            value: "ftp_mirror".into(),
        };
        assert_eq!(err.to_string(), "unknown archive service: ftp_mirror");
    }
}
