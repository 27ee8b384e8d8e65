use crate::error::AppError;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::debug;

/// Parses `Name: value` strings into a header map.
///
/// The name and value are split at the first ':' and trimmed. Later entries
/// replace earlier ones with the same name.
pub fn parse_headers(headers: &[String]) -> Result<HeaderMap, AppError> {
    let mut map = HeaderMap::new();

    for header in headers {
        let (name, value) = header
            .split_once(':')
            .ok_or_else(|| AppError::InvalidInput(format!("Invalid header format: {header}")))?;

        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|e| AppError::InvalidInput(format!("Invalid header name in `{header}`: {e}")))?;
        let value = HeaderValue::from_str(value.trim())
            .map_err(|e| AppError::InvalidInput(format!("Invalid header value in `{header}`: {e}")))?;

        debug!(name = %name, "Added request header");
        map.insert(name, value);
    }

    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_headers() {
        let headers = parse_headers(&[
            "Referer: https://example.com/".to_string(),
            "Cookie:a=b; c=d".to_string(),
        ])
        .unwrap();

        assert_eq!(headers["referer"], "https://example.com/");
        assert_eq!(headers["cookie"], "a=b; c=d");
    }

    #[test]
    fn value_may_contain_colons() {
        let headers = parse_headers(&["Origin: https://example.com:8443".to_string()]).unwrap();
        assert_eq!(headers["origin"], "https://example.com:8443");
    }

    #[test]
    fn rejects_malformed_headers() {
        assert!(matches!(
            parse_headers(&["no-colon".to_string()]),
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            parse_headers(&["bad name: x".to_string()]),
            Err(AppError::InvalidInput(_))
        ));
    }
}
