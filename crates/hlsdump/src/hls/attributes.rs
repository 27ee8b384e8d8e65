//! `KEY=VALUE,KEY="quoted,value"` attribute lists as found after
//! `#EXT-X-STREAM-INF:`.

use std::collections::HashMap;

use crate::hls::HlsError;

/// Parse an attribute list into a name -> value map.
///
/// Quoted values lose their quotes and may contain commas. Whitespace around
/// keys and unquoted values is trimmed. Empty items (`A=1,,B=2`) are skipped.
pub fn parse_attribute_list(input: &str) -> Result<HashMap<String, String>, HlsError> {
    let mut attrs = HashMap::new();
    let mut rest = input.trim();

    while !rest.is_empty() {
        if let Some(stripped) = rest.strip_prefix(',') {
            rest = stripped.trim_start();
            continue;
        }

        let Some((key, after_key)) = rest.split_once('=') else {
            return Err(malformed(input, format!("missing `=` in `{rest}`")));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(malformed(input, "empty attribute name"));
        }

        let after_key = after_key.trim_start();
        let (value, remainder) = if let Some(quoted) = after_key.strip_prefix('"') {
            let Some(end) = quoted.find('"') else {
                return Err(malformed(input, format!("unterminated quote after `{key}`")));
            };
            let remainder = quoted[end + 1..].trim_start();
            if !remainder.is_empty() && !remainder.starts_with(',') {
                return Err(malformed(
                    input,
                    format!("unexpected text after quoted value of `{key}`"),
                ));
            }
            (&quoted[..end], remainder)
        } else {
            match after_key.find(',') {
                Some(comma) => (after_key[..comma].trim_end(), &after_key[comma..]),
                None => (after_key.trim_end(), ""),
            }
        };

        attrs.insert(key.to_string(), value.to_string());
        rest = remainder;
    }

    Ok(attrs)
}

fn malformed(input: &str, reason: impl Into<String>) -> HlsError {
    HlsError::InvalidAttributeList {
        attributes: input.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_commas_are_not_separators() {
        let attrs = parse_attribute_list(
            r#"PROGRAM-ID=1,BANDWIDTH=246440,CODECS="mp4a.40.5,avc1.42000d",RESOLUTION=320x184"#,
        )
        .unwrap();

        assert_eq!(attrs.len(), 4);
        assert_eq!(attrs["PROGRAM-ID"], "1");
        assert_eq!(attrs["BANDWIDTH"], "246440");
        assert_eq!(attrs["CODECS"], "mp4a.40.5,avc1.42000d");
        assert_eq!(attrs["RESOLUTION"], "320x184");
    }

    #[test]
    fn quoted_value_at_the_end() {
        let attrs = parse_attribute_list(r#"BANDWIDTH=1280000,NAME="720p""#).unwrap();
        assert_eq!(attrs["NAME"], "720p");
        assert_eq!(attrs["BANDWIDTH"], "1280000");
    }

    #[test]
    fn empty_quoted_value_and_empty_items() {
        let attrs = parse_attribute_list(r#"AUDIO="",,BANDWIDTH=1"#).unwrap();
        assert_eq!(attrs["AUDIO"], "");
        assert_eq!(attrs["BANDWIDTH"], "1");
    }

    #[test]
    fn empty_input_gives_empty_map() {
        assert!(parse_attribute_list("").unwrap().is_empty());
    }

    #[test]
    fn unterminated_quote_is_rejected() {
        let err = parse_attribute_list(r#"BANDWIDTH=1,CODECS="avc1"#).unwrap_err();
        assert!(matches!(err, HlsError::InvalidAttributeList { .. }));
    }

    #[test]
    fn missing_equals_is_rejected() {
        let err = parse_attribute_list("BANDWIDTH=1,BOGUS").unwrap_err();
        assert!(matches!(err, HlsError::InvalidAttributeList { .. }));
    }
}
