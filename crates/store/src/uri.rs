use std::fmt;
use swipe_core::{Error, Result, REMOTE_URI_SCHEME};

/// A parsed `s3://bucket/key` object location
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectUri {
    pub bucket: String,
    pub key: String,
}

impl ObjectUri {
    pub fn parse(uri: &str) -> Result<Self> {
        let rest = uri.strip_prefix(REMOTE_URI_SCHEME).ok_or_else(|| {
            Error::configuration(format!("'{uri}' is not an {REMOTE_URI_SCHEME} URI"))
        })?;
        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() || key.is_empty() {
            return Err(Error::configuration(format!(
                "'{uri}' must name both a bucket and a key"
            )));
        }
        Ok(Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }
}

impl fmt::Display for ObjectUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{REMOTE_URI_SCHEME}{}/{}", self.bucket, self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_parse_and_display() {
        let uri = ObjectUri::parse("s3://bucket/run/cache/abc.json").unwrap();
        assert_eq!(uri.bucket, "bucket");
        assert_eq!(uri.key, "run/cache/abc.json");
        assert_eq!(uri.to_string(), "s3://bucket/run/cache/abc.json");
    }

    #[rstest]
    #[case("/local/file")]
    #[case("s3://bucket-only")]
    #[case("s3://bucket/")]
    #[case("gs://bucket/key")]
    fn test_rejects_non_object_uris(#[case] uri: &str) {
        assert!(ObjectUri::parse(uri).is_err());
    }
}
