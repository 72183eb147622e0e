//! Connection descriptors parsed from `supersql://host[:port][/schema]?k=v`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use supersql_protocol::DEFAULT_PORT;
use url::{form_urlencoded, Url};

use crate::error::ClientError;

pub const SCHEME: &str = "supersql";
pub const DEFAULT_SCHEMA: &str = "default";

/// Characters escaped in a catalog or schema path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

fn decode_segment(segment: &str) -> Result<String, ClientError> {
    percent_decode_str(segment)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|e| ClientError::InvalidArgument(format!("address path segment '{}': {}", segment, e)))
}

/// Where and how to open sessions. Immutable; holds no live resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    host: String,
    port: u16,
    catalog: Option<String>,
    schema: String,
    options: BTreeMap<String, String>,
}

impl ConnectionDescriptor {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            catalog: None,
            schema: DEFAULT_SCHEMA.to_string(),
            options: BTreeMap::new(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn with_catalog(mut self, catalog: impl Into<String>) -> Self {
        self.catalog = Some(catalog.into());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Parse an address string.
    pub fn parse(address: &str) -> Result<Self, ClientError> {
        let url = Url::parse(address.trim())
            .map_err(|e| ClientError::InvalidArgument(format!("invalid address '{}': {}", address, e)))?;

        if url.scheme() != SCHEME {
            return Err(ClientError::InvalidArgument(format!(
                "unsupported scheme '{}', expected '{}'",
                url.scheme(),
                SCHEME
            )));
        }

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ClientError::InvalidArgument(format!("address '{}' has no host", address)))?
            .to_string();

        let segments = url
            .path_segments()
            .map(|s| {
                s.filter(|seg| !seg.is_empty())
                    .map(decode_segment)
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();
        let (catalog, schema) = match segments.as_slice() {
            [] => (None, DEFAULT_SCHEMA.to_string()),
            [schema] => (None, schema.clone()),
            [catalog, schema] => (Some(catalog.clone()), schema.clone()),
            _ => {
                return Err(ClientError::InvalidArgument(format!(
                    "address path '{}' has more than catalog/schema",
                    url.path()
                )))
            }
        };

        let options = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        Ok(Self {
            host,
            port: url.port().unwrap_or(DEFAULT_PORT),
            catalog,
            schema,
            options,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn catalog(&self) -> Option<&str> {
        self.catalog.as_deref()
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Extra options, passed to the engine verbatim as session parameters.
    pub fn options(&self) -> &BTreeMap<String, String> {
        &self.options
    }

    /// `host:port`, suitable for `TcpStream::connect`.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl FromStr for ConnectionDescriptor {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}/", SCHEME, self.host, self.port)?;
        if let Some(catalog) = &self.catalog {
            write!(f, "{}/", utf8_percent_encode(catalog, SEGMENT))?;
        }
        write!(f, "{}", utf8_percent_encode(&self.schema, SEGMENT))?;
        if !self.options.is_empty() {
            let query = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(&self.options)
                .finish();
            write!(f, "?{}", query)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let d = ConnectionDescriptor::parse("supersql://engine.local").unwrap();
        assert_eq!(d.host(), "engine.local");
        assert_eq!(d.port(), 7911);
        assert_eq!(d.schema(), "default");
        assert_eq!(d.catalog(), None);
        assert!(d.options().is_empty());
    }

    #[test]
    fn test_full_address() {
        let d = ConnectionDescriptor::parse(
            "supersql://10.0.0.5:8080/sales?session.timezone=UTC&source=etl",
        )
        .unwrap();
        assert_eq!(d.host(), "10.0.0.5");
        assert_eq!(d.port(), 8080);
        assert_eq!(d.schema(), "sales");
        assert_eq!(d.options().get("session.timezone").map(String::as_str), Some("UTC"));
        assert_eq!(d.options().get("source").map(String::as_str), Some("etl"));
        assert_eq!(d.socket_addr(), "10.0.0.5:8080");
    }

    #[test]
    fn test_catalog_and_schema() {
        let d = ConnectionDescriptor::parse("supersql://h/hive/web").unwrap();
        assert_eq!(d.catalog(), Some("hive"));
        assert_eq!(d.schema(), "web");
    }

    #[test]
    fn test_rejects_bad_addresses() {
        assert!(ConnectionDescriptor::parse("http://h:1/x").is_err());
        assert!(ConnectionDescriptor::parse("not a url").is_err());
        assert!(ConnectionDescriptor::parse("supersql://h/a/b/c").is_err());
    }

    #[test]
    fn test_path_segments_are_decoded() {
        let d = ConnectionDescriptor::parse("supersql://h/my%20catalog/sales%2Feu?tag=a%26b").unwrap();
        assert_eq!(d.catalog(), Some("my catalog"));
        assert_eq!(d.schema(), "sales/eu");
        assert_eq!(d.options().get("tag").map(String::as_str), Some("a&b"));
        assert!(ConnectionDescriptor::parse("supersql://h/%FF").is_err());
    }

    #[test]
    fn test_display_escapes_what_parse_decodes() {
        let d = ConnectionDescriptor::new("h")
            .with_catalog("my catalog")
            .with_schema("50%/eu")
            .with_option("tag", "a&b c");
        let back: ConnectionDescriptor = d.to_string().parse().unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn test_display_round_trips() {
        let d = ConnectionDescriptor::new("h")
            .with_port(1234)
            .with_catalog("hive")
            .with_schema("s")
            .with_option("a", "1");
        let back: ConnectionDescriptor = d.to_string().parse().unwrap();
        assert_eq!(back, d);
    }
}
