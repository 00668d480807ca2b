//! Live channel identities
use std::fmt;
use std::str::FromStr;

use crate::error::{DatasourceError, Result};

/// Path segment used for the datasource's synthetic stream
pub const STREAM_PATH: &str = "stream";

/// Top-level routing scope of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Grafana,
    Plugin,
    Datasource,
    Stream,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Grafana => "grafana",
            Scope::Plugin => "plugin",
            Scope::Datasource => "ds",
            Scope::Stream => "stream",
        }
    }
}

impl FromStr for Scope {
    type Err = DatasourceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "grafana" => Ok(Scope::Grafana),
            "plugin" => Ok(Scope::Plugin),
            "ds" => Ok(Scope::Datasource),
            "stream" => Ok(Scope::Stream),
            other => Err(DatasourceError::Channel(format!("unknown scope '{}'", other))),
        }
    }
}

/// `scope/namespace/path` identity a client subscribes to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Channel {
    pub scope: Scope,
    pub namespace: String,
    pub path: String,
}

impl Channel {
    pub fn new(scope: Scope, namespace: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            scope,
            namespace: namespace.into(),
            path: path.into(),
        }
    }

    /// Channel owned by the datasource instance with the given id
    pub fn datasource(id: i64, path: impl Into<String>) -> Self {
        Self::new(Scope::Datasource, id.to_string(), path)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.scope.as_str(), self.namespace, self.path)
    }
}

impl FromStr for Channel {
    type Err = DatasourceError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.splitn(3, '/');
        let scope = parts.next().unwrap_or_default();
        let namespace = parts.next().unwrap_or_default();
        let path = parts.next().unwrap_or_default();

        if scope.is_empty() || namespace.is_empty() || path.is_empty() {
            return Err(DatasourceError::Channel(format!(
                "'{}' is not of the form scope/namespace/path",
                s
            )));
        }

        Ok(Self::new(scope.parse()?, namespace, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datasource_channel_display() {
        let channel = Channel::datasource(42, STREAM_PATH);
        assert_eq!(channel.to_string(), "ds/42/stream");
        assert_eq!(channel, Channel::datasource(42, "stream"));
    }

    #[test]
    fn test_parse_keeps_nested_path() {
        let channel: Channel = "plugin/my-app/a/b/c".parse().unwrap();
        assert_eq!(channel.scope, Scope::Plugin);
        assert_eq!(channel.namespace, "my-app");
        assert_eq!(channel.path, "a/b/c");
        assert_eq!(channel.to_string(), "plugin/my-app/a/b/c");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("ds/1".parse::<Channel>().is_err());
        assert!("ds//stream".parse::<Channel>().is_err());
        assert!("nope/1/stream".parse::<Channel>().is_err());
        assert!("".parse::<Channel>().is_err());
    }
}
