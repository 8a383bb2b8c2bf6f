//! HTTP request methods, for the transport and the demo server.

// https://developer.mozilla.org/en-US/docs/Web/HTTP/Methods

use std::fmt;

use anyhow::{Result, bail};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HttpRequestMethod {
    #[default]
    GET,
    HEAD,
    POST,
    PUT,
    DELETE,
    CONNECT,
    OPTIONS,
    TRACE,
    PATCH,
}

impl HttpRequestMethod {
    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "GET" => Ok(Self::GET),
            "HEAD" => Ok(Self::HEAD),
            "POST" => Ok(Self::POST),
            "PUT" => Ok(Self::PUT),
            "PATCH" => Ok(Self::PATCH),
            "DELETE" => Ok(Self::DELETE),
            "OPTIONS" => Ok(Self::OPTIONS),
            "CONNECT" => Ok(Self::CONNECT),
            "TRACE" => Ok(Self::TRACE),
            _ => bail!("invalid http request method {s:?}")
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::GET => "GET",
            Self::HEAD => "HEAD",
            Self::POST => "POST",
            Self::PUT => "PUT",
            Self::PATCH => "PATCH",
            Self::DELETE => "DELETE",
            Self::OPTIONS => "OPTIONS",
            Self::CONNECT => "CONNECT",
            Self::TRACE => "TRACE",
        }
    }

    /// Whether requests with this method carry form data in the body
    /// (instead of the query string).
    pub fn has_body(self) -> bool {
        match self {
            Self::POST | Self::PUT | Self::PATCH | Self::DELETE => true,
            _ => false
        }
    }
}

impl std::str::FromStr for HttpRequestMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        HttpRequestMethod::from_str(s)
    }
}

impl fmt::Display for HttpRequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn t_parse() {
        assert_eq!(HttpRequestMethod::from_str("DELETE").unwrap(), HttpRequestMethod::DELETE);
        assert!(HttpRequestMethod::from_str("get").is_err());
        let m: HttpRequestMethod = "PUT".parse().unwrap();
        assert_eq!(m.to_string(), "PUT");
        assert_eq!(HttpRequestMethod::default(), HttpRequestMethod::GET);
        assert!(HttpRequestMethod::POST.has_body());
        assert!(!HttpRequestMethod::HEAD.has_body());
    }
}
