//! Request/response collaborators. Replies are always delivered
//! through the event loop, never from within `request` itself.

use std::{collections::BTreeMap,
          io,
          path::{Component, Path, PathBuf},
          time::Duration};

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::{event_loop::EventLoop, http_request_method::HttpRequestMethod};

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub method: HttpRequestMethod,
    /// Sent as a form.
    pub data: Option<BTreeMap<String, String>>,
}

impl HttpRequest {
    pub fn get(url: &str) -> Self {
        HttpRequest { url: url.into(), method: HttpRequestMethod::GET, data: None }
    }

    pub fn post(url: &str, data: BTreeMap<String, String>) -> Self {
        HttpRequest { url: url.into(), method: HttpRequestMethod::POST, data: Some(data) }
    }

    pub fn with_method(mut self, method: HttpRequestMethod) -> Self {
        self.method = method;
        self
    }

    /// `data` in `application/x-www-form-urlencoded` form.
    pub fn form_body(&self) -> Option<String> {
        self.data.as_ref().map(|data| {
            url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(data.iter())
                .finish()
        })
    }
}

#[derive(Error, Debug)]
pub enum TransportError {
    /// Anything but 200; `body` is the raw response body.
    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("reading {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("response is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("request failed: {0}")]
    Http(String),
}

impl TransportError {
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type TransportResult = Result<Value, TransportError>;
pub type TransportCallback = Box<dyn FnOnce(TransportResult)>;

pub trait Transport {
    fn request(&self, request: HttpRequest, callback: TransportCallback);

    fn fetch(&self, request: HttpRequest, callback: impl FnOnce(TransportResult) + 'static)
    where Self: Sized
    {
        self.request(request, Box::new(callback))
    }
}

/// Serves JSON files below a base directory, for GET only, after
/// a fixed simulated latency.
#[derive(Debug, Clone)]
pub struct FileTransport {
    base: PathBuf,
    lp: EventLoop,
    latency: Duration,
}

fn status(status: u16, body: &str) -> TransportError {
    TransportError::Status { status, body: body.into() }
}

impl FileTransport {
    pub fn new(base: impl Into<PathBuf>, lp: &EventLoop) -> Self {
        FileTransport { base: base.into(), lp: lp.clone(), latency: Duration::ZERO }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// The file for `url`; query and fragment are ignored. `None` for
    /// paths leaving the base directory.
    fn path_of(&self, url: &str) -> Option<PathBuf> {
        let path = url.split(|c| c == '?' || c == '#').next().unwrap_or("");
        let path = path.trim_start_matches("./").trim_start_matches('/');
        if path.is_empty() {
            return None
        }
        let rel = Path::new(path);
        if !rel.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir)) {
            return None
        }
        Some(self.base.join(rel))
    }

    fn respond(&self, request: &HttpRequest) -> TransportResult {
        if request.method != HttpRequestMethod::GET {
            return Err(status(405, "Method Not Allowed"))
        }
        let path = self.path_of(&request.url).ok_or_else(|| status(404, "Not Found"))?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(status(404, "Not Found")),
            Err(source) => Err(TransportError::Io { path, source }),
        }
    }
}

impl Transport for FileTransport {
    fn request(&self, request: HttpRequest, callback: TransportCallback) {
        let result = self.respond(&request);
        debug!("{} {} -> {}", request.method, request.url,
               match &result { Ok(_) => "200".to_string(), Err(e) => e.to_string() });
        self.lp.set_timeout(self.latency, move || callback(result));
    }
}

/// Real HTTP. The request itself blocks; the reply is still handed
/// over on the next loop turn.
#[cfg(feature = "http-client")]
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    lp: EventLoop,
}

#[cfg(feature = "http-client")]
impl HttpTransport {
    pub fn new(lp: &EventLoop) -> Self {
        HttpTransport { client: reqwest::blocking::Client::new(), lp: lp.clone() }
    }

    fn respond(&self, request: &HttpRequest) -> TransportResult {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| TransportError::Http(e.to_string()))?;
        let builder = match request.form_body() {
            Some(body) if request.method.has_body() =>
                self.client.request(method, &request.url)
                    .header(reqwest::header::CONTENT_TYPE, FORM_CONTENT_TYPE)
                    .body(body),
            Some(query) => {
                let sep = if request.url.contains('?') { '&' } else { '?' };
                self.client.request(method, format!("{}{sep}{query}", request.url))
            }
            None => self.client.request(method, &request.url),
        };
        let builder = builder.header(reqwest::header::ACCEPT, "application/json");
        let response = builder.send().map_err(|e| TransportError::Http(e.to_string()))?;
        let code = response.status().as_u16();
        let body = response.text().map_err(|e| TransportError::Http(e.to_string()))?;
        if code == 200 {
            Ok(serde_json::from_str(&body)?)
        } else {
            Err(TransportError::Status { status: code, body })
        }
    }
}

#[cfg(feature = "http-client")]
impl Transport for HttpTransport {
    fn request(&self, request: HttpRequest, callback: TransportCallback) {
        let result = self.respond(&request);
        self.lp.defer(move || callback(result));
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::{cell::RefCell, rc::Rc};
    use anyhow::Result;
    use serde_json::json;

    fn fetch_now(t: &FileTransport, lp: &EventLoop, req: HttpRequest) -> TransportResult {
        let slot: Rc<RefCell<Option<TransportResult>>> = Default::default();
        let s = slot.clone();
        t.fetch(req, move |r| *s.borrow_mut() = Some(r));
        assert!(slot.borrow().is_none(), "replies must not be synchronous");
        lp.run();
        let r = slot.borrow_mut().take();
        r.expect("callback ran")
    }

    #[test]
    fn t_file_transport() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::create_dir(dir.path().join("data"))?;
        std::fs::write(dir.path().join("data/users.json"), r#"[{"name": "Kyle"}]"#)?;
        std::fs::write(dir.path().join("data/broken.json"), "[")?;
        let lp = EventLoop::new_virtual();
        let t = FileTransport::new(dir.path(), &lp).with_latency(Duration::from_millis(300));

        let v = fetch_now(&t, &lp, HttpRequest::get("./data/users.json?x=1"))?;
        assert_eq!(v, json!([{"name": "Kyle"}]));
        assert_eq!(lp.now(), Duration::from_millis(300));

        let e = fetch_now(&t, &lp, HttpRequest::get("/data/nope.json")).unwrap_err();
        assert_eq!(e.status(), Some(404));
        let e = fetch_now(&t, &lp, HttpRequest::get("data/../../etc/passwd")).unwrap_err();
        assert_eq!(e.status(), Some(404));
        let e = fetch_now(&t, &lp, HttpRequest::get("")).unwrap_err();
        assert_eq!(e.status(), Some(404));
        let e = fetch_now(&t, &lp, HttpRequest::post("data/users.json", BTreeMap::new()))
            .unwrap_err();
        match e {
            TransportError::Status { status, body } => {
                assert_eq!(status, 405);
                assert_eq!(body, "Method Not Allowed");
            }
            e => panic!("unexpected {e:?}"),
        }
        let e = fetch_now(&t, &lp, HttpRequest::get("data/broken.json")).unwrap_err();
        assert!(matches!(e, TransportError::Json(_)));
        Ok(())
    }

    #[test]
    fn t_form_body() {
        let mut data = BTreeMap::new();
        data.insert("contacts".to_string(), r#"[{"name":"Bebe & Co"}]"#.to_string());
        data.insert("a".to_string(), "1 2".to_string());
        let req = HttpRequest::post("/contacts", data);
        assert_eq!(req.form_body().unwrap(),
                   "a=1+2&contacts=%5B%7B%22name%22%3A%22Bebe+%26+Co%22%7D%5D");
        assert_eq!(HttpRequest::get("/x").form_body(), None);
        assert_eq!(HttpRequest::get("/x").with_method(HttpRequestMethod::PUT).method,
                   HttpRequestMethod::PUT);
    }
}
