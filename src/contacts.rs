//! The demo server's in-memory contacts and its request handling.
//! The handler is a plain function of method, path and body, so the
//! server loop only moves bytes.

use std::sync::Mutex;

use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::http_request_method::HttpRequestMethod;

pub const INVALID_CONTACTS_MESSAGE: &str =
    "Invalid request. New contacts must be of type {array} and must be more than 0.";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ContactsError {
    #[error("contact {index} is not an object")]
    NotAnObject { index: usize },
    #[error("contact {index} needs a non-empty \"name\" string")]
    MissingName { index: usize },
}

#[derive(Debug, Default)]
pub struct Contacts {
    contacts: Mutex<Vec<Value>>,
}

impl Contacts {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Value>> {
        // a panicking holder cannot leave the Vec half-updated
        self.contacts.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self) -> Vec<Value> {
        self.lock().clone()
    }

    /// All or nothing: one invalid contact rejects the batch. Returns
    /// the complete list after adding.
    pub fn add(&self, new: Vec<Value>) -> Result<Vec<Value>, ContactsError> {
        for (index, c) in new.iter().enumerate() {
            let obj = c.as_object().ok_or(ContactsError::NotAnObject { index })?;
            match obj.get("name").and_then(Value::as_str) {
                Some(name) if !name.trim().is_empty() => (),
                _ => return Err(ContactsError::MissingName { index }),
            }
        }
        let mut contacts = self.lock();
        contacts.extend(new);
        Ok(contacts.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    fn ok(body: Value) -> Self {
        ApiResponse { status: 200, body }
    }

    fn error(status: u16, message: &str) -> Self {
        ApiResponse { status, body: json!({"status": "error", "message": message}) }
    }
}

/// The `contacts` field of a POST body: a JSON array, or a string
/// holding one, in a JSON or form encoded body.
fn posted_contacts(content_type: Option<&str>, body: &[u8]) -> Option<Vec<Value>> {
    let is_json = content_type
        .map_or(false, |c| c.trim_start().to_ascii_lowercase().starts_with("application/json"));
    let field = if is_json {
        let v: Value = serde_json::from_slice(body).ok()?;
        v.get("contacts")?.clone()
    } else {
        let (_, s) = url::form_urlencoded::parse(body).find(|(k, _)| k == "contacts")?;
        Value::String(s.into_owned())
    };
    let contacts = match field {
        Value::String(s) => serde_json::from_str(&s).ok()?,
        v => v,
    };
    match contacts {
        Value::Array(a) if !a.is_empty() => Some(a),
        _ => None,
    }
}

pub fn handle(
    contacts: &Contacts,
    method: HttpRequestMethod,
    path: &str,
    content_type: Option<&str>,
    body: &[u8],
) -> ApiResponse {
    let path = path.split('?').next().unwrap_or("");
    if path.trim_end_matches('/') != "/contacts" {
        return ApiResponse::error(404, "Not found.")
    }
    match method {
        HttpRequestMethod::GET =>
            ApiResponse::ok(json!({"status": "success", "data": contacts.get()})),
        HttpRequestMethod::POST => {
            let new = match posted_contacts(content_type, body) {
                Some(new) => new,
                None => {
                    debug!("POST /contacts: no usable contacts array");
                    return ApiResponse::ok(json!({
                        "status": "error",
                        "message": INVALID_CONTACTS_MESSAGE,
                    }))
                }
            };
            let n = new.len();
            match contacts.add(new) {
                Ok(all) => {
                    info!("added {n} contacts, {} in total", all.len());
                    ApiResponse::ok(json!({
                        "status": "success",
                        "message": "New contacts added successfully.",
                        "data": all,
                    }))
                }
                Err(e) => ApiResponse::ok(json!({
                    "status": "failure",
                    "message": e.to_string(),
                })),
            }
        }
        HttpRequestMethod::DELETE | HttpRequestMethod::PUT =>
            ApiResponse::error(501, &format!("{method} /contacts is not implemented.")),
        _ => ApiResponse::error(405, "Method not allowed."),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use HttpRequestMethod::*;

    const FORM: Option<&str> = Some("application/x-www-form-urlencoded");
    const JSON: Option<&str> = Some("application/json; charset=utf-8");

    #[test]
    fn t_get_and_post() {
        let c = Contacts::new();
        let r = handle(&c, GET, "/contacts", None, b"");
        assert_eq!(r, ApiResponse::ok(json!({"status": "success", "data": []})));

        let body = r#"{"contacts": "[{\"name\": \"Craig\"}]"}"#;
        let r = handle(&c, POST, "/contacts", JSON, body.as_bytes());
        assert_eq!(r.status, 200);
        assert_eq!(r.body["status"], "success");
        assert_eq!(r.body["message"], "New contacts added successfully.");

        let form = "contacts=%5B%7B%22name%22%3A%22Tweek%22%7D%5D";
        let r = handle(&c, POST, "/contacts/", FORM, form.as_bytes());
        assert_eq!(r.body["data"], json!([{"name": "Craig"}, {"name": "Tweek"}]));

        let r = handle(&c, POST, "/contacts", JSON, br#"{"contacts": [{"name": "Clyde"}]}"#);
        assert_eq!(r.body["data"].as_array().map(Vec::len), Some(3));
        assert_eq!(handle(&c, GET, "/contacts?x=1", None, b"").body["data"][2]["name"], "Clyde");
    }

    #[test]
    fn t_invalid_posts() {
        let c = Contacts::new();
        for (ct, body) in [(FORM, "contacts=%5B%5D"),
                           (FORM, "contacts=%7B%7D"),
                           (FORM, "contacts=nonsense"),
                           (FORM, "other=1"),
                           (JSON, "{"),
                           (JSON, r#"{"contacts": 3}"#)] {
            let r = handle(&c, POST, "/contacts", ct, body.as_bytes());
            assert_eq!(r, ApiResponse::ok(json!({
                "status": "error",
                "message": INVALID_CONTACTS_MESSAGE,
            })), "{body}");
        }
        let r = handle(&c, POST, "/contacts", JSON, br#"{"contacts": [{"name": "A"}, {"age": 3}]}"#);
        assert_eq!(r.body, json!({"status": "failure",
                                  "message": "contact 1 needs a non-empty \"name\" string"}));
        assert!(c.get().is_empty());
    }

    #[test]
    fn t_other_routes() {
        let c = Contacts::new();
        assert_eq!(handle(&c, DELETE, "/contacts", None, b"").status, 501);
        let r = handle(&c, PUT, "/contacts", None, b"");
        assert_eq!(r.status, 501);
        assert_eq!(r.body["status"], "error");
        assert_eq!(handle(&c, PATCH, "/contacts", None, b"").status, 405);
        assert_eq!(handle(&c, GET, "/users", None, b"").status, 404);
    }

    #[test]
    fn t_model() {
        let c = Contacts::new();
        assert_eq!(c.add(vec![json!(1)]), Err(ContactsError::NotAnObject { index: 0 }));
        assert_eq!(c.add(vec![json!({"name": " "})]), Err(ContactsError::MissingName { index: 0 }));
        assert_eq!(c.add(vec![json!({"name": "Jimmy"})]).map(|v| v.len()), Ok(1));
    }
}
