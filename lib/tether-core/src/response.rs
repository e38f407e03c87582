//! HTTP response handling.
//!
//! [`Response`] is the buffered result of a transport call: status, headers
//! and body, with JSON/text decoding.

use std::collections::HashMap;

use bytes::Bytes;

/// HTTP response with status, headers, and body.
#[derive(Debug, Clone)]
pub struct Response<B = Bytes> {
    status: u16,
    headers: HashMap<String, String>,
    body: B,
}

impl<B> Response<B> {
    /// Creates a new response.
    #[must_use]
    pub fn new(status: u16, headers: HashMap<String, String>, body: B) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// HTTP status code.
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status
    }

    /// Status is 2xx.
    #[must_use]
    pub const fn ok(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Status is 401 Unauthorized.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Response headers.
    #[must_use]
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Single header value by name (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .or_else(|| {
                self.headers
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(name))
                    .map(|(_, value)| value)
            })
            .map(String::as_str)
    }

    /// Response body.
    #[must_use]
    pub const fn body(&self) -> &B {
        &self.body
    }

    /// Consume into body.
    #[must_use]
    pub fn into_body(self) -> B {
        self.body
    }
}

impl Response<Bytes> {
    /// Deserialize the response body as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> crate::Result<T> {
        crate::from_json(&self.body)
    }

    /// Get the response body as text.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not valid UTF-8.
    pub fn text(&self) -> Result<String, std::string::FromUtf8Error> {
        String::from_utf8(self.body.to_vec())
    }

    /// Turns a non-2xx response into [`crate::Error::Http`], keeping the body.
    ///
    /// Token producers use this to report a failed token endpoint call.
    ///
    /// # Errors
    ///
    /// Returns an error if the status is not 2xx.
    pub fn error_for_status(self, message: impl Into<String>) -> crate::Result<Self> {
        if self.ok() {
            Ok(self)
        } else {
            Err(crate::Error::http_with_body(
                self.status,
                message,
                self.body,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn challenge() -> Response {
        let mut headers = HashMap::new();
        headers.insert(
            "www-authenticate".to_string(),
            r#"Bearer realm="example""#.to_string(),
        );
        Response::new(401, headers, Bytes::new())
    }

    #[test]
    fn response_ok() {
        let response = Response::new(200, HashMap::new(), Bytes::from(r#"{"data":"foo"}"#));
        assert!(response.ok());
        assert!(!response.is_unauthorized());

        let response = Response::new(299, HashMap::new(), Bytes::new());
        assert!(response.ok());

        let response = Response::new(302, HashMap::new(), Bytes::new());
        assert!(!response.ok());
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let response = challenge();
        assert!(response.is_unauthorized());
        assert_eq!(
            response.header("WWW-Authenticate"),
            Some(r#"Bearer realm="example""#)
        );
        assert_eq!(response.header("Content-Type"), None);
    }

    #[test]
    fn response_json() {
        #[derive(Debug, PartialEq, serde::Deserialize)]
        struct Payload {
            data: String,
        }

        let response = Response::new(200, HashMap::new(), Bytes::from(r#"{"data":"foo"}"#));
        let payload: Payload = response.json().expect("deserialize");
        assert_eq!(
            payload,
            Payload {
                data: "foo".to_string()
            }
        );
    }

    #[test]
    fn response_text() {
        let response = Response::new(200, HashMap::new(), Bytes::from("Hello, World!"));
        assert_eq!(response.text().expect("text"), "Hello, World!");
    }

    #[test]
    fn error_for_status() {
        let response = Response::new(404, HashMap::new(), Bytes::from("missing"));
        let err = response
            .error_for_status("Token not found")
            .expect_err("404");
        assert!(err.is_not_found());
        assert_eq!(err.body(), Some(&Bytes::from("missing")));

        let response = Response::new(200, HashMap::new(), Bytes::new());
        assert!(response.error_for_status("unused").is_ok());
    }
}
