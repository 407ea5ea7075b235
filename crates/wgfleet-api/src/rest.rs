// REST connector
//
// Maps the device's verb set onto its HTTPS REST surface:
//
//   print   -> GET    /rest{path}?k=v
//   add     -> PUT    /rest{path}            (JSON body)
//   set     -> PATCH  /rest{path}/{.id}      (JSON body)
//   remove  -> DELETE /rest{path}/{.id}
//   enable  -> POST   /rest{path}/enable     {"numbers": .id}
//   disable -> POST   /rest{path}/disable    {"numbers": .id}
//
// Every value comes back as a string, which is also what the binary
// protocol returns, so records look the same regardless of connector.

use std::time::Duration;

use reqwest::Method;
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::session::{Connector, DeviceCommand, DeviceSession, DeviceTarget, Params, Record};
use crate::transport::TransportConfig;

/// Path queried once after login to verify the credentials.
const IDENTITY_PATH: &str = "/system/identity";

/// Keys a caller may use to carry the resource handle for set/remove.
const ID_KEYS: [&str; 3] = [".id", "id", "numbers"];

/// Body characters quoted in error messages.
const PREVIEW_CHARS: usize = 200;

/// Opens [`RestSession`]s against a device.
#[derive(Debug, Clone, Default)]
pub struct RestConnector {
    transport: TransportConfig,
}

impl RestConnector {
    pub fn new(transport: TransportConfig) -> Self {
        Self { transport }
    }
}

impl Connector for RestConnector {
    fn connect(&self, target: &DeviceTarget) -> Result<Box<dyn DeviceSession>, Error> {
        let session = RestSession::open(target, &self.transport)?;
        Ok(Box::new(session))
    }
}

/// Error body the device sends with every non-2xx status.
#[derive(Debug, Deserialize)]
struct RestErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

/// One authenticated REST session.
pub struct RestSession {
    http: Client,
    base_url: Url,
    username: String,
    password: SecretString,
    timeout: Duration,
}

impl RestSession {
    /// Build a client for `target` and verify the credentials.
    pub fn open(target: &DeviceTarget, transport: &TransportConfig) -> Result<Self, Error> {
        let base_url = Url::parse(&format!(
            "{}://{}:{}/rest",
            transport.scheme(),
            target.host,
            target.port
        ))?;
        let http = transport.build_client(target.timeout)?;
        let session = Self::with_client(
            http,
            base_url,
            target.username.clone(),
            target.password.clone(),
            target.timeout,
        );

        debug!(host = %target.host, port = target.port, "verifying device credentials");
        session.send(session.request(Method::GET, IDENTITY_PATH, None)?)?;
        Ok(session)
    }

    /// Create a session around a pre-built client, without a login probe.
    ///
    /// `base_url` is the REST root, e.g. `https://10.0.0.1/rest`.
    pub fn with_client(
        http: Client,
        base_url: Url,
        username: String,
        password: SecretString,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            base_url,
            username,
            password,
            timeout,
        }
    }

    /// The REST root this session talks to.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── URL builders ─────────────────────────────────────────────────

    fn url(&self, path: &str, suffix: Option<&str>) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_end_matches('/');
        let path = if path.starts_with('/') {
            path.to_owned()
        } else {
            format!("/{path}")
        };
        let full = match suffix {
            Some(s) => format!("{base}{path}/{s}"),
            None => format!("{base}{path}"),
        };
        Ok(Url::parse(&full)?)
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        suffix: Option<&str>,
    ) -> Result<RequestBuilder, Error> {
        let url = self.url(path, suffix)?;
        debug!("{method} {url}");
        Ok(self
            .http
            .request(method, url)
            .basic_auth(&self.username, Some(self.password.expose_secret())))
    }

    // ── Response handling ────────────────────────────────────────────

    fn send(&self, builder: RequestBuilder) -> Result<Vec<Record>, Error> {
        let resp = builder.send().map_err(|e| self.map_transport(e))?;
        let status = resp.status();
        let body = resp.text().map_err(|e| self.map_transport(e))?;
        trace!(%status, len = body.len(), "device response");

        if status.is_success() {
            return parse_records(&body);
        }

        let message = error_message(status, &body);
        Err(match status {
            StatusCode::UNAUTHORIZED => Error::Authentication { message },
            StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT => Error::Connection(message),
            _ if message.to_ascii_lowercase().contains("already exists") => {
                Error::DuplicateEntry { message }
            }
            _ => Error::Device { message },
        })
    }

    fn map_transport(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout {
                timeout_secs: self.timeout.as_secs(),
            }
        } else if err.is_connect() {
            Error::Connection(err.to_string())
        } else if err.is_decode() {
            Error::MalformedResponse {
                message: err.to_string(),
            }
        } else {
            Error::Transport(err)
        }
    }
}

impl DeviceSession for RestSession {
    fn execute(
        &mut self,
        path: &str,
        command: DeviceCommand,
        params: &Params,
    ) -> Result<Vec<Record>, Error> {
        let builder = match command {
            DeviceCommand::Print => {
                let query: Vec<(&str, &str)> = params
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.as_str()))
                    .collect();
                self.request(Method::GET, path, None)?.query(&query)
            }
            DeviceCommand::Add => self.request(Method::PUT, path, None)?.json(params),
            DeviceCommand::Set => {
                let (id, body) = split_id(command, params)?;
                self.request(Method::PATCH, path, Some(&id))?.json(&body)
            }
            DeviceCommand::Remove => {
                let (id, _) = split_id(command, params)?;
                self.request(Method::DELETE, path, Some(&id))?
            }
            DeviceCommand::Enable | DeviceCommand::Disable => {
                let (id, _) = split_id(command, params)?;
                let body = serde_json::json!({ "numbers": id });
                self.request(Method::POST, path, Some(command.as_ref()))?
                    .json(&body)
            }
        };
        self.send(builder)
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

/// Pull the resource handle out of `params`, returning it and the rest.
fn split_id(command: DeviceCommand, params: &Params) -> Result<(String, Params), Error> {
    let mut rest = params.clone();
    for key in ID_KEYS {
        if let Some(id) = rest.shift_remove(key) {
            return Ok((id, rest));
        }
    }
    Err(Error::InvalidRequest(format!("{command} requires an .id parameter")))
}

fn error_message(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<RestErrorBody>(body) {
        Ok(RestErrorBody {
            detail: Some(detail),
            ..
        }) => detail,
        Ok(RestErrorBody {
            message: Some(message),
            ..
        }) => message,
        _ => format!("HTTP {status}: {}", preview(body)),
    }
}

/// Leading part of a body for error messages, cut on a char boundary.
fn preview(body: &str) -> &str {
    match body.char_indices().nth(PREVIEW_CHARS) {
        Some((end, _)) => &body[..end],
        None => body,
    }
}

/// Decode a REST body into flat records.
///
/// Accepts an array of objects (print), a single object (add/get) or an
/// empty body (remove, enable, disable).
pub(crate) fn parse_records(body: &str) -> Result<Vec<Record>, Error> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }

    let value: Value = serde_json::from_str(body).map_err(|e| {
        Error::MalformedResponse {
            message: format!("{e} (body preview: {:?})", preview(body)),
        }
    })?;

    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items.into_iter().map(record_from_value).collect(),
        obj @ Value::Object(_) => Ok(vec![record_from_value(obj)?]),
        other => Err(Error::MalformedResponse {
            message: format!("expected object or array, got {other}"),
        }),
    }
}

fn record_from_value(value: Value) -> Result<Record, Error> {
    let Value::Object(map) = value else {
        return Err(Error::MalformedResponse {
            message: format!("expected object row, got {value}"),
        });
    };
    Ok(map
        .into_iter()
        .map(|(k, v)| (k, scalar_to_string(v)))
        .collect())
}

fn scalar_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        Value::Array(items) => items
            .into_iter()
            .map(scalar_to_string)
            .collect::<Vec<_>>()
            .join(","),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parse_array_of_rows() {
        let body = r#"[{".id":"*1","name":"wg0","listen-port":"13231","running":"true"}]"#;
        let records = parse_records(body).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0][".id"], "*1");
        assert_eq!(records[0]["listen-port"], "13231");
    }

    #[test]
    fn parse_single_object_and_scalars() {
        let body = r#"{"ret":"*A","count":3,"flag":true,"list":["10.0.0.2/32","fd00::2/128"]}"#;
        let records = parse_records(body).unwrap();
        assert_eq!(records[0]["ret"], "*A");
        assert_eq!(records[0]["count"], "3");
        assert_eq!(records[0]["flag"], "true");
        assert_eq!(records[0]["list"], "10.0.0.2/32,fd00::2/128");
    }

    #[test]
    fn empty_body_is_no_rows() {
        assert!(parse_records("").unwrap().is_empty());
        assert!(parse_records("  \n").unwrap().is_empty());
        assert!(parse_records("[]").unwrap().is_empty());
    }

    #[test]
    fn garbage_is_malformed() {
        let err = parse_records("<html>oops</html>").unwrap_err();
        assert!(matches!(err, Error::MalformedResponse { .. }), "{err:?}");
        let err = parse_records("42").unwrap_err();
        assert!(matches!(err, Error::MalformedResponse { .. }), "{err:?}");
    }

    #[test]
    fn split_id_accepts_any_handle_key() {
        let mut params = Params::new();
        params.insert("numbers".into(), "*3".into());
        params.insert("comment".into(), "laptop".into());
        let (id, rest) = split_id(DeviceCommand::Set, &params).unwrap();
        assert_eq!(id, "*3");
        assert_eq!(rest.len(), 1);
        assert!(rest.contains_key("comment"));
    }

    #[test]
    fn split_id_without_handle_is_invalid() {
        let err = split_id(DeviceCommand::Remove, &Params::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn error_message_prefers_detail() {
        let body = r#"{"error":400,"message":"Bad Request","detail":"failure: entry already exists"}"#;
        assert_eq!(
            error_message(StatusCode::BAD_REQUEST, body),
            "failure: entry already exists"
        );
        assert_eq!(
            error_message(StatusCode::NOT_FOUND, r#"{"error":404,"message":"Not Found"}"#),
            "Not Found"
        );
    }

    #[test]
    fn multibyte_bodies_are_cut_on_char_boundaries() {
        let body = format!("{}é trailing", "x".repeat(199));

        let err = parse_records(&body).unwrap_err();
        let Error::MalformedResponse { message } = err else {
            panic!("expected MalformedResponse, got {err:?}");
        };
        assert!(message.contains('é'));
        assert!(!message.contains("trailing"));

        let message = error_message(StatusCode::INTERNAL_SERVER_ERROR, &body);
        assert!(message.starts_with("HTTP 500"));
        assert!(message.ends_with('é'));
    }
}
