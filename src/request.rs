//! Request construction.
//!
//! Building is pure: the same base address, path, defaults and options always
//! yield the same [`PreparedRequest`]. Headers are applied in order (defaults
//! first, then each [`RequestOption`]) and later writes replace earlier ones.

use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde::Serialize;
use url::Url;

use crate::{HttpError, Result};

const APPLICATION_JSON: &str = "application/json";

/// Fully formed request handed to a [`Transport`](crate::Transport).
#[derive(Clone, Debug)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    /// Per-attempt timeout the transport should enforce.
    pub timeout: Option<Duration>,
}

impl PreparedRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
        }
    }

    /// Sets a header, replacing any previous value for the same name.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<()> {
        let invalid = || HttpError::InvalidHeader {
            name: name.to_owned(),
        };
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
        let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;
        self.headers.insert(header_name, header_value);
        Ok(())
    }

    /// Applies a single option.
    pub fn apply(&mut self, option: RequestOption) -> Result<()> {
        match option.0 {
            OptionKind::Query(pairs) => {
                if !pairs.is_empty() {
                    let mut query = self.url.query_pairs_mut();
                    for (key, value) in &pairs {
                        query.append_pair(key, value);
                    }
                }
                Ok(())
            }
            OptionKind::Json(encoded) => match encoded.map_err(HttpError::Encode)? {
                Some(body) => {
                    self.body = Some(body);
                    self.headers
                        .insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
                    Ok(())
                }
                None => Ok(()),
            },
            OptionKind::Headers(headers) => headers
                .iter()
                .try_for_each(|(name, value)| self.set_header(name, value)),
        }
    }
}

/// One ordered step applied to a request while it is built.
///
/// ```
/// use backoff_http::RequestOption;
///
/// let options = vec![
///     RequestOption::query([("page", "1"), ("tag", "a"), ("tag", "b")]),
///     RequestOption::json(&serde_json::json!({ "name": "test" })),
///     RequestOption::header("x-request-id", "42"),
/// ];
/// # let _ = options;
/// ```
#[derive(Debug)]
pub struct RequestOption(OptionKind);

#[derive(Debug)]
enum OptionKind {
    Query(Vec<(String, String)>),
    /// `Ok(None)` is a body that encoded to JSON `null`.
    Json(std::result::Result<Option<Bytes>, serde_json::Error>),
    Headers(Vec<(String, String)>),
}

impl RequestOption {
    /// Appends query pairs. Repeated keys keep every value, in order.
    pub fn query<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(OptionKind::Query(
            pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        ))
    }

    /// Appends query parameters given as key to list-of-values.
    pub fn query_values<I, K, V, S>(params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut pairs = Vec::new();
        for (key, values) in params {
            let key = key.into();
            for value in values {
                pairs.push((key.clone(), value.into()));
            }
        }
        Self(OptionKind::Query(pairs))
    }

    /// Encodes `body` as the JSON request body and sets
    /// `Content-Type: application/json`.
    ///
    /// A body that encodes to `null` (such as `None`) leaves the request
    /// untouched. Encoding failures surface when the request is built.
    pub fn json<T: Serialize + ?Sized>(body: &T) -> Self {
        let encoded = serde_json::to_vec(body)
            .map(|bytes| (bytes.as_slice() != b"null").then(|| Bytes::from(bytes)));
        Self(OptionKind::Json(encoded))
    }

    /// Sets one header, replacing earlier values for the same name.
    pub fn header(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self(OptionKind::Headers(vec![(name.into(), value.into())]))
    }

    /// Sets several headers in order.
    pub fn headers<I, K, V>(headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(OptionKind::Headers(
            headers
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        ))
    }

    /// Sets `Authorization: Bearer <token>`. A token that already starts with
    /// the bearer scheme, in any case, is not prefixed twice.
    pub fn bearer_auth(token: impl AsRef<str>) -> Self {
        Self::header(
            AUTHORIZATION.as_str(),
            bearer_value(token.as_ref()),
        )
    }
}

/// Joins `path` onto `base` with exactly one `/` between them.
///
/// The base query string is kept; `?` and `#` inside `path` are treated as
/// path characters, not as delimiters.
pub fn join_url(base: &str, path: &str) -> Result<Url> {
    let invalid = |reason: String| HttpError::InvalidUrl {
        url: base.to_owned(),
        reason,
    };
    let mut url = Url::parse(base).map_err(|err| invalid(err.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(invalid("base URL cannot carry a path".to_owned()));
    }

    let relative = path.trim_start_matches('/');
    if !relative.is_empty() {
        let joined = format!("{}/{}", url.path().trim_end_matches('/'), relative);
        url.set_path(&joined);
    }
    Ok(url)
}

/// Builds a request from its parts. Any failure here is permanent.
pub fn build_request<'h, D, O>(
    base_url: &str,
    method: Method,
    path: &str,
    default_headers: D,
    options: O,
) -> Result<PreparedRequest>
where
    D: IntoIterator<Item = (&'h str, &'h str)>,
    O: IntoIterator<Item = RequestOption>,
{
    let url = join_url(base_url, path)?;
    let mut request = PreparedRequest::new(method, url);
    for (name, value) in default_headers {
        request.set_header(name, value)?;
    }
    for option in options {
        request.apply(option)?;
    }
    Ok(request)
}

/// `Authorization` value for a token that may already carry its scheme.
fn bearer_value(token: &str) -> String {
    let token = token.trim();
    let credentials = match token.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim_start(),
        _ => token,
    };
    format!("Bearer {credentials}")
}
