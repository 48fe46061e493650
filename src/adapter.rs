//! Conversion between `http` types and the canonical request/response model.
//!
//! [`to_request`] reads and parses the body under a size limit;
//! [`to_response`] serialises a canonical response. Both host modes (the
//! edge `fetch` function and the socket server) go through here.
//!
//! # Body parsing
//!
//! | Content-Type | Result |
//! |---|---|
//! | `application/json`, any `+json` suffix | [`Body::Json`] |
//! | `application/x-www-form-urlencoded` | [`Body::Form`] |
//! | `multipart/form-data` | [`Body::Multipart`] |
//! | anything else | [`Body::Text`], or [`Body::Bytes`] if not UTF-8 |
//!
//! An empty body is `None` whatever the content type.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use http_body_util::{BodyExt, Full};

use crate::body::{Body, Fields, Headers, Part, append};
use crate::error::{BoxError, Error};
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;

/// 1 MiB.
pub const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;

const JSON: &str = "application/json";
const FORM: &str = "application/x-www-form-urlencoded";
const MULTIPART: &str = "multipart/form-data";

// ── Inbound ───────────────────────────────────────────────────────────────────

/// Converts a native request into canonical form.
///
/// Fails with [`Error::PayloadTooLarge`] as soon as the body is known to
/// exceed `max_body_size`: immediately if `Content-Length` says so, otherwise
/// while streaming. A body of exactly `max_body_size` bytes is accepted.
pub async fn to_request<B>(native: http::Request<B>, max_body_size: usize) -> Result<Request, Error>
where
    B: hyper::body::Body,
    B::Error: Into<BoxError>,
{
    let (parts, body) = native.into_parts();
    let method: Method = parts.method.as_str().parse()?;

    let query = match parts.uri.query() {
        Some(raw) => parse_pairs(raw.as_bytes(), Keys::Lowercase).map_err(Error::Query)?,
        None => None,
    };

    let raw = read_body(body, &parts.headers, max_body_size).await?;
    let body = parse_body(&parts.headers, raw).await?;

    Ok(Request {
        method,
        path: parts.uri.path().to_owned(),
        header: fold_headers(&parts.headers),
        query,
        param: None,
        body,
    })
}

fn fold_headers(headers: &HeaderMap) -> Option<Headers> {
    if headers.is_empty() {
        return None;
    }
    let mut folded = Headers::new();
    for (name, value) in headers {
        append(&mut folded, name.as_str().to_owned(), String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    Some(folded)
}

/// How keys of a urlencoded map are stored.
#[derive(Clone, Copy)]
enum Keys {
    /// Query strings: `Tag` and `tag` are the same key.
    Lowercase,
    /// Form bodies: keys are data and stay as sent.
    AsSent,
}

/// Parses `a=1&b=2&a=3` into a field map, folding repeats in order.
fn parse_pairs(raw: &[u8], keys: Keys) -> Result<Option<Fields<String>>, serde_urlencoded::de::Error> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(raw)?;
    if pairs.is_empty() {
        return Ok(None);
    }
    let mut fields = Fields::new();
    for (key, value) in pairs {
        let key = match keys {
            Keys::Lowercase => key.to_ascii_lowercase(),
            Keys::AsSent => key,
        };
        append(&mut fields, key, value);
    }
    Ok(Some(fields))
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers.get(CONTENT_LENGTH)?.to_str().ok()?.trim().parse().ok()
}

async fn read_body<B>(body: B, headers: &HeaderMap, limit: usize) -> Result<Bytes, Error>
where
    B: hyper::body::Body,
    B::Error: Into<BoxError>,
{
    let too_large = |size: u64| Error::PayloadTooLarge { size, limit: limit as u64 };

    if let Some(declared) = declared_length(headers) {
        if declared > limit as u64 {
            return Err(too_large(declared));
        }
    }

    let mut body = std::pin::pin!(body);
    let mut buf = BytesMut::new();
    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(|e| Error::Body(e.into()))?;
        let Ok(data) = frame.into_data() else { continue };

        let received = buf.len() + data.remaining();
        if received > limit {
            return Err(too_large(received as u64));
        }
        buf.put(data);
    }
    Ok(buf.freeze())
}

async fn parse_body(headers: &HeaderMap, raw: Bytes) -> Result<Option<Body>, Error> {
    if raw.is_empty() {
        return Ok(None);
    }

    let content_type = headers.get(CONTENT_TYPE).and_then(|value| value.to_str().ok());
    let parsed = content_type.and_then(|value| value.parse::<mime::Mime>().ok());

    let body = match parsed {
        Some(m) if m.subtype() == mime::JSON || m.suffix() == Some(mime::JSON) => {
            Body::Json(serde_json::from_slice(&raw).map_err(|e| Error::body_parse(JSON, e))?)
        }
        Some(m) if m.type_() == mime::APPLICATION && m.subtype() == mime::WWW_FORM_URLENCODED => {
            let fields = parse_pairs(&raw, Keys::AsSent).map_err(|e| Error::body_parse(FORM, e))?;
            Body::Form(fields.unwrap_or_default())
        }
        Some(m) if m.type_() == mime::MULTIPART && m.subtype() == mime::FORM_DATA => {
            Body::Multipart(parse_multipart(content_type.unwrap_or_default(), raw).await?)
        }
        _ => match std::str::from_utf8(&raw) {
            Ok(text) => Body::Text(text.to_owned()),
            Err(_) => Body::Bytes(raw),
        },
    };
    Ok(Some(body))
}

async fn parse_multipart(content_type: &str, raw: Bytes) -> Result<Fields<Part>, Error> {
    let boundary = multer::parse_boundary(content_type).map_err(|e| Error::body_parse(MULTIPART, e))?;
    let stream = futures_util::stream::once(async move { Ok::<_, std::io::Error>(raw) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    let mut fields = Fields::new();
    while let Some(field) = multipart.next_field().await.map_err(|e| Error::body_parse(MULTIPART, e))? {
        let name = field.name().unwrap_or_default().to_owned();
        let file_name = field.file_name().map(str::to_owned);
        let content_type = field.content_type().map(ToString::to_string);
        let data = field.bytes().await.map_err(|e| Error::body_parse(MULTIPART, e))?;
        append(&mut fields, name, Part { file_name, content_type, data });
    }
    Ok(fields)
}

// ── Outbound ──────────────────────────────────────────────────────────────────

/// Converts a canonical response into a native one.
///
/// List-valued headers are emitted as repeated header lines. Text and bytes
/// bodies go out untouched with no inferred content type; structured bodies
/// are JSON-encoded and get `content-type: application/json` unless the
/// response already names a content type.
pub fn to_response(response: Response) -> Result<http::Response<Full<Bytes>>, Error> {
    let status = StatusCode::from_u16(response.status_code)
        .map_err(|_| Error::InvalidResponseStatusCode(response.status_code))?;

    let mut headers = HeaderMap::new();
    for (name, values) in response.header.iter().flatten() {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|_| Error::InvalidHeader(name.clone()))?;
        for value in values.iter() {
            let header_value = HeaderValue::from_str(value).map_err(|_| Error::InvalidHeader(name.clone()))?;
            headers.append(header_name.clone(), header_value);
        }
    }

    let payload = match response.body {
        None | Some(Body::Json(serde_json::Value::Null)) => Bytes::new(),
        Some(Body::Text(text)) => Bytes::from(text),
        Some(Body::Bytes(bytes)) => bytes,
        Some(structured) => {
            let encoded = structured.to_json().unwrap_or_else(|| Ok(Vec::new())).map_err(Error::other)?;
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON));
            }
            Bytes::from(encoded)
        }
    };

    let mut native = http::Response::new(Full::new(payload));
    *native.status_mut() = status;
    *native.headers_mut() = headers;
    Ok(native)
}
