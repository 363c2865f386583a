//! Request classification and the three decode strategies.
//!
//! A decode call checks the request envelope (method, length, content type),
//! reads the body once and then either deserializes JSON directly or builds
//! a canonical JSON document from form-like input. The destination and the
//! validator both see that same document.

use http::header::CONTENT_LENGTH;
use http::Request;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};

use crate::body::Body;
use crate::canonical::build_canonical;
use crate::error::{DecodeError, ErrorKind, FormError};
use crate::form::{
    content_type, content_type_param, flatten_json_object, has_content_type, parse_multipart,
    parse_urlencoded, FormValues,
};
use crate::options::DecoderOptions;
use crate::paths::list_paths;
use crate::types::{
    json_type_name, SchemaPath, CONTENT_TYPE_JSON, CONTENT_TYPE_MULTIPART_FORM,
    CONTENT_TYPE_URL_ENCODED_FORM,
};
use crate::validator::validate_payload;

/// Decodes HTTP request bodies into typed values.
///
/// The decoder itself is stateless; everything per call lives in
/// [`DecoderOptions`], so one decoder can serve any number of threads.
#[derive(Debug, Default, Clone, Copy)]
pub struct Decoder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    Json,
    FlattenedJson,
    Form,
}

impl Decoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode the body of `request` into a `T`.
    ///
    /// With `keep_request_body`, the request's body is replaced by an
    /// in-memory copy so later consumers can read it again.
    ///
    /// # Errors
    ///
    /// Returns a `DecodeError`; its [`kind`](DecodeError::kind) tells client
    /// faults from misconfiguration.
    pub fn decode<T>(
        &self,
        request: &mut Request<Body>,
        options: &DecoderOptions,
    ) -> Result<T, DecodeError>
    where
        T: DeserializeOwned,
    {
        let result = self.decode_request(request, options);
        if let Err(err) = &result {
            match err.kind() {
                ErrorKind::Internal => error!(
                    method = %request.method(),
                    error = %err,
                    "unable to decode request body"
                ),
                ErrorKind::BadRequest => debug!(
                    method = %request.method(),
                    error = %err,
                    "rejected request body"
                ),
            }
        }
        result
    }

    /// Like [`decode`](Self::decode), but writes into an existing value.
    ///
    /// `destination` is only replaced on success.
    pub fn decode_into<T>(
        &self,
        request: &mut Request<Body>,
        destination: &mut T,
        options: &DecoderOptions,
    ) -> Result<(), DecodeError>
    where
        T: DeserializeOwned,
    {
        *destination = self.decode(request, options)?;
        Ok(())
    }

    fn decode_request<T>(
        &self,
        request: &mut Request<Body>,
        options: &DecoderOptions,
    ) -> Result<T, DecodeError>
    where
        T: DeserializeOwned,
    {
        let strategy = self.validate_request(request, options)?;
        debug!(
            method = %request.method(),
            content_type = content_type(request.headers()),
            ?strategy,
            "decoding request body"
        );

        match strategy {
            Strategy::Json => self.decode_json(request, options),
            Strategy::FlattenedJson => self.decode_flattened_json(request, options),
            Strategy::Form => self.decode_form(request, options),
        }
    }

    fn validate_request(
        &self,
        request: &Request<Body>,
        options: &DecoderOptions,
    ) -> Result<Strategy, DecodeError> {
        let method = request.method().as_str();
        if !options.allows_method(method) {
            return Err(DecodeError::MethodNotAllowed {
                method: method.to_string(),
                allowed: options.allowed_methods.clone(),
            });
        }

        if content_length(request) == Some(0) {
            return Err(DecodeError::EmptyBody);
        }

        let headers = request.headers();
        if !has_content_type(headers, &options.allowed_content_types) {
            return Err(DecodeError::UnsupportedContentType {
                method: method.to_string(),
                content_type: content_type(headers).to_string(),
                allowed: options.allowed_content_types.clone(),
            });
        }

        if has_content_type(headers, &[CONTENT_TYPE_JSON]) {
            if options.json_flattened {
                Ok(Strategy::FlattenedJson)
            } else {
                Ok(Strategy::Json)
            }
        } else if has_content_type(
            headers,
            &[CONTENT_TYPE_MULTIPART_FORM, CONTENT_TYPE_URL_ENCODED_FORM],
        ) {
            Ok(Strategy::Form)
        } else {
            Err(DecodeError::UnknownDecoder {
                content_type: content_type(headers).to_string(),
            })
        }
    }

    fn decode_json<T>(
        &self,
        request: &mut Request<Body>,
        options: &DecoderOptions,
    ) -> Result<T, DecodeError>
    where
        T: DeserializeOwned,
    {
        let bytes = read_body(request, options)?;
        let payload: Value =
            serde_json::from_slice(&bytes).map_err(|source| DecodeError::InvalidJson { source })?;
        let decoded = T::deserialize(&payload).map_err(|source| DecodeError::InvalidJson { source })?;
        validate_payload(&payload, options)?;
        Ok(decoded)
    }

    fn decode_flattened_json<T>(
        &self,
        request: &mut Request<Body>,
        options: &DecoderOptions,
    ) -> Result<T, DecodeError>
    where
        T: DeserializeOwned,
    {
        let paths = schema_paths(options)?;
        let bytes = read_body(request, options)?;
        let payload: Value =
            serde_json::from_slice(&bytes).map_err(|source| DecodeError::InvalidJson { source })?;
        let values = flatten_json_object(&payload).ok_or(DecodeError::NotAnObject {
            actual: json_type_name(&payload),
        })?;

        decode_canonical(&values, &paths, options)
    }

    fn decode_form<T>(
        &self,
        request: &mut Request<Body>,
        options: &DecoderOptions,
    ) -> Result<T, DecodeError>
    where
        T: DeserializeOwned,
    {
        let paths = schema_paths(options)?;
        let bytes = read_body(request, options)?;
        let values = parse_form(request, &bytes).map_err(|source| DecodeError::MalformedForm {
            method: request.method().to_string(),
            source,
        })?;

        decode_canonical(&values, &paths, options)
    }
}

fn content_length(request: &Request<Body>) -> Option<u64> {
    request
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .or_else(|| request.body().size_hint())
}

/// Read the body once, putting an in-memory copy back if asked to.
fn read_body(request: &mut Request<Body>, options: &DecoderOptions) -> Result<Vec<u8>, DecodeError> {
    let body = std::mem::take(request.body_mut());
    let bytes = body
        .into_bytes()
        .map_err(|source| DecodeError::ReadBody { source })?;
    if options.keep_request_body {
        *request.body_mut() = Body::from(bytes.clone());
    }
    Ok(bytes)
}

fn schema_paths(options: &DecoderOptions) -> Result<Vec<SchemaPath>, DecodeError> {
    let compiler = options.compiler.as_ref().ok_or(DecodeError::MissingSchema)?;
    list_paths(
        &options.schema_ref,
        compiler,
        options.max_circular_reference_depth,
    )
    .map_err(|source| DecodeError::SchemaPaths {
        reference: options.schema_ref.clone(),
        source,
    })
}

fn parse_form(request: &Request<Body>, bytes: &[u8]) -> Result<FormValues, FormError> {
    let headers = request.headers();
    if has_content_type(headers, &[CONTENT_TYPE_MULTIPART_FORM]) {
        let boundary = content_type_param(content_type(headers), "boundary")
            .filter(|b| !b.is_empty())
            .ok_or(FormError::MissingBoundary)?;
        parse_multipart(bytes, &boundary)
    } else {
        parse_urlencoded(bytes)
    }
}

/// Build the canonical document, deserialize it, then validate it.
fn decode_canonical<T>(
    values: &FormValues,
    paths: &[SchemaPath],
    options: &DecoderOptions,
) -> Result<T, DecodeError>
where
    T: DeserializeOwned,
{
    let document = build_canonical(values, paths, options.parse_error_strategy)?;
    let decoded =
        T::deserialize(&document).map_err(|source| DecodeError::InvalidJson { source })?;
    validate_payload(&document, options)?;
    Ok(decoded)
}
