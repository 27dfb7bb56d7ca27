//! Response interpretation.
//!
//! These functions never touch the network: they take an `HttpResponse` and
//! turn it into a parsed tree, a success check, or a list of typed records.
//! Mutating operations require `Result == "Success"`. List operations return
//! an empty vector when the list element is absent and only fail on an
//! explicit non-success `Result`.

use crate::error::{ApiError, Result};
use crate::http::HttpResponse;
use crate::request::Operation;
use crate::xml::Element;

pub const SUCCESS: &str = "Success";

/// Reject non-2xx statuses and parse the body.
pub fn parse_body(response: &HttpResponse) -> Result<Element> {
    if !(200..300).contains(&response.status) {
        return Err(ApiError::HttpError {
            status: response.status,
            body: response.body.clone(),
        });
    }
    Element::parse(&response.body)
}

/// `Ok` iff the response's `Result` element reads `Success`.
pub fn check_result(op: Operation, root: &Element) -> Result<()> {
    match root.child_text("Result") {
        Some(SUCCESS) => Ok(()),
        other => Err(remote_error(op, other.unwrap_or_default(), root)),
    }
}

/// Like `check_result`, but a response without any `Result` element passes.
pub fn check_result_if_present(op: Operation, root: &Element) -> Result<()> {
    match root.child("Result") {
        Some(_) => check_result(op, root),
        None => Ok(()),
    }
}

fn remote_error(op: Operation, result: &str, root: &Element) -> ApiError {
    let text = |name: &str| {
        root.child_text(name)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
    };
    ApiError::Remote {
        operation: op.as_str(),
        result: result.to_string(),
        code: text("ErrorCode"),
        message: text("ErrorMessage"),
    }
}

/// Parse and require success.
pub fn parse_success(op: Operation, response: &HttpResponse) -> Result<Element> {
    let root = parse_body(response)?;
    check_result(op, &root)?;
    Ok(root)
}

/// Text of a required top-level element of a successful response.
pub fn required_text<'a>(op: Operation, root: &'a Element, field: &'static str) -> Result<&'a str> {
    root.child_text(field)
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::MissingField {
            operation: op.as_str(),
            field,
        })
}

/// Decode every `entry` child of the `list` element. An absent list is empty.
pub fn parse_list<T>(
    op: Operation,
    response: &HttpResponse,
    list: &str,
    entry: &str,
    decode: impl Fn(&Element) -> Result<T>,
) -> Result<Vec<T>> {
    let root = parse_body(response)?;
    check_result_if_present(op, &root)?;
    match root.child(list) {
        Some(list) => list.children(entry).map(decode).collect(),
        None => Ok(Vec::new()),
    }
}
