//! Error types for the Mozenda API client.
//!
//! # Design
//! Every operation returns `Result<T, ApiError>`. A response whose `Result`
//! element is not `Success` becomes `ApiError::Remote`, keeping the service's
//! error code and message. Argument checks that fail before any request is
//! sent land in `MissingArgument`. A chunked agent run that fails part-way
//! reports `PartialDispatch`, carrying the job IDs already started.

use crate::types::{AgentId, JobId};

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Errors returned by `MozendaClient` operations.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A required argument was zero, empty, or absent. No request was sent.
    #[error("missing required argument: {0}")]
    MissingArgument(&'static str),

    /// The client configuration could not be loaded.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The request never produced an HTTP response.
    #[error("transport failed: {0}")]
    Transport(String),

    /// The service answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// The response body is not well-formed XML.
    #[error("malformed XML response: {0}")]
    Xml(String),

    /// A value in the response could not be converted to the expected type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// The request payload could not be written.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The service reported `Result` other than `Success`.
    #[error("{operation} returned {result}{}", describe(.code, .message))]
    Remote {
        operation: &'static str,
        result: String,
        code: Option<String>,
        message: Option<String>,
    },

    /// A successful response lacked an element the operation depends on.
    #[error("{operation} response has no {field} element")]
    MissingField {
        operation: &'static str,
        field: &'static str,
    },

    /// A remote resource the operation depends on does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// `all_agent_jobs_done` was asked about an agent this client never ran.
    #[error("there are no jobs for AgentID: {0}")]
    NoJobsRecorded(AgentId),

    /// A chunked run stopped part-way. `job_ids` holds every job recorded for
    /// the agent up to the failing chunk; those jobs keep running remotely.
    #[error("agent run stopped after {} job(s): {source}", .job_ids.len())]
    PartialDispatch {
        #[source]
        source: Box<ApiError>,
        job_ids: Vec<JobId>,
    },

    /// Reading a local agent definition failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// True when the service itself rejected the operation.
    pub fn is_remote(&self) -> bool {
        match self {
            ApiError::Remote { .. } => true,
            ApiError::PartialDispatch { source, .. } => source.is_remote(),
            _ => false,
        }
    }
}

fn describe(code: &Option<String>, message: &Option<String>) -> String {
    match (code, message) {
        (Some(code), Some(message)) => format!(" ({code}: {message})"),
        (Some(code), None) => format!(" ({code})"),
        (None, Some(message)) => format!(": {message}"),
        (None, None) => String::new(),
    }
}
