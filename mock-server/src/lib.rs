//! In-process stand-in for the Mozenda REST endpoint.
//!
//! Serves `GET /rest` and multipart `POST /rest` with the same query
//! parameters and XML envelopes as the hosted service, backed by an
//! in-memory `Store`.

pub mod store;
pub mod xml;

use std::sync::Arc;

use axum::{
    extract::{Multipart, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::{net::TcpListener, sync::RwLock};

use crate::store::{Failure, Job, Store};

pub const DEFAULT_KEY: &str = "00000000-0000-0000-0000-000000000000";

/// Shared server state. Cloning yields another handle to the same store.
#[derive(Clone, Debug)]
pub struct MockState {
    store: Arc<RwLock<Store>>,
    key: Arc<str>,
}

impl Default for MockState {
    fn default() -> Self {
        Self::new(DEFAULT_KEY)
    }
}

impl MockState {
    pub fn new(key: &str) -> Self {
        Self {
            store: Arc::new(RwLock::new(Store::default())),
            key: Arc::from(key),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Mark every active job `Done`.
    pub async fn finish_jobs(&self) {
        self.store.write().await.finish_jobs();
    }

    /// Add a view to an existing collection. `None` if it does not exist.
    pub async fn add_view(&self, collection_id: u64, name: &str) -> Option<u64> {
        self.store.write().await.add_view(collection_id, name)
    }

    /// Reject `Agent.Run` once an agent has this many jobs.
    pub async fn set_run_limit(&self, limit: Option<usize>) {
        self.store.write().await.set_run_limit(limit);
    }

    /// The `AgentParameter.INDEX` sent with each run of `agent_id`, in order.
    pub async fn job_indexes(&self, agent_id: u64) -> Vec<Option<String>> {
        self.store
            .read()
            .await
            .jobs()
            .iter()
            .filter(|job| job.agent_id == Some(agent_id))
            .map(|job| job.index.clone())
            .collect()
    }

    pub async fn jobs(&self) -> Vec<Job> {
        self.store.read().await.jobs().to_vec()
    }

    /// The definition file uploaded for `agent_id`, byte for byte.
    pub async fn agent_definition(&self, agent_id: u64) -> Option<Vec<u8>> {
        self.store.read().await.agent_definition(agent_id).map(<[u8]>::to_vec)
    }

    /// The response document, or why it could not be written.
    async fn dispatch(&self, params: &[(String, String)], file: Option<&[u8]>) -> Result<String, String> {
        let operation = lookup(params, "Operation").unwrap_or_default();
        let outcome = if lookup(params, "WebServiceKey") != Some(self.key()) {
            Err(Failure::new("InvalidWebServiceKey", "The web service key is not valid"))
        } else {
            self.store.write().await.handle(operation, params, file)
        };
        match outcome {
            Ok(body) => {
                tracing::debug!(operation, "request succeeded");
                xml::envelope(operation, "Success", &body)
            }
            Err(failure) => {
                tracing::debug!(operation, code = failure.code, message = %failure.message, "request rejected");
                let body = xml::XmlBody::new()
                    .leaf("ErrorCode", failure.code)
                    .leaf("ErrorMessage", &failure.message)
                    .finish()?;
                xml::envelope(operation, "Error", &body)
            }
        }
    }
}

fn lookup<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.as_str())
}

pub fn app() -> Router {
    app_with_state(MockState::default())
}

pub fn app_with_state(state: MockState) -> Router {
    Router::new()
        .route("/rest", get(rest_get).post(rest_post))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with_state(listener, MockState::default()).await
}

pub async fn run_with_state(listener: TcpListener, state: MockState) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_state(state)).await
}

fn xml_response(document: Result<String, String>) -> Response {
    match document {
        Ok(body) => ([(header::CONTENT_TYPE, "text/xml; charset=utf-8")], body).into_response(),
        Err(err) => {
            tracing::warn!(error = %err, "response could not be written");
            (StatusCode::BAD_REQUEST, err).into_response()
        }
    }
}

async fn rest_get(State(state): State<MockState>, Query(params): Query<Vec<(String, String)>>) -> Response {
    xml_response(state.dispatch(&params, None).await)
}

async fn rest_post(
    State(state): State<MockState>,
    Query(params): Query<Vec<(String, String)>>,
    mut multipart: Multipart,
) -> Response {
    let mut file = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() != Some("file") {
                    continue;
                }
                match field.bytes().await {
                    Ok(bytes) => file = Some(bytes),
                    Err(err) => return err.into_response(),
                }
            }
            Ok(None) => break,
            Err(err) => return err.into_response(),
        }
    }
    xml_response(state.dispatch(&params, file.as_deref()).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[tokio::test]
    async fn wrong_key_is_rejected_before_dispatch() {
        let state = MockState::new("right");
        let xml = state
            .dispatch(&params(&[("WebServiceKey", "wrong"), ("Operation", "Agent.GetList")]), None)
            .await
            .unwrap();
        assert!(xml.contains("<AgentGetListResponse "));
        assert!(xml.contains("<Result>Error</Result><ErrorCode>InvalidWebServiceKey</ErrorCode>"));
    }

    #[tokio::test]
    async fn run_records_index() {
        let state = MockState::new("k");
        state
            .dispatch(&params(&[("WebServiceKey", "k"), ("Operation", "Agent.Add"), ("Name", "A")]), Some("<Agent/>".as_bytes()))
            .await
            .unwrap();
        let xml = state
            .dispatch(
                &params(&[
                    ("WebServiceKey", "k"),
                    ("Operation", "Agent.Run"),
                    ("AgentID", "1003"),
                    ("AgentParameter.INDEX", "1-4"),
                ]),
                None,
            )
            .await
            .unwrap();
        assert!(xml.contains("<Result>Success</Result><JobID>"));
        assert_eq!(state.job_indexes(1003).await, vec![Some("1-4".to_string())]);
    }

    #[tokio::test]
    async fn unwritable_operation_name_is_an_error() {
        let state = MockState::new("k");
        let err = state
            .dispatch(&params(&[("WebServiceKey", "k"), ("Operation", "Agent Get")]), None)
            .await
            .unwrap_err();
        assert!(err.contains("Agent GetResponse"));
    }
}
