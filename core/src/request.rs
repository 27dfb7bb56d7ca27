//! Request construction for the Mozenda REST endpoint.
//!
//! # Design
//! The service exposes a single URL; the operation travels as a query
//! parameter next to the web service key and the service version. Every
//! request therefore starts with those three fields, followed by the
//! operation's own parameters in insertion order. Uploads (`Agent.Add`,
//! `Collection.AddItem`) keep the same query string and attach the XML
//! document as a `multipart/form-data` part named `file`.

use std::fmt;

use url::form_urlencoded;

use crate::config::ClientConfig;
use crate::http::{FileUpload, HttpMethod, HttpRequest};

/// Remote operations, named exactly as the service expects them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    AgentAdd,
    AgentDelete,
    AgentGet,
    AgentGetCombinedCollections,
    AgentGetJobs,
    AgentGetList,
    AgentRun,
    CollectionAdd,
    CollectionAddField,
    CollectionAddItem,
    CollectionClear,
    CollectionDelete,
    CollectionDeleteField,
    CollectionDeleteItem,
    CollectionGetFields,
    CollectionGetList,
    CollectionGetPublisher,
    CollectionGetViews,
    CollectionPublish,
    CollectionSetPublisher,
    CollectionSetUniqueFields,
    CollectionUpdateField,
    CollectionUpdateItem,
    JobCancel,
    JobGet,
    JobGetAgentProgress,
    JobGetList,
    JobPause,
    JobResume,
    ViewDeleteItems,
    ViewGetItems,
    ViewSetFields,
}

impl Operation {
    pub const ALL: [Operation; 32] = [
        Operation::AgentAdd,
        Operation::AgentDelete,
        Operation::AgentGet,
        Operation::AgentGetCombinedCollections,
        Operation::AgentGetJobs,
        Operation::AgentGetList,
        Operation::AgentRun,
        Operation::CollectionAdd,
        Operation::CollectionAddField,
        Operation::CollectionAddItem,
        Operation::CollectionClear,
        Operation::CollectionDelete,
        Operation::CollectionDeleteField,
        Operation::CollectionDeleteItem,
        Operation::CollectionGetFields,
        Operation::CollectionGetList,
        Operation::CollectionGetPublisher,
        Operation::CollectionGetViews,
        Operation::CollectionPublish,
        Operation::CollectionSetPublisher,
        Operation::CollectionSetUniqueFields,
        Operation::CollectionUpdateField,
        Operation::CollectionUpdateItem,
        Operation::JobCancel,
        Operation::JobGet,
        Operation::JobGetAgentProgress,
        Operation::JobGetList,
        Operation::JobPause,
        Operation::JobResume,
        Operation::ViewDeleteItems,
        Operation::ViewGetItems,
        Operation::ViewSetFields,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::AgentAdd => "Agent.Add",
            Operation::AgentDelete => "Agent.Delete",
            Operation::AgentGet => "Agent.Get",
            Operation::AgentGetCombinedCollections => "Agent.GetCombinedCollections",
            Operation::AgentGetJobs => "Agent.GetJobs",
            Operation::AgentGetList => "Agent.GetList",
            Operation::AgentRun => "Agent.Run",
            Operation::CollectionAdd => "Collection.Add",
            Operation::CollectionAddField => "Collection.AddField",
            Operation::CollectionAddItem => "Collection.AddItem",
            Operation::CollectionClear => "Collection.Clear",
            Operation::CollectionDelete => "Collection.Delete",
            Operation::CollectionDeleteField => "Collection.DeleteField",
            Operation::CollectionDeleteItem => "Collection.DeleteItem",
            Operation::CollectionGetFields => "Collection.GetFields",
            Operation::CollectionGetList => "Collection.GetList",
            Operation::CollectionGetPublisher => "Collection.GetPublisher",
            Operation::CollectionGetViews => "Collection.GetViews",
            Operation::CollectionPublish => "Collection.Publish",
            Operation::CollectionSetPublisher => "Collection.SetPublisher",
            Operation::CollectionSetUniqueFields => "Collection.SetUniqueFields",
            Operation::CollectionUpdateField => "Collection.UpdateField",
            Operation::CollectionUpdateItem => "Collection.UpdateItem",
            Operation::JobCancel => "Job.Cancel",
            Operation::JobGet => "Job.Get",
            Operation::JobGetAgentProgress => "Job.GetAgentProgress",
            Operation::JobGetList => "Job.GetList",
            Operation::JobPause => "Job.Pause",
            Operation::JobResume => "Job.Resume",
            Operation::ViewDeleteItems => "View.DeleteItems",
            Operation::ViewGetItems => "View.GetItems",
            Operation::ViewSetFields => "View.SetFields",
        }
    }

    /// Look up an operation by its remote name.
    pub fn from_name(name: &str) -> Option<Operation> {
        Operation::ALL.into_iter().find(|op| op.as_str() == name)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation parameters in the order they are appended to the query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    pairs: Vec<(String, String)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.pairs.push((name.into(), value.to_string()));
        self
    }

    /// Append only when `value` is present and non-empty.
    pub fn push_opt(self, name: impl Into<String>, value: Option<impl ToString>) -> Self {
        match value.map(|v| v.to_string()).filter(|v| !v.is_empty()) {
            Some(value) => self.push(name, value),
            None => self,
        }
    }

    pub fn extend<K, V>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: ToString,
    {
        self.pairs
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.to_string())));
        self
    }

    /// Replace the value of `name`, appending it if absent.
    pub fn set(&mut self, name: &str, value: impl ToString) {
        let value = value.to_string();
        match self.pairs.iter_mut().find(|(n, _)| n == name) {
            Some(pair) => pair.1 = value,
            None => self.pairs.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

/// Full request URL for `op` with `params`.
pub fn request_url(config: &ClientConfig, op: Operation, params: &Params) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    query
        .append_pair("WebServiceKey", &config.web_service_key)
        .append_pair("Service", &config.service)
        .append_pair("Operation", op.as_str());
    for (name, value) in params.iter() {
        query.append_pair(name, value);
    }
    format!("{}?{}", config.endpoint(), query.finish())
}

/// A plain GET for `op`.
pub fn build_get(config: &ClientConfig, op: Operation, params: &Params) -> HttpRequest {
    HttpRequest {
        method: HttpMethod::Get,
        url: request_url(config, op, params),
        headers: Vec::new(),
        upload: None,
    }
}

/// A POST for `op` uploading `contents` as the multipart `file` part. The
/// bytes are passed through untouched, whatever their encoding.
pub fn build_multipart(
    config: &ClientConfig,
    op: Operation,
    params: &Params,
    filename: &str,
    contents: Vec<u8>,
) -> HttpRequest {
    HttpRequest {
        method: HttpMethod::Post,
        url: request_url(config, op, params),
        headers: Vec::new(),
        upload: Some(FileUpload {
            field: "file".to_string(),
            filename: filename.to_string(),
            content_type: "text/xml".to_string(),
            contents,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ClientConfig {
        ClientConfig::new("KEY-1").with_endpoint("http://localhost:3000/rest/")
    }

    #[test]
    fn operation_names_round_trip() {
        for op in Operation::ALL {
            assert_eq!(Operation::from_name(op.as_str()), Some(op));
        }
        assert_eq!(Operation::from_name("Agent.Explode"), None);
    }

    #[test]
    fn url_starts_with_fixed_fields_then_params_in_order() {
        let params = Params::new().push("CollectionID", 1002).push("Field", "Price");
        let url = request_url(&config(), Operation::CollectionAddField, &params);
        assert_eq!(
            url,
            "http://localhost:3000/rest?WebServiceKey=KEY-1&Service=Mozenda10\
             &Operation=Collection.AddField&CollectionID=1002&Field=Price"
        );
    }

    #[test]
    fn values_are_urlencoded() {
        let params = Params::new().push("Name", "My Collection & more");
        let url = request_url(&config(), Operation::CollectionAdd, &params);
        assert!(url.ends_with("&Name=My+Collection+%26+more"), "{url}");
    }

    #[test]
    fn push_opt_skips_missing_and_empty() {
        let params = Params::new()
            .push_opt("Job.Created", Some("2024-01-01"))
            .push_opt("Job.Started", None::<&str>)
            .push_opt("Job.Ended", Some(""));
        assert_eq!(params.iter().count(), 1);
        assert_eq!(params.get("Job.Created"), Some("2024-01-01"));
    }

    #[test]
    fn set_replaces_existing_value() {
        let mut params = Params::new().push("AgentID", 5).push("AgentParameter.INDEX", "1-4");
        params.set("AgentParameter.INDEX", "5-8");
        assert_eq!(params.get("AgentParameter.INDEX"), Some("5-8"));
        assert_eq!(params.iter().count(), 2);
    }

    #[test]
    fn get_request_has_no_body() {
        let req = build_get(&config(), Operation::AgentGetList, &Params::new());
        assert_eq!(req.method, HttpMethod::Get);
        assert!(req.upload.is_none());
        assert!(req.headers.is_empty());
    }

    #[test]
    fn multipart_request_wraps_file_part() {
        let params = Params::new().push("Name", "My Agent");
        let req = build_multipart(
            &config(),
            Operation::AgentAdd,
            &params,
            "AgentDefinition.xml",
            b"<Agent/>".to_vec(),
        );
        assert_eq!(req.method, HttpMethod::Post);
        assert!(req.url.contains("Operation=Agent.Add&Name=My+Agent"));

        let upload = req.upload.unwrap();
        assert_eq!(upload.field, "file");
        assert_eq!(upload.filename, "AgentDefinition.xml");
        assert_eq!(upload.content_type, "text/xml");
        assert_eq!(upload.contents, b"<Agent/>");
    }

    #[test]
    fn multipart_request_keeps_non_utf8_bytes() {
        let contents = vec![0xFF, 0xFE, b'<', 0x00, b'A', 0x00];
        let req = build_multipart(
            &config(),
            Operation::AgentAdd,
            &Params::new(),
            "AgentDefinition.xml",
            contents.clone(),
        );
        assert_eq!(req.upload.unwrap().contents, contents);
    }
}
