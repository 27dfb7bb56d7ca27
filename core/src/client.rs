//! Blocking client for the Mozenda REST API.
//!
//! # Design
//! Each public method checks its required arguments, builds one request with
//! `request::build_get` or `request::build_multipart`, sends it through the
//! `Transport`, and decodes the XML answer with the helpers in `response`.
//! A zero ID or an empty string fails with `MissingArgument` before anything
//! goes over the wire.
//!
//! The only state a client keeps is the job IDs returned by `run_agent`,
//! grouped per agent in start order. `all_agent_jobs_done` polls exactly
//! those jobs. The map lives as long as the client, and mutating it requires
//! `&mut self`; sharing a client across threads is up to the caller.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::config::ClientConfig;
use crate::dispatch::{self, DispatchPlan};
use crate::error::{ApiError, Result};
use crate::http::{HttpRequest, HttpResponse, ReqwestTransport, Transport};
use crate::request::{build_get, build_multipart, Operation, Params};
use crate::response::{parse_body, parse_list, parse_success, required_text};
use crate::types::{
    parse_id, Agent, AgentId, Collection, CollectionId, CombinedCollections, Field, FieldId, Item,
    ItemId, Job, JobFilter, JobId, JobState, Record, View, ViewId,
};
use crate::xml::{write_item_list, Element};

const AGENT_DEFINITION_FILE: &str = "AgentDefinition.xml";
const NEW_ITEMS_FILE: &str = "NewItems.xml";

pub struct MozendaClient<T = ReqwestTransport> {
    config: ClientConfig,
    transport: T,
    job_ids: HashMap<AgentId, Vec<JobId>>,
}

impl<T> fmt::Debug for MozendaClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MozendaClient")
            .field("config", &self.config)
            .field("job_ids", &self.job_ids)
            .finish_non_exhaustive()
    }
}

impl MozendaClient<ReqwestTransport> {
    /// Client over the default blocking transport.
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::with_transport(config, ReqwestTransport::new()?)
    }

    /// Client configured from `MOZENDA_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }
}

impl<T: Transport> MozendaClient<T> {
    pub fn with_transport(config: ClientConfig, transport: T) -> Result<Self> {
        if config.web_service_key.is_empty() {
            return Err(ApiError::MissingArgument("WebServiceKey"));
        }
        Ok(Self {
            config,
            transport,
            job_ids: HashMap::new(),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Change the thread limit used by later `run_agent` calls.
    pub fn set_max_threads(&mut self, max_threads: Option<u32>) {
        self.config.max_threads = max_threads.filter(|n| *n > 0);
    }

    /// Jobs started for `agent_id` by this client, oldest first.
    pub fn job_ids(&self, agent_id: AgentId) -> &[JobId] {
        self.job_ids.get(&agent_id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn all_job_ids(&self) -> &HashMap<AgentId, Vec<JobId>> {
        &self.job_ids
    }

    /// The GET request `op` with `params` would send.
    pub fn build_request(&self, op: Operation, params: &Params) -> HttpRequest {
        build_get(&self.config, op, params)
    }

    fn send(&self, op: Operation, request: &HttpRequest) -> Result<HttpResponse> {
        tracing::debug!(operation = %op, method = ?request.method, "sending request");
        let response = self.transport.execute(request)?;
        tracing::debug!(operation = %op, status = response.status, "received response");
        Ok(response)
    }

    fn call(&self, op: Operation, params: &Params) -> Result<HttpResponse> {
        self.send(op, &self.build_request(op, params))
    }

    fn call_success(&self, op: Operation, params: &Params) -> Result<Element> {
        parse_success(op, &self.call(op, params)?)
    }

    fn call_list<R>(
        &self,
        op: Operation,
        params: &Params,
        list: &str,
        entry: &str,
        decode: impl Fn(&Element) -> Result<R>,
    ) -> Result<Vec<R>> {
        parse_list(op, &self.call(op, params)?, list, entry, decode)
    }

    fn upload(&self, op: Operation, params: &Params, filename: &str, contents: Vec<u8>) -> Result<Element> {
        let request = build_multipart(&self.config, op, params, filename, contents);
        parse_success(op, &self.send(op, &request)?)
    }

    // -----------------------------------------------------------------------
    // Agents
    // -----------------------------------------------------------------------

    /// Upload the agent definition stored at `path` as a new agent. The file
    /// is sent byte for byte, so any encoding the service accepts works.
    pub fn add_agent(&self, path: impl AsRef<Path>, name: &str) -> Result<AgentId> {
        require_str("Name", name)?;
        let definition = std::fs::read(path)?;
        self.add_agent_definition(definition, name)
    }

    /// Add a new agent from an XML definition. Existing agents cannot be
    /// overwritten; delete them first.
    pub fn add_agent_definition(&self, definition: impl AsRef<[u8]>, name: &str) -> Result<AgentId> {
        let op = Operation::AgentAdd;
        let definition = definition.as_ref();
        if definition.iter().all(u8::is_ascii_whitespace) {
            return Err(ApiError::MissingArgument("AgentDefinition"));
        }
        let name = require_str("Name", name)?;
        let params = Params::new().push("Name", name);
        let root = self.upload(op, &params, AGENT_DEFINITION_FILE, definition.to_vec())?;
        parse_id("AgentID", required_text(op, &root, "AgentID")?)
    }

    /// Delete an agent and its schedules.
    pub fn remove_agent(&self, agent_id: AgentId) -> Result<()> {
        let agent_id = require_id("AgentID", agent_id)?;
        self.call_success(Operation::AgentDelete, &Params::new().push("AgentID", agent_id))?;
        Ok(())
    }

    pub fn get_agent(&self, agent_id: AgentId) -> Result<Agent> {
        let agent_id = require_id("AgentID", agent_id)?;
        let root = self.call_success(Operation::AgentGet, &Params::new().push("AgentID", agent_id))?;
        Agent::from_element(root.child("Agent").unwrap_or(&root))
    }

    /// The collection an agent writes its results to. Only `CollectionID`
    /// is read from the response.
    pub fn agent_collection(&self, agent_id: AgentId) -> Result<CollectionId> {
        let op = Operation::AgentGet;
        let agent_id = require_id("AgentID", agent_id)?;
        let root = self.call_success(op, &Params::new().push("AgentID", agent_id))?;
        let agent = root.child("Agent").unwrap_or(&root);
        parse_id("CollectionID", required_text(op, agent, "CollectionID")?)
    }

    /// Source collections behind each agent's combined collection. An empty
    /// slice asks about every agent.
    pub fn combined_collections(&self, agent_ids: &[AgentId]) -> Result<Vec<CombinedCollections>> {
        let params = Params::new().push_opt("AgentID", Some(join(agent_ids)));
        self.call_list(
            Operation::AgentGetCombinedCollections,
            &params,
            "AgentList",
            "Agent",
            CombinedCollections::from_element,
        )
    }

    pub fn agent_jobs(&self, agent_id: AgentId, filter: &JobFilter) -> Result<Vec<Job>> {
        let agent_id = require_id("AgentID", agent_id)?;
        let params = job_filter(Params::new().push("AgentID", agent_id), filter);
        self.call_list(Operation::AgentGetJobs, &params, "JobList", "Job", Job::from_element)
    }

    pub fn list_agents(&self) -> Result<Vec<Agent>> {
        self.call_list(Operation::AgentGetList, &Params::new(), "AgentList", "Agent", Agent::from_element)
    }

    /// Start jobs for an agent and return every job ID recorded for it so far.
    ///
    /// With `total_records` and a configured thread limit, the run is split
    /// into contiguous index ranges sent one after another, each becoming its
    /// own remote job (see `dispatch::plan`). If a range fails, no further
    /// ranges are sent and the jobs already started are returned inside
    /// `ApiError::PartialDispatch`; they are not cancelled.
    ///
    /// `input_collection` feeds the agent from that collection's first view.
    pub fn run_agent(
        &mut self,
        agent_id: AgentId,
        total_records: Option<u64>,
        input_collection: Option<CollectionId>,
    ) -> Result<Vec<JobId>> {
        let agent_id = require_id("AgentID", agent_id)?;
        let mut params = Params::new().push("AgentID", agent_id);

        if let Some(collection_id) = input_collection.filter(|id| *id > 0) {
            let view = self
                .collection_views(collection_id)?
                .into_iter()
                .next()
                .ok_or_else(|| ApiError::NotFound(format!("views of collection {collection_id}")))?;
            params = params.push("AgentParameter.ViewID", view.view_id);
        }

        match dispatch::plan(total_records, self.config.max_threads()) {
            DispatchPlan::Single => {
                let job_id = self.start_job(&params)?;
                self.record_job(agent_id, job_id);
            }
            DispatchPlan::Chunked(ranges) => {
                let chunks = ranges.len();
                for (n, range) in ranges.into_iter().enumerate() {
                    let index = range.to_param();
                    tracing::info!(agent_id, chunk = n + 1, chunks, %index, "starting agent job");
                    params.set("AgentParameter.INDEX", &index);
                    match self.start_job(&params) {
                        Ok(job_id) => self.record_job(agent_id, job_id),
                        Err(source) => {
                            tracing::warn!(agent_id, chunk = n + 1, chunks, error = %source, "agent run stopped");
                            return Err(ApiError::PartialDispatch {
                                source: Box::new(source),
                                job_ids: self.job_ids(agent_id).to_vec(),
                            });
                        }
                    }
                }
            }
        }

        Ok(self.job_ids(agent_id).to_vec())
    }

    fn start_job(&self, params: &Params) -> Result<JobId> {
        let op = Operation::AgentRun;
        let root = self.call_success(op, params)?;
        Ok(required_text(op, &root, "JobID")?.to_string())
    }

    fn record_job(&mut self, agent_id: AgentId, job_id: JobId) {
        self.job_ids.entry(agent_id).or_default().push(job_id);
    }

    // -----------------------------------------------------------------------
    // Collections
    // -----------------------------------------------------------------------

    /// Create an empty collection and return its ID.
    pub fn create_collection(&self, name: &str, description: &str) -> Result<CollectionId> {
        let op = Operation::CollectionAdd;
        let name = require_str("Name", name)?;
        let params = Params::new().push("Name", name).push("Description", description);
        let root = self.call_success(op, &params)?;
        parse_id("CollectionID", required_text(op, &root, "CollectionID")?)
    }

    /// Add a `Text` field. Only user-created collections accept new fields.
    pub fn add_collection_field(&self, collection_id: CollectionId, field: &str) -> Result<()> {
        let params = Params::new()
            .push("CollectionID", require_id("CollectionID", collection_id)?)
            .push("Field", require_str("Field", field)?);
        self.call_success(Operation::CollectionAddField, &params)?;
        Ok(())
    }

    /// Upload `items` as new rows of a collection.
    pub fn add_collection_items(&self, collection_id: CollectionId, items: &[Item]) -> Result<()> {
        let collection_id = require_id("CollectionID", collection_id)?;
        if items.is_empty() {
            return Err(ApiError::MissingArgument("Items"));
        }
        let document = write_item_list(items)?;
        let params = Params::new().push("CollectionID", collection_id);
        self.upload(Operation::CollectionAddItem, &params, NEW_ITEMS_FILE, document.into_bytes())?;
        Ok(())
    }

    /// Remove every item but keep the collection and its fields.
    pub fn clear_collection(&self, collection_id: CollectionId) -> Result<()> {
        self.collection_call(Operation::CollectionClear, collection_id)
    }

    /// Permanently delete a collection and its data.
    pub fn remove_collection(&self, collection_id: CollectionId) -> Result<()> {
        self.collection_call(Operation::CollectionDelete, collection_id)
    }

    fn collection_call(&self, op: Operation, collection_id: CollectionId) -> Result<()> {
        let collection_id = require_id("CollectionID", collection_id)?;
        self.call_success(op, &Params::new().push("CollectionID", collection_id))?;
        Ok(())
    }

    pub fn delete_collection_field(&self, collection_id: CollectionId, field: &str) -> Result<()> {
        let params = Params::new()
            .push("CollectionID", require_id("CollectionID", collection_id)?)
            .push("Field", require_str("Field", field)?);
        self.call_success(Operation::CollectionDeleteField, &params)?;
        Ok(())
    }

    pub fn delete_collection_item(&self, collection_id: CollectionId, item_id: ItemId) -> Result<()> {
        let params = Params::new()
            .push("CollectionID", require_id("CollectionID", collection_id)?)
            .push("ItemID", require_id("ItemID", item_id)?);
        self.call_success(Operation::CollectionDeleteItem, &params)?;
        Ok(())
    }

    pub fn collection_fields(&self, collection_id: CollectionId, include: Option<&str>) -> Result<Vec<Field>> {
        let params = Params::new()
            .push("CollectionID", require_id("CollectionID", collection_id)?)
            .push_opt("Include", include);
        self.call_list(Operation::CollectionGetFields, &params, "FieldList", "Field", Field::from_element)
    }

    pub fn list_collections(&self, collection_id: CollectionId) -> Result<Vec<Collection>> {
        let params = Params::new().push("CollectionID", require_id("CollectionID", collection_id)?);
        self.call_list(
            Operation::CollectionGetList,
            &params,
            "CollectionList",
            "Collection",
            Collection::from_element,
        )
    }

    /// Publishing configuration of the given collections and/or the
    /// collections of the given agents. At least one ID is required.
    pub fn collection_publishers(
        &self,
        collection_ids: &[CollectionId],
        agent_ids: &[AgentId],
    ) -> Result<Vec<Record>> {
        if collection_ids.is_empty() && agent_ids.is_empty() {
            return Err(ApiError::MissingArgument("CollectionID"));
        }
        let params = Params::new()
            .push_opt("CollectionID", Some(join(collection_ids)))
            .push_opt("AgentID", Some(join(agent_ids)));
        self.call_list(
            Operation::CollectionGetPublisher,
            &params,
            "CollectionList",
            "Collection",
            |el| Ok(el.to_record()),
        )
    }

    pub fn collection_views(&self, collection_id: CollectionId) -> Result<Vec<View>> {
        let params = Params::new().push("CollectionID", require_id("CollectionID", collection_id)?);
        self.call_list(Operation::CollectionGetViews, &params, "ViewList", "View", View::from_element)
    }

    /// Publish with the collection's configured publisher. `status_url` is
    /// called by the service when the publish job changes state.
    pub fn publish_collection(&self, collection_id: CollectionId, status_url: Option<&str>) -> Result<()> {
        let params = Params::new()
            .push("CollectionID", require_id("CollectionID", collection_id)?)
            .push_opt("Job.StatusUrl", status_url);
        self.call_success(Operation::CollectionPublish, &params)?;
        Ok(())
    }

    /// Create or replace the publisher of a collection. `method` is the
    /// publishing method (e.g. `Email`); `method_params` are its settings.
    pub fn set_collection_publisher(
        &self,
        collection_id: CollectionId,
        method: &str,
        method_params: &[(&str, &str)],
    ) -> Result<()> {
        let collection_id = require_id("CollectionID", collection_id)?;
        let method = require_str("Method", method)?;
        if method_params.is_empty() {
            return Err(ApiError::MissingArgument("Parameters"));
        }
        let params = Params::new()
            .push("CollectionID", collection_id)
            .push("Method", method)
            .extend(method_params.iter().copied());
        self.call_success(Operation::CollectionSetPublisher, &params)?;
        Ok(())
    }

    /// Make `fields` the unique key of a collection. The service deletes
    /// existing duplicates under the new key.
    pub fn set_unique_fields(&self, collection_id: CollectionId, fields: &[&str]) -> Result<()> {
        let params = Params::new()
            .push("Fields", require_list("Fields", fields)?)
            .push("CollectionID", require_id("CollectionID", collection_id)?);
        self.call_success(Operation::CollectionSetUniqueFields, &params)?;
        Ok(())
    }

    /// Change field properties such as `Name`, `Description` or `Format`.
    pub fn update_collection_field(
        &self,
        collection_id: CollectionId,
        field_id: FieldId,
        field_params: &[(&str, &str)],
    ) -> Result<()> {
        let params = Params::new()
            .push("CollectionID", require_id("CollectionID", collection_id)?)
            .push("FieldID", require_id("FieldID", field_id)?);
        if field_params.is_empty() {
            return Err(ApiError::MissingArgument("Parameters"));
        }
        self.call_success(Operation::CollectionUpdateField, &params.extend(field_params.iter().copied()))?;
        Ok(())
    }

    /// Set item values; keys take the form `Field.<Name>`.
    pub fn update_collection_item(
        &self,
        collection_id: CollectionId,
        item_id: ItemId,
        field_params: &[(&str, &str)],
    ) -> Result<()> {
        let params = Params::new()
            .push("CollectionID", require_id("CollectionID", collection_id)?)
            .push("ItemID", require_id("ItemID", item_id)?);
        if field_params.is_empty() {
            return Err(ApiError::MissingArgument("Parameters"));
        }
        self.call_success(Operation::CollectionUpdateItem, &params.extend(field_params.iter().copied()))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Jobs
    // -----------------------------------------------------------------------

    /// Cancel a job. The service only cancels paused or failed jobs.
    pub fn cancel_job(&self, job_id: &str) -> Result<()> {
        self.job_call(Operation::JobCancel, job_id)
    }

    pub fn pause_job(&self, job_id: &str) -> Result<()> {
        self.job_call(Operation::JobPause, job_id)
    }

    /// Resume a paused or failed job.
    pub fn resume_job(&self, job_id: &str) -> Result<()> {
        self.job_call(Operation::JobResume, job_id)
    }

    fn job_call(&self, op: Operation, job_id: &str) -> Result<()> {
        let job_id = require_str("JobID", job_id)?;
        self.call_success(op, &Params::new().push("JobID", job_id))?;
        Ok(())
    }

    pub fn get_job(&self, job_id: &str) -> Result<Job> {
        let op = Operation::JobGet;
        let job_id = require_str("JobID", job_id)?;
        let root = self.call_success(op, &Params::new().push("JobID", job_id))?;
        let job = root.child("Job").ok_or(ApiError::MissingField {
            operation: op.as_str(),
            field: "Job",
        })?;
        Job::from_element(job)
    }

    /// Progress entries of a running agent job.
    pub fn agent_progress(&self, job_id: &str) -> Result<Vec<Record>> {
        let params = Params::new().push("JobID", require_str("JobID", job_id)?);
        self.call_list(
            Operation::JobGetAgentProgress,
            &params,
            "BeginListList",
            "BeginList",
            |el| Ok(el.to_record()),
        )
    }

    pub fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>> {
        let params = job_filter(Params::new(), filter);
        self.call_list(Operation::JobGetList, &params, "JobList", "Job", Job::from_element)
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    pub fn delete_view_items(&self, view_id: ViewId) -> Result<()> {
        let view_id = require_id("ViewID", view_id)?;
        self.call_success(Operation::ViewDeleteItems, &Params::new().push("ViewID", view_id))?;
        Ok(())
    }

    pub fn view_items(&self, view_id: ViewId) -> Result<Vec<Item>> {
        let params = Params::new().push("ViewID", require_id("ViewID", view_id)?);
        self.call_list(Operation::ViewGetItems, &params, "ItemList", "Item", |el| Ok(el.to_record()))
    }

    /// Set which fields a view shows, in display order.
    pub fn set_view_fields(&self, view_id: ViewId, fields: &[&str]) -> Result<()> {
        let params = Params::new()
            .push("ViewID", require_id("ViewID", view_id)?)
            .push("Fields", require_list("Fields", fields)?);
        self.call_success(Operation::ViewSetFields, &params)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Aggregates
    // -----------------------------------------------------------------------

    /// Every item of every view of an agent's result collection, view by
    /// view. With `unique_fields`, duplicates are first removed remotely via
    /// `set_unique_fields`.
    pub fn collect_data(&self, agent_id: AgentId, unique_fields: &[&str]) -> Result<Vec<Item>> {
        let collection_id = self.agent_collection(require_id("AgentID", agent_id)?)?;
        if !unique_fields.is_empty() {
            self.set_unique_fields(collection_id, unique_fields)?;
        }

        let mut items = Vec::new();
        for view in self.collection_views(collection_id)? {
            let view_items = self.view_items(view.view_id)?;
            tracing::debug!(agent_id, view_id = view.view_id, count = view_items.len(), "collected view items");
            items.extend(view_items);
        }
        Ok(items)
    }

    /// True when every job `run_agent` recorded for the agent reports
    /// `Status == "Done"`. Stops at the first job that is not done, whose
    /// response has no job status, or whose body is not well-formed XML.
    pub fn all_agent_jobs_done(&self, agent_id: AgentId) -> Result<bool> {
        let agent_id = require_id("AgentID", agent_id)?;
        let job_ids = self.job_ids(agent_id);
        if job_ids.is_empty() {
            return Err(ApiError::NoJobsRecorded(agent_id));
        }

        for job_id in job_ids {
            let response = self.call(Operation::JobGet, &Params::new().push("JobID", job_id))?;
            let root = match parse_body(&response) {
                Ok(root) => root,
                Err(ApiError::Xml(err)) => {
                    tracing::debug!(agent_id, %job_id, error = %err, "unreadable job status");
                    return Ok(false);
                }
                Err(err) => return Err(err),
            };
            let status = root.child("Job").and_then(|job| job.child_text("Status"));
            if status != Some("Done") {
                tracing::debug!(agent_id, %job_id, ?status, "job not done");
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn require_id(name: &'static str, id: u64) -> Result<u64> {
    if id == 0 {
        return Err(ApiError::MissingArgument(name));
    }
    Ok(id)
}

fn require_str<'a>(name: &'static str, value: &'a str) -> Result<&'a str> {
    if value.trim().is_empty() {
        return Err(ApiError::MissingArgument(name));
    }
    Ok(value)
}

fn require_list(name: &'static str, values: &[&str]) -> Result<String> {
    let joined = join(values);
    if joined.is_empty() {
        return Err(ApiError::MissingArgument(name));
    }
    Ok(joined)
}

/// Comma-join non-empty values.
fn join<S: ToString>(values: &[S]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .filter(|v| !v.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

fn job_filter(params: Params, filter: &JobFilter) -> Params {
    params
        .push_opt("Job.Created", filter.created.as_deref())
        .push_opt("Job.Started", filter.started.as_deref())
        .push_opt("Job.Ended", filter.ended.as_deref())
        .push_opt("Job.State", filter.state.map(JobState::as_str))
}
