//! In-memory Mozenda account.
//!
//! Every agent owns a result collection, and every collection starts with one
//! default view. Jobs start `Running`; tests move them to `Done` through
//! `MockState::finish_jobs`.

use std::collections::BTreeMap;

use crate::xml::{parse_item_list, valid_name, XmlBody};

pub type Params = [(String, String)];

/// A rejected request: becomes `Result=Error` with this code and message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub code: &'static str,
    pub message: String,
}

impl Failure {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// A response body that could not be written.
impl From<String> for Failure {
    fn from(message: String) -> Self {
        Self::new("InternalError", message)
    }
}

type Outcome = Result<String, Failure>;

#[derive(Debug, Clone)]
struct Agent {
    name: String,
    description: String,
    definition: Vec<u8>,
    collection_id: u64,
}

#[derive(Debug, Clone)]
struct Field {
    field_id: u64,
    name: String,
    format: String,
    description: String,
}

#[derive(Debug, Clone)]
struct Item {
    item_id: u64,
    values: Vec<(String, String)>,
}

impl Item {
    fn get(&self, name: &str) -> &str {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
            .unwrap_or_default()
    }

    fn set(&mut self, name: &str, value: &str) {
        match self.values.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.values.push((name.to_string(), value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Collection {
    name: String,
    description: String,
    fields: Vec<Field>,
    items: Vec<Item>,
    unique_fields: Vec<String>,
    publisher: Option<(String, Vec<(String, String)>)>,
    agent_id: Option<u64>,
}

#[derive(Debug, Clone)]
struct View {
    collection_id: u64,
    name: String,
    fields: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub job_id: String,
    pub agent_id: Option<u64>,
    pub collection_id: Option<u64>,
    pub status: String,
    pub index: Option<String>,
    pub view_id: Option<String>,
    pub status_url: Option<String>,
}

impl Job {
    fn is_archived(&self) -> bool {
        matches!(self.status.as_str(), "Done" | "Cancelled")
    }
}

#[derive(Debug)]
pub struct Store {
    next_id: u64,
    agents: BTreeMap<u64, Agent>,
    collections: BTreeMap<u64, Collection>,
    views: BTreeMap<u64, View>,
    jobs: Vec<Job>,
    run_limit: Option<usize>,
}

impl Default for Store {
    fn default() -> Self {
        Self {
            next_id: 1000,
            agents: BTreeMap::new(),
            collections: BTreeMap::new(),
            views: BTreeMap::new(),
            jobs: Vec::new(),
            run_limit: None,
        }
    }
}

fn param<'a>(params: &'a Params, name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.as_str())
        .filter(|v| !v.is_empty())
}

fn required<'a>(params: &'a Params, name: &str) -> Result<&'a str, Failure> {
    param(params, name).ok_or_else(|| Failure::new("MissingParameter", format!("{name} is required")))
}

fn required_id(params: &Params, name: &str) -> Result<u64, Failure> {
    let raw = required(params, name)?;
    raw.parse()
        .map_err(|_| Failure::new("InvalidParameter", format!("{name} {raw:?} is not a number")))
}

fn id_list(params: &Params, name: &str) -> Result<Vec<u64>, Failure> {
    match param(params, name) {
        Some(raw) => raw
            .split(',')
            .map(|id| {
                id.trim()
                    .parse()
                    .map_err(|_| Failure::new("InvalidParameter", format!("{name} {id:?} is not a number")))
            })
            .collect(),
        None => Ok(Vec::new()),
    }
}

fn name_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Store {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Run one operation. `file` is the multipart upload, if any.
    pub fn handle(&mut self, operation: &str, params: &Params, file: Option<&[u8]>) -> Outcome {
        match operation {
            "Agent.Add" => self.agent_add(params, file),
            "Agent.Delete" => self.agent_delete(params),
            "Agent.Get" => self.agent_get(params),
            "Agent.GetCombinedCollections" => self.agent_combined_collections(params),
            "Agent.GetJobs" => self.agent_jobs(params),
            "Agent.GetList" => self.agent_list(),
            "Agent.Run" => self.agent_run(params),
            "Collection.Add" => self.collection_add(params),
            "Collection.AddField" => self.collection_add_field(params),
            "Collection.AddItem" => self.collection_add_item(params, file),
            "Collection.Clear" => self.collection_clear(params),
            "Collection.Delete" => self.collection_delete(params),
            "Collection.DeleteField" => self.collection_delete_field(params),
            "Collection.DeleteItem" => self.collection_delete_item(params),
            "Collection.GetFields" => self.collection_fields(params),
            "Collection.GetList" => self.collection_list(),
            "Collection.GetPublisher" => self.collection_publishers(params),
            "Collection.GetViews" => self.collection_views(params),
            "Collection.Publish" => self.collection_publish(params),
            "Collection.SetPublisher" => self.collection_set_publisher(params),
            "Collection.SetUniqueFields" => self.collection_set_unique_fields(params),
            "Collection.UpdateField" => self.collection_update_field(params),
            "Collection.UpdateItem" => self.collection_update_item(params),
            "Job.Cancel" => self.job_transition(params, &["Paused", "Error"], "Cancelled"),
            "Job.Get" => self.job_get(params),
            "Job.GetAgentProgress" => self.job_progress(params),
            "Job.GetList" => self.job_list(params, None),
            "Job.Pause" => self.job_transition(params, &["Running"], "Paused"),
            "Job.Resume" => self.job_transition(params, &["Paused", "Error"], "Running"),
            "View.DeleteItems" => self.view_delete_items(params),
            "View.GetItems" => self.view_items(params),
            "View.SetFields" => self.view_set_fields(params),
            other => Err(Failure::new("UnknownOperation", format!("{other} is not supported"))),
        }
    }

    // --- test hooks ---

    pub fn finish_jobs(&mut self) {
        for job in self.jobs.iter_mut().filter(|j| !j.is_archived()) {
            job.status = "Done".to_string();
        }
    }

    pub fn set_run_limit(&mut self, limit: Option<usize>) {
        self.run_limit = limit;
    }

    pub fn add_view(&mut self, collection_id: u64, name: &str) -> Option<u64> {
        if !self.collections.contains_key(&collection_id) {
            return None;
        }
        let view_id = self.next_id();
        self.views.insert(
            view_id,
            View {
                collection_id,
                name: name.to_string(),
                fields: Vec::new(),
            },
        );
        Some(view_id)
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn agent_definition(&self, agent_id: u64) -> Option<&[u8]> {
        self.agents.get(&agent_id).map(|a| a.definition.as_slice())
    }

    // --- lookups ---

    fn agent(&self, params: &Params) -> Result<(u64, &Agent), Failure> {
        let agent_id = required_id(params, "AgentID")?;
        self.agents
            .get(&agent_id)
            .map(|agent| (agent_id, agent))
            .ok_or_else(|| Failure::new("AgentNotFound", format!("Agent {agent_id} does not exist")))
    }

    fn collection_mut(&mut self, params: &Params) -> Result<&mut Collection, Failure> {
        let collection_id = required_id(params, "CollectionID")?;
        self.collections
            .get_mut(&collection_id)
            .ok_or_else(|| not_found_collection(collection_id))
    }

    fn collection(&self, params: &Params) -> Result<(u64, &Collection), Failure> {
        let collection_id = required_id(params, "CollectionID")?;
        self.collections
            .get(&collection_id)
            .map(|c| (collection_id, c))
            .ok_or_else(|| not_found_collection(collection_id))
    }

    fn job_mut(&mut self, params: &Params) -> Result<&mut Job, Failure> {
        let job_id = required(params, "JobID")?;
        self.jobs
            .iter_mut()
            .find(|j| j.job_id == job_id)
            .ok_or_else(|| Failure::new("JobNotFound", format!("Job {job_id} does not exist")))
    }

    fn view(&self, params: &Params) -> Result<(u64, &View), Failure> {
        let view_id = required_id(params, "ViewID")?;
        self.views
            .get(&view_id)
            .map(|v| (view_id, v))
            .ok_or_else(|| Failure::new("ViewNotFound", format!("View {view_id} does not exist")))
    }

    fn new_collection(&mut self, collection: Collection) -> u64 {
        let collection_id = self.next_id();
        let view_name = format!("{} (default)", collection.name);
        self.collections.insert(collection_id, collection);
        self.add_view(collection_id, &view_name);
        collection_id
    }

    fn new_job(&mut self, agent_id: Option<u64>, collection_id: Option<u64>, status: &str) -> String {
        let job_id = uuid::Uuid::new_v4().to_string().to_uppercase();
        self.jobs.push(Job {
            job_id: job_id.clone(),
            agent_id,
            collection_id,
            status: status.to_string(),
            index: None,
            view_id: None,
            status_url: None,
        });
        job_id
    }

    // --- agents ---

    fn agent_add(&mut self, params: &Params, file: Option<&[u8]>) -> Outcome {
        let name = required(params, "Name")?.to_string();
        let definition = file
            .filter(|f| !f.iter().all(u8::is_ascii_whitespace))
            .ok_or_else(|| Failure::new("MissingFile", "an agent definition file is required"))?;
        if self.agents.values().any(|a| a.name == name) {
            return Err(Failure::new("AgentAlreadyExists", format!("Agent {name:?} already exists")));
        }
        let collection_id = self.new_collection(Collection {
            name: format!("{name} Results"),
            ..Collection::default()
        });
        let agent_id = self.next_id();
        if let Some(collection) = self.collections.get_mut(&collection_id) {
            collection.agent_id = Some(agent_id);
        }
        self.agents.insert(
            agent_id,
            Agent {
                name,
                description: String::new(),
                definition: definition.to_vec(),
                collection_id,
            },
        );
        Ok(XmlBody::new().leaf("AgentID", agent_id).finish()?)
    }

    fn agent_delete(&mut self, params: &Params) -> Outcome {
        let (agent_id, _) = self.agent(params)?;
        self.agents.remove(&agent_id);
        Ok(String::new())
    }

    fn agent_get(&self, params: &Params) -> Outcome {
        let (agent_id, agent) = self.agent(params)?;
        Ok(XmlBody::new()
            .leaf("AgentID", agent_id)
            .leaf("Name", &agent.name)
            .leaf("Description", &agent.description)
            .leaf("CollectionID", agent.collection_id)
            .finish()?)
    }

    fn agent_combined_collections(&self, params: &Params) -> Outcome {
        let wanted = id_list(params, "AgentID")?;
        let mut body = XmlBody::new();
        body.open("AgentList");
        for (agent_id, agent) in &self.agents {
            if wanted.is_empty() || wanted.contains(agent_id) {
                body.open("Agent")
                    .leaf("AgentID", agent_id)
                    .leaf("SourcesCollections", agent.collection_id)
                    .close("Agent");
            }
        }
        Ok(body.close("AgentList").finish()?)
    }

    fn agent_jobs(&self, params: &Params) -> Outcome {
        let (agent_id, _) = self.agent(params)?;
        self.job_list(params, Some(agent_id))
    }

    fn agent_list(&self) -> Outcome {
        let mut body = XmlBody::new();
        body.open("AgentList");
        for (agent_id, agent) in &self.agents {
            body.open("Agent")
                .leaf("AgentID", agent_id)
                .leaf("Name", &agent.name)
                .leaf("Description", &agent.description)
                .close("Agent");
        }
        Ok(body.close("AgentList").finish()?)
    }

    fn agent_run(&mut self, params: &Params) -> Outcome {
        let (agent_id, _) = self.agent(params)?;
        if let Some(limit) = self.run_limit {
            let running = self.jobs.iter().filter(|j| j.agent_id == Some(agent_id)).count();
            if running >= limit {
                return Err(Failure::new("JobLimitReached", format!("Agent {agent_id} has {running} jobs")));
            }
        }
        if let Some(view_id) = param(params, "AgentParameter.ViewID") {
            self.view(&[("ViewID".to_string(), view_id.to_string())])?;
        }
        let job_id = self.new_job(Some(agent_id), None, "Running");
        if let Some(job) = self.jobs.last_mut() {
            job.index = param(params, "AgentParameter.INDEX").map(str::to_string);
            job.view_id = param(params, "AgentParameter.ViewID").map(str::to_string);
        }
        Ok(XmlBody::new().leaf("JobID", job_id).finish()?)
    }

    // --- collections ---

    fn collection_add(&mut self, params: &Params) -> Outcome {
        let collection_id = self.new_collection(Collection {
            name: required(params, "Name")?.to_string(),
            description: param(params, "Description").unwrap_or_default().to_string(),
            ..Collection::default()
        });
        Ok(XmlBody::new().leaf("CollectionID", collection_id).finish()?)
    }

    fn collection_add_field(&mut self, params: &Params) -> Outcome {
        let name = required(params, "Field")?.to_string();
        if !valid_name(&name) {
            return Err(invalid_field_name(&name));
        }
        let field_id = self.next_id();
        let collection = self.collection_mut(params)?;
        if collection.fields.iter().any(|f| f.name == name) {
            return Err(Failure::new("FieldAlreadyExists", format!("Field {name:?} already exists")));
        }
        collection.fields.push(Field {
            field_id,
            name,
            format: "Text".to_string(),
            description: String::new(),
        });
        Ok(String::new())
    }

    fn collection_add_item(&mut self, params: &Params, file: Option<&[u8]>) -> Outcome {
        let file = file.ok_or_else(|| Failure::new("MissingFile", "an item list file is required"))?;
        let file = std::str::from_utf8(file).map_err(|e| Failure::new("InvalidXml", e.to_string()))?;
        let uploaded = parse_item_list(file).map_err(|e| Failure::new("InvalidXml", e))?;
        let first_id = self.next_id;
        self.next_id += uploaded.len() as u64;
        let collection = self.collection_mut(params)?;
        for values in &uploaded {
            if let Some((name, _)) = values.iter().find(|(n, _)| !collection.fields.iter().any(|f| f.name == *n)) {
                return Err(Failure::new("FieldNotFound", format!("Field {name:?} does not exist")));
            }
        }
        for (n, values) in uploaded.into_iter().enumerate() {
            let item = Item {
                item_id: first_id + 1 + n as u64,
                values,
            };
            let duplicate = !collection.unique_fields.is_empty()
                && collection
                    .items
                    .iter()
                    .any(|existing| collection.unique_fields.iter().all(|f| existing.get(f) == item.get(f)));
            if !duplicate {
                collection.items.push(item);
            }
        }
        Ok(String::new())
    }

    fn collection_clear(&mut self, params: &Params) -> Outcome {
        self.collection_mut(params)?.items.clear();
        Ok(String::new())
    }

    fn collection_delete(&mut self, params: &Params) -> Outcome {
        let (collection_id, _) = self.collection(params)?;
        self.collections.remove(&collection_id);
        self.views.retain(|_, view| view.collection_id != collection_id);
        Ok(String::new())
    }

    fn collection_delete_field(&mut self, params: &Params) -> Outcome {
        let name = required(params, "Field")?.to_string();
        let collection = self.collection_mut(params)?;
        let before = collection.fields.len();
        collection.fields.retain(|f| f.name != name);
        if collection.fields.len() == before {
            return Err(Failure::new("FieldNotFound", format!("Field {name:?} does not exist")));
        }
        for item in &mut collection.items {
            item.values.retain(|(n, _)| *n != name);
        }
        Ok(String::new())
    }

    fn collection_delete_item(&mut self, params: &Params) -> Outcome {
        let item_id = required_id(params, "ItemID")?;
        let collection = self.collection_mut(params)?;
        let before = collection.items.len();
        collection.items.retain(|i| i.item_id != item_id);
        if collection.items.len() == before {
            return Err(Failure::new("ItemNotFound", format!("Item {item_id} does not exist")));
        }
        Ok(String::new())
    }

    fn collection_fields(&self, params: &Params) -> Outcome {
        let (_, collection) = self.collection(params)?;
        let mut body = XmlBody::new();
        body.open("FieldList");
        for field in &collection.fields {
            body.open("Field")
                .leaf("FieldID", field.field_id)
                .leaf("Name", &field.name)
                .leaf("Format", &field.format)
                .leaf("Description", &field.description)
                .close("Field");
        }
        Ok(body.close("FieldList").finish()?)
    }

    fn collection_list(&self) -> Outcome {
        let mut body = XmlBody::new();
        body.open("CollectionList");
        for (collection_id, collection) in &self.collections {
            body.open("Collection")
                .leaf("CollectionID", collection_id)
                .leaf("Name", &collection.name)
                .leaf("Description", &collection.description)
                .close("Collection");
        }
        Ok(body.close("CollectionList").finish()?)
    }

    fn collection_publishers(&self, params: &Params) -> Outcome {
        let collections = id_list(params, "CollectionID")?;
        let agents = id_list(params, "AgentID")?;
        let mut body = XmlBody::new();
        body.open("CollectionList");
        for (collection_id, collection) in &self.collections {
            let by_agent = collection.agent_id.is_some_and(|a| agents.contains(&a));
            if !(collections.contains(collection_id) || by_agent) {
                continue;
            }
            body.open("Collection").leaf("CollectionID", collection_id);
            if let Some((method, settings)) = &collection.publisher {
                body.leaf("Method", method);
                for (name, value) in settings {
                    body.leaf(name, value);
                }
            }
            body.close("Collection");
        }
        Ok(body.close("CollectionList").finish()?)
    }

    fn collection_views(&self, params: &Params) -> Outcome {
        let (collection_id, _) = self.collection(params)?;
        let mut body = XmlBody::new();
        body.open("ViewList");
        for (view_id, view) in self.views.iter().filter(|(_, v)| v.collection_id == collection_id) {
            body.open("View")
                .leaf("ViewID", view_id)
                .leaf("Name", &view.name)
                .leaf("Fields", view.fields.join(","))
                .close("View");
        }
        Ok(body.close("ViewList").finish()?)
    }

    fn collection_publish(&mut self, params: &Params) -> Outcome {
        let (collection_id, collection) = self.collection(params)?;
        if collection.publisher.is_none() {
            return Err(Failure::new("PublisherNotConfigured", format!("Collection {collection_id} has no publisher")));
        }
        let job_id = self.new_job(None, Some(collection_id), "Done");
        if let Some(job) = self.jobs.last_mut() {
            job.status_url = param(params, "Job.StatusUrl").map(str::to_string);
        }
        Ok(XmlBody::new().leaf("JobID", job_id).finish()?)
    }

    fn collection_set_publisher(&mut self, params: &Params) -> Outcome {
        let method = required(params, "Method")?.to_string();
        let settings = params
            .iter()
            .filter(|(n, _)| !matches!(n.as_str(), "WebServiceKey" | "Service" | "Operation" | "CollectionID" | "Method"))
            .cloned()
            .collect();
        self.collection_mut(params)?.publisher = Some((method, settings));
        Ok(String::new())
    }

    fn collection_set_unique_fields(&mut self, params: &Params) -> Outcome {
        let fields = name_list(required(params, "Fields")?);
        let collection = self.collection_mut(params)?;
        if let Some(missing) = fields.iter().find(|name| !collection.fields.iter().any(|f| f.name == **name)) {
            return Err(Failure::new("FieldNotFound", format!("Field {missing:?} does not exist")));
        }
        let mut seen: Vec<Vec<String>> = Vec::new();
        collection.items.retain(|item| {
            let key: Vec<String> = fields.iter().map(|f| item.get(f).to_string()).collect();
            if seen.contains(&key) {
                false
            } else {
                seen.push(key);
                true
            }
        });
        collection.unique_fields = fields;
        Ok(String::new())
    }

    fn collection_update_field(&mut self, params: &Params) -> Outcome {
        let field_id = required_id(params, "FieldID")?;
        let collection = self.collection_mut(params)?;
        let index = collection
            .fields
            .iter()
            .position(|f| f.field_id == field_id)
            .ok_or_else(|| Failure::new("FieldNotFound", format!("Field {field_id} does not exist")))?;
        if let Some(name) = param(params, "Name").filter(|n| !valid_name(n)) {
            return Err(invalid_field_name(name));
        }
        let old_name = collection.fields[index].name.clone();
        let field = &mut collection.fields[index];
        if let Some(name) = param(params, "Name") {
            field.name = name.to_string();
        }
        if let Some(description) = param(params, "Description") {
            field.description = description.to_string();
        }
        if let Some(format) = param(params, "Format") {
            field.format = format.to_string();
        }
        let new_name = field.name.clone();
        if new_name != old_name {
            for item in &mut collection.items {
                for (name, _) in &mut item.values {
                    if *name == old_name {
                        *name = new_name.clone();
                    }
                }
            }
        }
        Ok(String::new())
    }

    fn collection_update_item(&mut self, params: &Params) -> Outcome {
        let item_id = required_id(params, "ItemID")?;
        let collection = self.collection_mut(params)?;
        let updates: Vec<(&str, &str)> = params
            .iter()
            .filter_map(|(n, v)| n.strip_prefix("Field.").map(|field| (field, v.as_str())))
            .collect();
        if let Some((missing, _)) = updates.iter().find(|(name, _)| !collection.fields.iter().any(|f| f.name == *name)) {
            return Err(Failure::new("FieldNotFound", format!("Field {missing:?} does not exist")));
        }
        let item = collection
            .items
            .iter_mut()
            .find(|i| i.item_id == item_id)
            .ok_or_else(|| Failure::new("ItemNotFound", format!("Item {item_id} does not exist")))?;
        for (name, value) in updates {
            item.set(name, value);
        }
        Ok(String::new())
    }

    // --- jobs ---

    fn job_transition(&mut self, params: &Params, from: &[&str], to: &str) -> Outcome {
        let job = self.job_mut(params)?;
        if !from.contains(&job.status.as_str()) {
            return Err(Failure::new(
                "InvalidJobState",
                format!("Job {} is {} and cannot become {to}", job.job_id, job.status),
            ));
        }
        job.status = to.to_string();
        Ok(String::new())
    }

    fn job_get(&mut self, params: &Params) -> Outcome {
        let job = self.job_mut(params)?;
        let mut body = XmlBody::new();
        body.open("Job");
        write_job(&mut body, job);
        Ok(body.close("Job").finish()?)
    }

    fn job_progress(&mut self, params: &Params) -> Outcome {
        let job = self.job_mut(params)?;
        Ok(XmlBody::new()
            .open("BeginListList")
            .open("BeginList")
            .leaf("JobID", &job.job_id)
            .leaf("Index", job.index.as_deref().unwrap_or("1"))
            .leaf("Status", &job.status)
            .close("BeginList")
            .close("BeginListList")
            .finish()?)
    }

    fn job_list(&self, params: &Params, agent_id: Option<u64>) -> Outcome {
        let state = param(params, "Job.State").unwrap_or("Active");
        let mut body = XmlBody::new();
        body.open("JobList");
        for job in &self.jobs {
            let state_matches = match state {
                "All" => true,
                "Archived" => job.is_archived(),
                _ => !job.is_archived(),
            };
            if state_matches && (agent_id.is_none() || job.agent_id == agent_id) {
                body.open("Job");
                write_job(&mut body, job);
                body.close("Job");
            }
        }
        Ok(body.close("JobList").finish()?)
    }

    // --- views ---

    fn view_delete_items(&mut self, params: &Params) -> Outcome {
        let (_, view) = self.view(params)?;
        let collection_id = view.collection_id;
        if let Some(collection) = self.collections.get_mut(&collection_id) {
            collection.items.clear();
        }
        Ok(String::new())
    }

    fn view_items(&self, params: &Params) -> Outcome {
        let (_, view) = self.view(params)?;
        let collection = self
            .collections
            .get(&view.collection_id)
            .ok_or_else(|| not_found_collection(view.collection_id))?;
        let columns: Vec<&str> = if view.fields.is_empty() {
            collection.fields.iter().map(|f| f.name.as_str()).collect()
        } else {
            view.fields.iter().map(String::as_str).collect()
        };
        let mut body = XmlBody::new();
        body.open("ItemList");
        for item in &collection.items {
            body.open("Item").leaf("ItemID", item.item_id);
            for column in &columns {
                body.leaf(column, item.get(column));
            }
            body.close("Item");
        }
        Ok(body.close("ItemList").finish()?)
    }

    fn view_set_fields(&mut self, params: &Params) -> Outcome {
        let fields = name_list(required(params, "Fields")?);
        let view_id = required_id(params, "ViewID")?;
        let (_, view) = self.view(params)?;
        let collection = self
            .collections
            .get(&view.collection_id)
            .ok_or_else(|| not_found_collection(view.collection_id))?;
        if let Some(missing) = fields.iter().find(|name| !collection.fields.iter().any(|f| f.name == **name)) {
            return Err(Failure::new("FieldNotFound", format!("Field {missing:?} does not exist")));
        }
        if let Some(view) = self.views.get_mut(&view_id) {
            view.fields = fields;
        }
        Ok(String::new())
    }
}

fn write_job(body: &mut XmlBody, job: &Job) {
    body.leaf("JobID", &job.job_id).leaf("Status", &job.status);
    if let Some(agent_id) = job.agent_id {
        body.leaf("AgentID", agent_id);
    }
    if let Some(collection_id) = job.collection_id {
        body.leaf("CollectionID", collection_id);
    }
    if let Some(index) = &job.index {
        body.leaf("Index", index);
    }
}

fn invalid_field_name(name: &str) -> Failure {
    Failure::new("InvalidFieldName", format!("Field name {name:?} is not a valid element name"))
}

fn not_found_collection(collection_id: u64) -> Failure {
    Failure::new("CollectionNotFound", format!("Collection {collection_id} does not exist"))
}
