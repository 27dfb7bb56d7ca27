//! Blocking client for the Mozenda web-scraping REST API.
//!
//! # Overview
//! `MozendaClient` exposes one method per remote operation (agents,
//! collections, fields, items, jobs, views). Each call builds a query against
//! the single REST endpoint, sends it through a `Transport`, and decodes the
//! XML answer into typed records.
//!
//! ```no_run
//! use mozenda_core::{ClientConfig, MozendaClient};
//!
//! let config = ClientConfig::new("XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX").with_max_threads(4);
//! let mut client = MozendaClient::new(config)?;
//! let jobs = client.run_agent(1002, Some(400), None)?;
//! println!("started {} job(s)", jobs.len());
//! if client.all_agent_jobs_done(1002)? {
//!     let items = client.collect_data(1002, &["Name", "Price"])?;
//!     println!("collected {} item(s)", items.len());
//! }
//! # Ok::<(), mozenda_core::ApiError>(())
//! ```
//!
//! # Design
//! - Request building (`request`) and response interpretation (`response`)
//!   are pure functions over plain `HttpRequest`/`HttpResponse` data; only
//!   the `Transport` performs I/O, so every operation is testable offline.
//! - All operations return `Result<T, ApiError>`. Remote rejections,
//!   transport failures and missing arguments are distinct variants.
//! - `run_agent` can split a run into index ranges (`dispatch`) so the
//!   service works on them as parallel jobs. The client itself is
//!   single-threaded and blocking.

pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod request;
pub mod response;
pub mod types;
pub mod xml;

pub use client::MozendaClient;
pub use config::ClientConfig;
pub use dispatch::{DispatchPlan, IndexRange};
pub use error::{ApiError, Result};
pub use http::{FileUpload, HttpMethod, HttpRequest, HttpResponse, ReqwestTransport, Transport};
pub use request::{Operation, Params};
pub use types::{
    Agent, AgentId, Collection, CollectionId, CombinedCollections, Field, FieldId, Item, ItemId,
    Job, JobFilter, JobId, JobState, Record, View, ViewId,
};
