//! Full lifecycle tests against the live mock server.
//!
//! # Design
//! Each test starts the mock server on a random port, then drives the client
//! over real HTTP through the default `ReqwestTransport`. Server-side state is
//! inspected and advanced (finishing jobs, adding views, limiting runs)
//! through a `MockState` handle shared with the server.

use std::net::SocketAddr;

use mock_server::MockState;
use mozenda_core::{ApiError, ClientConfig, JobFilter, JobState, MozendaClient, Record};

const KEY: &str = "11111111-2222-3333-4444-555555555555";

fn start_server(state: MockState) -> SocketAddr {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run_with_state(listener, state).await
        })
        .unwrap();
    });

    addr
}

/// Run one of the async `MockState` hooks from a blocking test.
fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(future)
}

fn client(addr: SocketAddr, key: &str) -> MozendaClient {
    let config = ClientConfig::new(key)
        .with_endpoint(&format!("http://{addr}/rest"))
        .with_max_threads(3);
    MozendaClient::new(config).unwrap()
}

fn item(pairs: &[(&str, &str)]) -> Record {
    pairs.iter().copied().collect()
}

#[test]
fn agent_run_lifecycle() {
    // Step 1: start mock server and connect.
    let state = MockState::new(KEY);
    let addr = start_server(state.clone());
    let mut client = client(addr, KEY);
    assert!(client.list_agents().unwrap().is_empty(), "expected no agents");

    // Step 2: add an agent and inspect it.
    let definition = "<Agent><Name>Prices</Name></Agent>";
    let agent_id = client.add_agent_definition(definition, "Prices").unwrap();
    let agent = client.get_agent(agent_id).unwrap();
    assert_eq!(agent.agent_id, agent_id);
    assert_eq!(agent.name, "Prices");
    assert_eq!(block_on(state.agent_definition(agent_id)).as_deref(), Some(definition.as_bytes()));

    let agents = client.list_agents().unwrap();
    assert_eq!(agents.len(), 1);

    // Step 3: seed the agent's result collection.
    let collection_id = client.agent_collection(agent_id).unwrap();
    client.add_collection_field(collection_id, "Name").unwrap();
    client.add_collection_field(collection_id, "Price").unwrap();
    client
        .add_collection_items(
            collection_id,
            &[
                item(&[("Name", "Lamp"), ("Price", "10")]),
                item(&[("Name", "Desk"), ("Price", "80")]),
                item(&[("Name", "Lamp"), ("Price", "12")]),
            ],
        )
        .unwrap();

    let combined = client.combined_collections(&[agent_id]).unwrap();
    assert_eq!(combined.len(), 1);
    assert_eq!(combined[0].source_collections, vec![collection_id]);

    // Step 4: a chunked run starts one job per index range.
    let jobs = client.run_agent(agent_id, Some(10), None).unwrap();
    assert_eq!(jobs.len(), 3);
    assert_eq!(
        block_on(state.job_indexes(agent_id)),
        vec![Some("1-4".to_string()), Some("5-8".to_string()), Some("9-10".to_string())]
    );

    let active = client.agent_jobs(agent_id, &JobFilter::default()).unwrap();
    assert_eq!(active.len(), 3);

    // Step 5: jobs are polled until the server finishes them.
    assert!(!client.all_agent_jobs_done(agent_id).unwrap());
    block_on(state.finish_jobs());
    assert!(client.all_agent_jobs_done(agent_id).unwrap());
    assert!(client.get_job(&jobs[0]).unwrap().is_done());

    let archived = JobFilter {
        state: Some(JobState::Archived),
        ..JobFilter::default()
    };
    assert_eq!(client.list_jobs(&archived).unwrap().len(), 3);

    // Step 6: collect every view, deduplicated on Name.
    block_on(state.add_view(collection_id, "Second")).unwrap();
    let items = client.collect_data(agent_id, &["Name"]).unwrap();
    assert_eq!(items.len(), 4, "two unique items in each of two views");
    assert_eq!(items[0].get("Name"), Some("Lamp"));
    assert_eq!(items[0].get("Price"), Some("10"));
    assert_eq!(items[1].get("Name"), Some("Desk"));

    // Step 7: a run that hits the server's job limit keeps the jobs it started.
    block_on(state.set_run_limit(Some(4)));
    let err = client.run_agent(agent_id, Some(10), None).unwrap_err();
    match err {
        ApiError::PartialDispatch { source, job_ids } => {
            assert_eq!(job_ids.len(), 4);
            assert_eq!(job_ids[..3], jobs[..]);
            assert!(matches!(*source, ApiError::Remote { ref code, .. } if code.as_deref() == Some("JobLimitReached")));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(client.job_ids(agent_id).len(), 4);

    // Step 8: delete the agent.
    client.remove_agent(agent_id).unwrap();
    assert!(client.get_agent(agent_id).unwrap_err().is_remote());
}

#[test]
fn collection_and_job_management() {
    let state = MockState::new(KEY);
    let addr = start_server(state.clone());
    let mut client = client(addr, KEY);

    // Collection with fields and items.
    let collection_id = client.create_collection("Leads", "Sales leads").unwrap();
    let collections = client.list_collections(collection_id).unwrap();
    assert!(collections.iter().any(|c| c.collection_id == collection_id && c.name == "Leads"));

    client.add_collection_field(collection_id, "Name").unwrap();
    client.add_collection_field(collection_id, "City").unwrap();
    client
        .add_collection_items(
            collection_id,
            &[item(&[("Name", "Ann"), ("City", "Oslo")]), item(&[("Name", "Bo"), ("City", "Rome")])],
        )
        .unwrap();

    // Rename a field, then update an item through the new name.
    let fields = client.collection_fields(collection_id, None).unwrap();
    let city = fields.iter().find(|f| f.name == "City").unwrap();
    client
        .update_collection_field(collection_id, city.field_id.unwrap(), &[("Name", "Town")])
        .unwrap();

    let views = client.collection_views(collection_id).unwrap();
    assert_eq!(views.len(), 1);
    let view_id = views[0].view_id;
    let items = client.view_items(view_id).unwrap();
    assert_eq!(items[0].get("Town"), Some("Oslo"));
    let first: u64 = items[0].get("ItemID").unwrap().parse().unwrap();
    let second: u64 = items[1].get("ItemID").unwrap().parse().unwrap();
    client
        .update_collection_item(collection_id, first, &[("Field.Town", "Bergen")])
        .unwrap();
    client.delete_collection_item(collection_id, second).unwrap();

    client.set_view_fields(view_id, &["Town"]).unwrap();
    let items = client.view_items(view_id).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].get("Town"), Some("Bergen"));
    assert_eq!(items[0].get("Name"), None);

    // Publishing needs a publisher first.
    let err = client.publish_collection(collection_id, None).unwrap_err();
    assert!(err.is_remote());
    client
        .set_collection_publisher(collection_id, "Email", &[("Email.To", "ops@example.com")])
        .unwrap();
    let publishers = client.collection_publishers(&[collection_id], &[]).unwrap();
    assert_eq!(publishers[0].get("Method"), Some("Email"));
    assert_eq!(publishers[0].get("Email.To"), Some("ops@example.com"));
    client
        .publish_collection(collection_id, Some("https://example.com/status"))
        .unwrap();

    // An agent fed from the collection's first view.
    let agent_id = client.add_agent_definition("<Agent/>", "Enrich").unwrap();
    let jobs = client.run_agent(agent_id, None, Some(collection_id)).unwrap();
    assert_eq!(jobs.len(), 1);
    let recorded = block_on(state.jobs());
    let job = recorded.iter().find(|j| j.job_id == jobs[0]).unwrap();
    assert_eq!(job.view_id.as_deref(), Some(view_id.to_string().as_str()));
    assert_eq!(job.index, None);

    // Job controls follow the service's state rules.
    let job_id = &jobs[0];
    assert!(client.cancel_job(job_id).unwrap_err().is_remote());
    client.pause_job(job_id).unwrap();
    assert_eq!(client.get_job(job_id).unwrap().status.as_deref(), Some("Paused"));
    client.resume_job(job_id).unwrap();
    client.pause_job(job_id).unwrap();
    client.cancel_job(job_id).unwrap();
    assert_eq!(client.get_job(job_id).unwrap().status.as_deref(), Some("Cancelled"));

    let progress = client.agent_progress(job_id).unwrap();
    assert_eq!(progress[0].get("Status"), Some("Cancelled"));

    // Tear down.
    client.delete_view_items(view_id).unwrap();
    assert!(client.view_items(view_id).unwrap().is_empty());
    client.delete_collection_field(collection_id, "Name").unwrap();
    client.clear_collection(collection_id).unwrap();
    client.remove_collection(collection_id).unwrap();
    assert!(client.collection_views(collection_id).unwrap_err().is_remote());
}

#[test]
fn wrong_key_is_a_remote_error() {
    let addr = start_server(MockState::new(KEY));
    let client = client(addr, "not-the-key");

    let err = client.list_agents().unwrap_err();
    match err {
        ApiError::Remote { operation, code, .. } => {
            assert_eq!(operation, "Agent.GetList");
            assert_eq!(code.as_deref(), Some("InvalidWebServiceKey"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn add_agent_reads_definition_file() {
    let state = MockState::new(KEY);
    let addr = start_server(state.clone());
    let client = client(addr, KEY);

    let path = std::env::temp_dir().join(format!("mozenda-agent-{}.xml", std::process::id()));
    std::fs::write(&path, "<Agent><Name>FromFile</Name></Agent>").unwrap();
    let agent_id = client.add_agent(&path, "FromFile").unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(
        block_on(state.agent_definition(agent_id)).as_deref(),
        Some("<Agent><Name>FromFile</Name></Agent>".as_bytes())
    );

    let missing = client.add_agent(std::env::temp_dir().join("no-such-agent.xml"), "Ghost");
    assert!(matches!(missing, Err(ApiError::Io(_))));
}

#[test]
fn add_agent_uploads_utf16_definition_unchanged() {
    let state = MockState::new(KEY);
    let addr = start_server(state.clone());
    let client = client(addr, KEY);

    let mut definition = vec![0xFF, 0xFE];
    definition.extend("<Agent/>".encode_utf16().flat_map(u16::to_le_bytes));
    let path = std::env::temp_dir().join(format!("mozenda-agent-utf16-{}.xml", std::process::id()));
    std::fs::write(&path, &definition).unwrap();
    let agent_id = client.add_agent(&path, "Wide").unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(block_on(state.agent_definition(agent_id)), Some(definition));
}
