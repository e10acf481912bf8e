use std::sync::mpsc;
use std::time::Duration;

use engramic_core::consolidate::ConsolidateService;
use engramic_core::event::{MessageService, Topic};
use engramic_core::host::Host;
use engramic_core::messages::{ObservationCompleteMsg, ProgressUpdatedMsg};
use engramic_core::progress::ProgressService;
use engramic_core::retrieve::RetrieveService;
use engramic_core::sense::SenseService;
use engramic_core::storage::StorageService;
use engramic_core::types::{FileNode, NodeType, RootDirectory};
use engramic_core::EngramError;

fn ingest_host() -> Host {
    Host::new(
        "mock",
        vec![
            Box::new(MessageService::new()),
            Box::new(SenseService::new()),
            Box::new(ConsolidateService::new()),
            Box::new(RetrieveService::new()),
            Box::new(StorageService::new()),
            Box::new(ProgressService::new()),
        ],
    )
    .unwrap()
}

#[test]
fn document_ingest_bubbles_up_to_document_inserted() {
    let host = ingest_host();

    let (observation_tx, observation_rx) = mpsc::channel();
    host.context()
        .bus
        .subscribe(Topic::ObservationComplete, "test", move |payload| {
            observation_tx
                .send(payload)
                .map_err(|e| EngramError::Backend(e.to_string()))
        });
    let (inserted_tx, inserted_rx) = mpsc::channel();
    host.context()
        .bus
        .subscribe(Topic::DocumentInserted, "test", move |payload| {
            inserted_tx
                .send(payload)
                .map_err(|e| EngramError::Backend(e.to_string()))
        });
    let (progress_tx, progress_rx) = mpsc::channel();
    host.context()
        .bus
        .subscribe(Topic::ProgressUpdated, "test", move |payload| {
            progress_tx
                .send(payload)
                .map_err(|e| EngramError::Backend(e.to_string()))
        });

    let node = FileNode::new(
        RootDirectory::Resource,
        vec![],
        "IntroductiontoQuantumNetworking.pdf",
        NodeType::File,
        None,
    );
    let document_id = node.id.clone();
    let tracking_id = node.tracking_id.clone();
    host.publish(Topic::SubmitDocument, serde_json::to_value(&node).unwrap());

    // The scan produced at least one observation rooted at the document.
    let payload = observation_rx
        .recv_timeout(Duration::from_secs(15))
        .expect("observation from the scan");
    let observation: ObservationCompleteMsg = serde_json::from_value(payload).unwrap();
    assert_eq!(
        observation.observation.parent_id.as_deref(),
        Some(document_id.as_str())
    );
    assert!(!observation.observation.engram_list.is_empty());
    assert!(observation
        .observation
        .engram_list
        .iter()
        .all(|e| e.is_native_source));

    // Indices were created, embedded, inserted, and the completion bubbled
    // all the way up to the document.
    let inserted = inserted_rx
        .recv_timeout(Duration::from_secs(15))
        .expect("document inserted");
    assert_eq!(inserted["id"], document_id.as_str());

    // The final progress report for our tracking id says 100%.
    let mut last_percent = 0.0;
    while let Ok(payload) = progress_rx.recv_timeout(Duration::from_millis(500)) {
        let progress: ProgressUpdatedMsg = serde_json::from_value(payload).unwrap();
        if progress.tracking_id == tracking_id {
            last_percent = progress.percent_complete;
        }
    }
    assert!((last_percent - 1.0).abs() < 1e-6);

    host.shutdown().unwrap();
}

#[test]
fn a_zero_page_document_fails_before_any_model_call() {
    use engramic_core::sense::{MockRasterizer, SenseService};
    use std::sync::Arc;

    let host = Host::new(
        "mock",
        vec![
            Box::new(MessageService::new()),
            Box::new(SenseService::with_rasterizer(Arc::new(MockRasterizer::new(
                0,
            )))),
        ],
    )
    .unwrap();

    let (tx, rx) = mpsc::channel();
    host.context()
        .bus
        .subscribe(Topic::ProgressUpdated, "test", move |payload| {
            tx.send(payload).map_err(|e| EngramError::Backend(e.to_string()))
        });

    let node = FileNode::new(
        RootDirectory::Resource,
        vec![],
        "empty.pdf",
        NodeType::File,
        None,
    );
    host.publish(Topic::SubmitDocument, serde_json::to_value(&node).unwrap());

    let payload = rx.recv_timeout(Duration::from_secs(10)).expect("failure report");
    let progress: ProgressUpdatedMsg = serde_json::from_value(payload).unwrap();
    assert!(progress
        .failed_message
        .as_deref()
        .unwrap_or_default()
        .contains("zero pages"));

    host.shutdown().unwrap();
}
