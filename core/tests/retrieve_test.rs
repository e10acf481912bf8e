use std::sync::mpsc;
use std::time::Duration;

use engramic_core::event::{MessageService, Topic};
use engramic_core::host::Host;
use engramic_core::messages::RetrieveCompleteMsg;
use engramic_core::plugins::fixtures;
use engramic_core::retrieve::RetrieveService;
use engramic_core::types::Prompt;
use engramic_core::EngramError;

#[test]
fn retrieve_happy_path_matches_the_recorded_fixture() {
    let host = Host::new(
        "mock",
        vec![
            Box::new(MessageService::new()),
            Box::new(RetrieveService::new()),
        ],
    )
    .unwrap();

    let (tx, rx) = mpsc::channel();
    host.context()
        .bus
        .subscribe(Topic::RetrieveComplete, "test", move |payload| {
            tx.send(payload).map_err(|e| EngramError::Backend(e.to_string()))
        });

    let prompt = Prompt::new("Tell me about the All In podcast.", None).unwrap();
    let prompt_id = prompt.prompt_id.clone();
    host.publish(Topic::SubmitPrompt, serde_json::to_value(&prompt).unwrap());

    let payload = rx.recv_timeout(Duration::from_secs(10)).expect("retrieval");
    let msg: RetrieveCompleteMsg = serde_json::from_value(payload).unwrap();

    // The analysis carries the generated index phrases, order preserved.
    assert_eq!(msg.analysis.indices, fixtures::RETRIEVE_INDEX_PHRASES);
    assert_eq!(msg.analysis.response_length, "medium");

    // The candidate set is exactly the recorded vector query result.
    assert_eq!(msg.retrieve_result.engram_id_array, fixtures::ENGRAM_IDS);
    assert!(!msg.retrieve_result.conversation_direction.user_intent.is_empty());

    // The prompt rides along unchanged.
    assert_eq!(msg.prompt.prompt_id, prompt_id);

    host.shutdown().unwrap();
}

#[test]
fn prompt_created_is_announced_on_submission() {
    let host = Host::new(
        "mock",
        vec![
            Box::new(MessageService::new()),
            Box::new(RetrieveService::new()),
        ],
    )
    .unwrap();

    let (tx, rx) = mpsc::channel();
    host.context()
        .bus
        .subscribe(Topic::PromptCreated, "test", move |payload| {
            tx.send(payload).map_err(|e| EngramError::Backend(e.to_string()))
        });

    let prompt = Prompt::new("hello", None).unwrap();
    let tracking_id = prompt.tracking_id.clone();
    host.publish(Topic::SubmitPrompt, serde_json::to_value(&prompt).unwrap());

    let payload = rx.recv_timeout(Duration::from_secs(10)).unwrap();
    assert_eq!(payload["id"], prompt.prompt_id.as_str());
    assert_eq!(payload["tracking_id"], tracking_id.as_str());

    host.shutdown().unwrap();
}

#[test]
fn empty_repo_filter_list_is_rejected_before_submission() {
    let err = Prompt::new("x", Some(vec![])).unwrap_err();
    assert!(matches!(err, EngramError::Validation(_)));

    // None is accepted and resolves to the reserved null repo.
    let prompt = Prompt::new("x", None).unwrap();
    assert_eq!(prompt.effective_repo_filters(), vec!["null".to_string()]);
}
