use std::sync::mpsc;
use std::time::Duration;

use engramic_core::codify::CodifyService;
use engramic_core::consolidate::ConsolidateService;
use engramic_core::event::{MessageService, Topic};
use engramic_core::host::Host;
use engramic_core::progress::ProgressService;
use engramic_core::response::ResponseService;
use engramic_core::retrieve::RetrieveService;
use engramic_core::storage::StorageService;
use engramic_core::types::Prompt;
use engramic_core::EngramError;

/// The full loop: submit_prompt -> retrieve_complete -> main_prompt_complete
/// -> observation_complete -> engram/index completion -> vector insertion ->
/// progress bubbling back up to the prompt.
#[test]
fn a_training_prompt_flows_through_the_entire_memory_loop() {
    let host = Host::new(
        "mock",
        vec![
            Box::new(MessageService::new()),
            Box::new(RetrieveService::new()),
            Box::new(ResponseService::new()),
            Box::new(CodifyService::new()),
            Box::new(ConsolidateService::new()),
            Box::new(StorageService::new()),
            Box::new(ProgressService::new()),
        ],
    )
    .unwrap();

    let subscribe = |topic: Topic| {
        let (tx, rx) = mpsc::channel();
        host.context().bus.subscribe(topic, "test", move |payload| {
            tx.send(payload).map_err(|e| EngramError::Backend(e.to_string()))
        });
        rx
    };
    let retrieve_rx = subscribe(Topic::RetrieveComplete);
    let response_rx = subscribe(Topic::MainPromptComplete);
    let observation_rx = subscribe(Topic::ObservationComplete);
    let engram_rx = subscribe(Topic::EngramComplete);
    let prompt_inserted_rx = subscribe(Topic::PromptInserted);

    let prompt = Prompt::new("Tell me about the All In podcast.", None)
        .unwrap()
        .with_training_mode(true);
    let prompt_id = prompt.prompt_id.clone();
    host.publish(Topic::SubmitPrompt, serde_json::to_value(&prompt).unwrap());

    let timeout = Duration::from_secs(15);
    retrieve_rx.recv_timeout(timeout).expect("retrieve completed");
    response_rx.recv_timeout(timeout).expect("response completed");
    observation_rx
        .recv_timeout(timeout)
        .expect("answer was codified");
    engram_rx.recv_timeout(timeout).expect("engram consolidated");

    // Once every generated index is inserted, the prompt itself is done.
    let inserted = prompt_inserted_rx
        .recv_timeout(timeout)
        .expect("prompt bubbled to completion");
    assert_eq!(inserted["id"], prompt_id.as_str());

    host.shutdown().unwrap();
}
