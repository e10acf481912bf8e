use std::sync::mpsc;
use std::time::Duration;

use engramic_core::codify::CodifyService;
use engramic_core::event::{MessageService, Topic};
use engramic_core::host::Host;
use engramic_core::messages::{MainPromptCompleteMsg, ObservationCompleteMsg};
use engramic_core::plugins::fixtures;
use engramic_core::types::{ConversationDirection, PromptAnalysis, Response, RetrieveResult};
use engramic_core::EngramError;

fn main_prompt_complete(training_mode: bool) -> MainPromptCompleteMsg {
    let response = Response::new(
        fixtures::main_response_text(),
        RetrieveResult {
            ask_id: "ask-1".to_string(),
            engram_id_array: fixtures::ENGRAM_IDS.iter().map(|s| s.to_string()).collect(),
            conversation_direction: ConversationDirection::default(),
        },
        "Tell me about the All In podcast.",
        PromptAnalysis::default(),
        "mock-llm",
    );
    MainPromptCompleteMsg {
        response,
        prompt_id: "prompt-1".to_string(),
        training_mode,
        tracking_id: "track-1".to_string(),
    }
}

#[test]
fn codify_happy_path_matches_the_recorded_fixture() {
    let host = Host::new(
        "mock",
        vec![
            Box::new(MessageService::new()),
            Box::new(CodifyService::new()),
        ],
    )
    .unwrap();

    let (tx, rx) = mpsc::channel();
    host.context()
        .bus
        .subscribe(Topic::ObservationComplete, "test", move |payload| {
            tx.send(payload).map_err(|e| EngramError::Backend(e.to_string()))
        });

    host.publish(
        Topic::MainPromptComplete,
        serde_json::to_value(main_prompt_complete(true)).unwrap(),
    );

    let payload = rx.recv_timeout(Duration::from_secs(10)).expect("observation");
    let msg: ObservationCompleteMsg = serde_json::from_value(payload).unwrap();
    let observation = msg.observation;

    // The 2/1-scored engram fell below the gate; two survive, derived.
    assert_eq!(observation.engram_list.len(), 2);
    assert!(observation.engram_list.iter().all(|e| !e.is_native_source));
    let contents: Vec<&str> = observation
        .engram_list
        .iter()
        .map(|e| e.content.as_str())
        .collect();
    assert!(contents.contains(&"The podcast covers markets and politics."));
    assert!(contents.contains(&"The hosts debate how much government belongs in venture funding."));

    // The meta unions the survivors' sources.
    assert_eq!(observation.meta.source_ids.len(), 2);
    assert!(!observation.meta.summary_full.text.is_empty());
    assert_eq!(observation.parent_id.as_deref(), Some("prompt-1"));

    host.shutdown().unwrap();
}

#[test]
fn codify_announces_the_created_nodes_before_completion() {
    let host = Host::new(
        "mock",
        vec![
            Box::new(MessageService::new()),
            Box::new(CodifyService::new()),
        ],
    )
    .unwrap();

    let (tx, rx) = mpsc::channel();
    {
        let tx = tx.clone();
        host.context()
            .bus
            .subscribe(Topic::ObservationCreated, "test", move |payload| {
                tx.send(("created", payload))
                    .map_err(|e| EngramError::Backend(e.to_string()))
            });
    }
    host.context()
        .bus
        .subscribe(Topic::ObservationComplete, "test", move |payload| {
            tx.send(("complete", payload))
                .map_err(|e| EngramError::Backend(e.to_string()))
        });

    host.publish(
        Topic::MainPromptComplete,
        serde_json::to_value(main_prompt_complete(true)).unwrap(),
    );

    let (first, created) = rx.recv_timeout(Duration::from_secs(10)).unwrap();
    let (second, _) = rx.recv_timeout(Duration::from_secs(10)).unwrap();
    assert_eq!(first, "created");
    assert_eq!(second, "complete");
    assert_eq!(created["parent_id"], "prompt-1");

    host.shutdown().unwrap();
}

#[test]
fn training_mode_off_skips_codification() {
    let host = Host::new(
        "mock",
        vec![
            Box::new(MessageService::new()),
            Box::new(CodifyService::new()),
        ],
    )
    .unwrap();

    let (tx, rx) = mpsc::channel();
    host.context()
        .bus
        .subscribe(Topic::ObservationComplete, "test", move |payload| {
            tx.send(payload).map_err(|e| EngramError::Backend(e.to_string()))
        });

    host.publish(
        Topic::MainPromptComplete,
        serde_json::to_value(main_prompt_complete(false)).unwrap(),
    );

    assert!(rx.recv_timeout(Duration::from_millis(800)).is_err());
    host.shutdown().unwrap();
}
