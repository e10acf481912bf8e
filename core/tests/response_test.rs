use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use engramic_core::event::{MessageService, Topic};
use engramic_core::host::Host;
use engramic_core::messages::{MainPromptCompleteMsg, RetrieveCompleteMsg};
use engramic_core::plugins::fixtures;
use engramic_core::response::ResponseService;
use engramic_core::stream::ChannelSink;
use engramic_core::types::{ConversationDirection, Prompt, PromptAnalysis, RetrieveResult};
use engramic_core::EngramError;

fn retrieve_complete(prompt: Prompt) -> RetrieveCompleteMsg {
    RetrieveCompleteMsg {
        ask_id: "ask-1".to_string(),
        retrieve_result: RetrieveResult {
            ask_id: "ask-1".to_string(),
            engram_id_array: fixtures::ENGRAM_IDS.iter().map(|s| s.to_string()).collect(),
            conversation_direction: ConversationDirection {
                user_intent: "overview of the All In podcast".to_string(),
                ..Default::default()
            },
        },
        analysis: PromptAnalysis {
            response_length: "medium".to_string(),
            user_prompt_type: "question".to_string(),
            indices: fixtures::RETRIEVE_INDEX_PHRASES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        },
        prompt,
    }
}

#[test]
fn response_happy_path_matches_the_recorded_fixture() {
    let (sink, mut packets) = ChannelSink::new();
    let host = Host::new(
        "mock",
        vec![
            Box::new(MessageService::new()),
            Box::new(ResponseService::with_sink(Arc::new(sink))),
        ],
    )
    .unwrap();

    let (tx, rx) = mpsc::channel();
    host.context()
        .bus
        .subscribe(Topic::MainPromptComplete, "test", move |payload| {
            tx.send(payload).map_err(|e| EngramError::Backend(e.to_string()))
        });

    let prompt = Prompt::new("Tell me about the All In podcast.", None)
        .unwrap()
        .with_training_mode(true);
    let prompt_id = prompt.prompt_id.clone();
    host.publish(
        Topic::RetrieveComplete,
        serde_json::to_value(retrieve_complete(prompt)).unwrap(),
    );

    let payload = rx.recv_timeout(Duration::from_secs(10)).expect("response");
    let msg: MainPromptCompleteMsg = serde_json::from_value(payload).unwrap();

    assert_eq!(msg.response.response, fixtures::main_response_text());
    assert_eq!(msg.response.model, "mock-llm");
    assert_eq!(msg.prompt_id, prompt_id);
    assert!(msg.training_mode);

    // The hash is the digest of the full response text.
    let expected = format!("{:x}", md5_hex(&msg.response.response));
    assert_eq!(msg.response.hash, expected);

    // Every chunk was relayed to the streaming surface, terminal last.
    let mut streamed = String::new();
    let mut terminal_seen = false;
    while let Ok(packet) = packets.try_recv() {
        assert!(!terminal_seen, "no packets after the terminal one");
        streamed.push_str(&packet.text);
        terminal_seen = packet.is_terminal;
    }
    assert!(terminal_seen);
    assert_eq!(streamed, fixtures::main_response_text());

    host.shutdown().unwrap();
}

fn md5_hex(text: &str) -> md5::Digest {
    md5::compute(text)
}
