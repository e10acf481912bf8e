//! Built-in deterministic fixtures for the mock backends.
//!
//! One coherent little memory: three engrams and three metas from a podcast
//! corpus, plus the canned model outputs the mock LLM serves per usage slot.
//! Integration tests treat these values as the recorded source of truth.

use serde_json::{json, Value};

pub const ENGRAM_IDS: [&str; 3] = [
    "c1d2e3f4-a5b6-4c78-9d0e-1f2a3b4c5d6e",
    "d2e3f4a5-b6c7-4d89-8e0f-2a3b4c5d6e7f",
    "e3f4a5b6-c7d8-4e9a-9f01-3b4c5d6e7f8a",
];

pub const META_IDS: [&str; 3] = [
    "a1b2c3d4-e5f6-4711-8097-92a8c3f6d5e7",
    "b2c3d4e5-f6a7-4811-8097-92a8c3f6d5e7",
    "c3d4e5f6-a7b8-4911-8097-92a8c3f6d5e7",
];

/// Lookup phrases generated during retrieval, order preserved.
pub const RETRIEVE_INDEX_PHRASES: [&str; 3] = [
    "overview of the All In podcast",
    "hosts appearing on the All In podcast",
    "recent market topics discussed on All In",
];

/// Lookup phrases generated during consolidation, order preserved.
pub const CONSOLIDATE_INDEX_PHRASES: [&str; 3] = [
    "inflation outlook for startup investors",
    "ai driven biotech startups in medicine",
    "role of government in venture funding",
];

pub const MAIN_RESPONSE_CHUNKS: [&str; 6] =
    ["The", " podcast", " covers", " markets", " and", " politics."];

pub fn main_response_text() -> String {
    MAIN_RESPONSE_CHUNKS.concat()
}

pub fn conversation_direction() -> Value {
    json!({
        "user_intent": "overview of the All In podcast topics and hosts",
        "working_memory": {
            "context": { "show": "All-In Podcast" }
        },
        "perform_research": false
    })
}

pub fn prompt_analysis() -> Value {
    json!({
        "response_length": "medium",
        "user_prompt_type": "question"
    })
}

pub fn engram_docs() -> Vec<Value> {
    vec![
        json!({
            "id": ENGRAM_IDS[0],
            "locations": ["file:///corpus/allin/episodes/167.csv"],
            "source_ids": ["550e8400-e29b-41d4-a716-446655440000"],
            "content": "Chamath explains his take on the latest inflation report and what it means for investors.",
            "is_native_source": true,
            "context": {
                "episode": 167,
                "segment": "Economic Trends",
                "show": "All-In Podcast"
            },
            "indices": null,
            "meta_ids": [META_IDS[0]],
            "library_ids": [],
            "accuracy": null,
            "relevancy": null,
            "created_date": 1714521600
        }),
        json!({
            "id": ENGRAM_IDS[1],
            "locations": ["file:///corpus/allin/episodes/168.csv"],
            "source_ids": ["660f9511-e39b-42d5-c817-667766552222"],
            "content": "Friedberg discusses AI-driven biotech startups and their impact on medicine.",
            "is_native_source": true,
            "context": {
                "episode": 168,
                "segment": "Tech & Innovation",
                "show": "All-In Podcast"
            },
            "indices": null,
            "meta_ids": [META_IDS[1]],
            "library_ids": [],
            "accuracy": null,
            "relevancy": null,
            "created_date": 1714608000
        }),
        json!({
            "id": ENGRAM_IDS[2],
            "locations": ["file:///corpus/allin/episodes/169.csv"],
            "source_ids": ["770a0612-f4ab-43e5-d927-778877663333"],
            "content": "Jason and Sacks debate the role of government in venture capital funding.",
            "is_native_source": true,
            "context": {
                "episode": 169,
                "segment": "Startups & VC",
                "show": "All-In Podcast"
            },
            "indices": null,
            "meta_ids": [META_IDS[2]],
            "library_ids": [],
            "accuracy": null,
            "relevancy": null,
            "created_date": 1714694400
        }),
    ]
}

pub fn meta_docs() -> Vec<Value> {
    vec![
        json!({
            "id": META_IDS[0],
            "type": "document",
            "locations": ["file:///corpus/allin/episodes/167.csv"],
            "source_ids": ["550e8400-e29b-41d4-a716-446655440000"],
            "keywords": ["inflation", "investors"],
            "summary_initial": "Episode 167 covers the current state of the market.",
            "summary_full": {
                "text": "Episode 167 covers the current state of the market and inflation.",
                "embedding": null
            },
            "parent_id": null
        }),
        json!({
            "id": META_IDS[1],
            "type": "document",
            "locations": ["file:///corpus/allin/episodes/168.csv"],
            "source_ids": ["660f9511-e39b-42d5-c817-667766552222"],
            "keywords": ["biotech", "medicine"],
            "summary_initial": "Episode 168 covers biotech.",
            "summary_full": {
                "text": "Episode 168 covers AI in biotech and medicine.",
                "embedding": null
            },
            "parent_id": null
        }),
        json!({
            "id": META_IDS[2],
            "type": "document",
            "locations": ["file:///corpus/allin/episodes/169.csv"],
            "source_ids": ["770a0612-f4ab-43e5-d927-778877663333"],
            "keywords": ["venture", "government"],
            "summary_initial": "Episode 169 covers venture capital.",
            "summary_full": {
                "text": "Episode 169 covers the role of government in venture capital.",
                "embedding": null
            },
            "parent_id": null
        }),
    ]
}

/// The validate response: two engrams above the score gate, one below.
pub fn validate_toml() -> String {
    format!(
        r#"[meta]
keywords = ["inflation", "investors", "biotech", "venture"]
summary_initial = "The podcast discusses markets, biotech, and venture capital."

[meta.summary_full]
text = "The podcast discusses the market, biotech, and the role of government in venture funding."

[[engram]]
accuracy = 4
relevancy = 4
content = "The podcast covers markets and politics."
is_native_source = false
locations = ["file:///corpus/allin/episodes/167.csv"]
source_ids = ["550e8400-e29b-41d4-a716-446655440000"]
meta_ids = ["{meta0}"]

[[engram]]
accuracy = 2
relevancy = 1
content = "The podcast is about tigers."
is_native_source = false
locations = ["file:///corpus/allin/episodes/168.csv"]
source_ids = ["660f9511-e39b-42d5-c817-667766552222"]
meta_ids = ["{meta1}"]

[[engram]]
accuracy = 4
relevancy = 4
content = "The hosts debate how much government belongs in venture funding."
is_native_source = false
locations = ["file:///corpus/allin/episodes/169.csv"]
source_ids = ["770a0612-f4ab-43e5-d927-778877663333"]
meta_ids = ["{meta2}"]
"#,
        meta0 = META_IDS[0],
        meta1 = META_IDS[1],
        meta2 = META_IDS[2],
    )
}

pub fn meta_summary_text() -> &'static str {
    "The All-In podcast covers markets, biotech, and venture capital."
}

pub fn initial_scan() -> Value {
    json!({
        "file_path": "resource:IntroductiontoQuantumNetworking.pdf",
        "file_name": "IntroductiontoQuantumNetworking.pdf",
        "subject": "quantum networking",
        "audience": "engineers new to the field",
        "document_title": "Introduction to Quantum Networking",
        "format": "technical overview",
        "type": "document",
        "toc": "1. Qubits 2. Entanglement 3. Repeaters",
        "summary_initial": "A primer on quantum networking concepts.",
        "author": "Q. Author",
        "date": "2024-01-01",
        "version": "1.0"
    })
}

pub fn page_markup(page: usize) -> String {
    format!(
        "<page>{n}</page><section>Fundamentals</section><h1>Qubits on page {n}</h1>\
<engram><p>Page {n}: a qubit carries quantum state across the network.</p></engram>\
<h3>Entanglement</h3><engram><p>Page {n}: entangled pairs enable teleportation of state.</p></engram>",
        n = page + 1
    )
}

pub fn full_summary() -> Value {
    json!({
        "summary_full": "An introduction to quantum networking: qubits, entanglement, and repeaters.",
        "keywords": "quantum,networking,entanglement"
    })
}
