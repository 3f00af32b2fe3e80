use serde_json::json;

use super::BackendPrompt;
use super::ChatMessage;
use super::ContentPart;
use super::ImageRequest;
use super::ImageUrl;
use super::MessageContent;
use crate::domain::models::Author;
use crate::domain::models::Message;
use crate::domain::models::MessageType;
use crate::domain::models::ModelKind;

#[test]
fn it_builds_a_single_user_message() {
    let prompt = BackendPrompt::new("Hello world", "openai");

    assert_eq!(
        prompt.messages(),
        vec![ChatMessage::new("user", "Hello world")]
    );
}

#[test]
fn it_puts_the_system_prompt_first() {
    let mut prompt = BackendPrompt::new("Hello world", "openai");
    prompt.system_prompt = Some("Be terse.".to_string());

    assert_eq!(
        prompt.messages(),
        vec![
            ChatMessage::new("system", "Be terse."),
            ChatMessage::new("user", "Hello world"),
        ]
    );
}

#[test]
fn it_ignores_blank_system_prompts() {
    let mut prompt = BackendPrompt::new("Hello world", "openai");
    prompt.system_prompt = Some("   ".to_string());

    assert_eq!(prompt.messages().len(), 1);
}

#[test]
fn it_carries_chat_history_without_notices() {
    let history = vec![
        Message::new(Author::User, "Hi"),
        Message::new(Author::Model, "How may I help you?"),
        Message::new(Author::Pollen, "Stopped."),
        Message::new_with_type(Author::Model, MessageType::Error, "It broke!"),
    ];
    let prompt = BackendPrompt::new("Say hi to the world", "openai").with_history(&history);

    assert_eq!(
        prompt.messages(),
        vec![
            ChatMessage::new("user", "Hi"),
            ChatMessage::new("assistant", "How may I help you?"),
            ChatMessage::new("user", "Say hi to the world"),
        ]
    );
}

#[test]
fn it_classifies_image_requests() {
    let mut req = ImageRequest::new("a red fox");
    assert_eq!(req.kind(), ModelKind::Image);

    req.model = "seedance".to_string();
    assert_eq!(req.kind(), ModelKind::Video);
}

#[test]
fn it_attaches_images_to_the_new_user_turn() {
    let history = vec![Message::new(Author::User, "Hi"), Message::new(Author::Model, "Hello!")];
    let mut prompt = BackendPrompt::new("What is in this picture?", "openai").with_history(&history);
    prompt.attachments = vec!["https://example.com/cat.png".to_string()];

    let messages = prompt.messages();
    assert_eq!(messages[0], ChatMessage::new("user", "Hi"));
    assert_eq!(
        serde_json::to_value(&messages[2]).unwrap(),
        json!({
            "role": "user",
            "content": [
                { "type": "text", "text": "What is in this picture?" },
                { "type": "image_url", "image_url": { "url": "https://example.com/cat.png" } }
            ]
        })
    );
}

#[test]
fn it_sends_plain_text_without_attachments() {
    let message = ChatMessage::with_images("user", "Hi", &[]);

    assert_eq!(message.content, MessageContent::Text("Hi".to_string()));
    assert_eq!(
        serde_json::to_value(&message).unwrap(),
        json!({ "role": "user", "content": "Hi" })
    );
}

#[test]
fn it_reads_multi_part_messages_back() {
    let message: ChatMessage = serde_json::from_value(json!({
        "role": "user",
        "content": [{ "type": "image_url", "image_url": { "url": "data:image/png;base64,iVBORw==" } }]
    }))
    .unwrap();

    assert_eq!(
        message.content,
        MessageContent::Parts(vec![ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: "data:image/png;base64,iVBORw==".to_string()
            }
        }])
    );
}

#[test]
fn it_randomizes_seeds_within_range() {
    let mut req = ImageRequest::new("a red fox");
    for _ in 0..50 {
        req.randomize_seed();
        assert!(req.seed < 1_000_000);
    }
}
