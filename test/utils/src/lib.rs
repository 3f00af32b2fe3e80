/// A single server-sent event carrying `content` as a chat completion delta.
pub fn sse_frame(content: &str) -> String {
    let body = serde_json::json!({
        "id": "chatcmpl-1",
        "object": "chat.completion.chunk",
        "choices": [{ "index": 0, "delta": { "content": content } }]
    });

    return format!("data: {body}\n\n");
}

pub fn sse_done() -> &'static str {
    return "data: [DONE]\n\n";
}

/// The canonical "Hello" stream split into two deltas and terminated with the
/// sentinel.
pub fn sse_fixture() -> &'static str {
    return "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\ndata: [DONE]\n\n";
}

/// A stream that mixes keep-alive comments, role-only deltas, a malformed
/// frame, and multi-byte characters.
pub fn sse_noisy_fixture() -> String {
    let mut body = String::new();
    body += ": keep-alive\n\n";
    body += "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n";
    body += &sse_frame("Grüße ");
    body += "data: {not json}\n\n";
    body += "event: ping\n\n";
    body += &sse_frame("aus ");
    body += &sse_frame("Köln 🌧");
    body += sse_done();

    return body;
}
