//! Canned replies used while the channel is unavailable.

use crate::types::MessageMetadata;

pub const FALLBACK_ERROR: &str = "Backend server not available";

/// Pick a reply for `user_message` by simple keyword matching.
pub fn simulated_reply(user_message: &str, has_document: bool) -> &'static str {
    let text = user_message.to_lowercase();
    let mentions = |words: &[&str]| words.iter().any(|word| text.contains(word));

    if has_document {
        if mentions(&["hello", "hi"]) {
            return "Hello! I'm ready to help you with your document. I can answer questions, provide summaries, or explain specific parts. What would you like to know about this document?";
        }
        if mentions(&["summary", "summarize"]) {
            return "I'd be happy to provide a summary of your document! In full mode, I would analyze the content and give you key points and main ideas. Right now I'm in demo mode, but you can ask me specific questions about the document.";
        }
        if mentions(&["explain", "what does"]) {
            return "I can help explain parts of your document! In full mode, I would search through the content to find relevant information. What specific part would you like me to explain?";
        }
        if mentions(&["question", "ask"]) {
            return "Feel free to ask me any questions about your document! I can help with understanding concepts, finding specific information, or clarifying details. What would you like to know?";
        }
        return "I'm here to help you with your document! I can answer questions, provide insights, or help you understand the content better. What would you like to know?";
    }

    if mentions(&["hello", "hi"]) {
        return "Hello! I'm currently in demo mode. To enable full document search, please start the chat backend server.";
    }
    if mentions(&["help"]) {
        return "I'd be happy to help! Right now I'm running in demo mode. For real AI assistance with document knowledge, please start the backend server.";
    }
    if mentions(&["document", "upload"]) {
        return "In full mode, I can search through your uploaded documents to provide accurate answers. Upload documents and I'll use them to enhance my responses!";
    }
    if mentions(&["backend", "server"]) {
        return "The chat backend is not reachable. Start the backend server and use /retry to reconnect.";
    }

    "I understand your question. In demo mode, I can provide general assistance. For more accurate responses with document knowledge, please start the backend server."
}

pub fn fallback_metadata() -> MessageMetadata {
    MessageMetadata {
        fallback_mode: Some(true),
        error: Some(FALLBACK_ERROR.to_string()),
        ..MessageMetadata::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_general_keywords() {
        assert!(simulated_reply("Hello there", false).starts_with("Hello!"));
        assert!(simulated_reply("can you HELP me", false).contains("happy to help"));
        assert!(simulated_reply("upload a file", false).contains("uploaded documents"));
        assert!(simulated_reply("is the server up", false).contains("backend"));
        assert!(simulated_reply("tell me a joke", false).starts_with("I understand"));
    }

    #[test]
    fn test_document_keywords() {
        assert!(simulated_reply("please summarize", true).contains("summary"));
        assert!(simulated_reply("explain section 2", true).contains("explain"));
        assert!(simulated_reply("quick question", true).contains("Feel free"));
        assert!(simulated_reply("zzz", true).starts_with("I'm here to help"));
    }

    #[test]
    fn test_fallback_metadata() {
        let meta = fallback_metadata();
        assert_eq!(meta.fallback_mode, Some(true));
        assert_eq!(meta.error.as_deref(), Some(FALLBACK_ERROR));
        assert_eq!(meta.streaming, None);
    }
}
