//! Conversation construction for the chat-completions endpoint.
//!
//! Each pipeline stage (describe, evaluate, plan, reflect, remember,
//! resolve-app) builds its own [`Conversation`] and drops it after the
//! call; histories are never shared between stages.

use serde::{Deserialize, Serialize};

use crate::device::Screenshot;

/// One message in OpenAI chat format with multi-part content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: Vec<ContentPart>,
}

/// Text or image part of a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Ordered message history for one model call.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    /// Start a conversation with a system prompt.
    pub fn with_system(prompt: &str) -> Self {
        let mut conversation = Self::default();
        conversation.push_text("system", prompt);
        conversation
    }

    /// Append a user message of text plus any number of screenshots.
    pub fn push_user(&mut self, text: &str, images: &[&Screenshot]) {
        let mut content = vec![ContentPart::Text {
            text: text.to_string(),
        }];
        for image in images {
            content.push(ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: image.data_url(),
                },
            });
        }
        self.messages.push(Message {
            role: "user".to_string(),
            content,
        });
    }

    /// Append an assistant reply.
    pub fn push_assistant(&mut self, text: &str) {
        self.push_text("assistant", text);
    }

    fn push_text(&mut self, role: &str, text: &str) {
        self.messages.push(Message {
            role: role.to_string(),
            content: vec![ContentPart::Text {
                text: text.to_string(),
            }],
        });
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tiny_screenshot() -> Screenshot {
        let img = image::RgbImage::from_pixel(2, 2, image::Rgb([0, 0, 0]));
        let mut buf = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        Screenshot::from_png(buf.into_inner()).unwrap()
    }

    #[test]
    fn serializes_to_wire_shape() {
        let mut chat = Conversation::with_system("be helpful");
        let shot = tiny_screenshot();
        chat.push_user("what is on screen?", &[&shot]);

        let json = serde_json::to_value(chat.messages()).unwrap();
        assert_eq!(json[0]["role"], "system");
        assert_eq!(json[0]["content"][0]["type"], "text");
        assert_eq!(json[1]["role"], "user");
        assert_eq!(json[1]["content"][0]["text"], "what is on screen?");
        assert_eq!(json[1]["content"][1]["type"], "image_url");
        let url = json[1]["content"][1]["image_url"]["url"].as_str().unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn assistant_turns_round_trip() {
        let mut chat = Conversation::with_system("sys");
        chat.push_user("hi", &[]);
        chat.push_assistant("hello");
        assert_eq!(chat.messages().len(), 3);
        assert_eq!(chat.messages()[2].role, "assistant");
    }
}
