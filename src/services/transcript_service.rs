use crate::{
    models::{Author, ConversationDetail, ConversationPart},
    utils::strip_markup,
};

/// Speaker label used in flattened transcripts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptRole {
    User,
    Agent,
}

impl TranscriptRole {
    /// Map an upstream author type. Bots and teams are not part of the dialogue.
    pub fn from_author_type(author_type: &str) -> Option<Self> {
        match author_type {
            "user" | "lead" | "contact" => Some(TranscriptRole::User),
            "admin" => Some(TranscriptRole::Agent),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TranscriptRole::User => "USER",
            TranscriptRole::Agent => "AGENT",
        }
    }
}

/// Pure transcript flattening.
///
/// Output is one `ROLE: text` line per message, in conversation order.
pub struct TranscriptService;

impl TranscriptService {
    /// Flatten a full conversation payload.
    pub fn extract(detail: &ConversationDetail) -> String {
        let opening = detail.source.as_ref().and_then(|source| {
            // An opening message without an author came from the customer.
            let role = match source.author.as_ref().and_then(author_type) {
                Some(kind) => TranscriptRole::from_author_type(kind)?,
                None => TranscriptRole::User,
            };
            Some((role, source.body.as_deref().unwrap_or_default()))
        });

        Self::build(opening, detail.parts())
    }

    /// Flatten an opening message plus reply parts.
    pub fn build(opening: Option<(TranscriptRole, &str)>, parts: &[ConversationPart]) -> String {
        let replies = parts.iter().filter_map(|part| {
            if part.part_type.as_deref() != Some("comment") {
                return None;
            }
            let role = part
                .author
                .as_ref()
                .and_then(author_type)
                .and_then(TranscriptRole::from_author_type)?;
            Some((role, part.body.as_deref().unwrap_or_default()))
        });

        opening
            .into_iter()
            .chain(replies)
            .filter_map(|(role, body)| {
                let text = strip_markup(body);
                if text.is_empty() {
                    None
                } else {
                    Some(format!("{}: {}", role.label(), text))
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn author_type(author: &Author) -> Option<&str> {
    author.author_type.as_deref()
}
