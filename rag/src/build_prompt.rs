/// Instruction sent as the system turn. `{context}` is replaced by the
/// retrieved documents.
pub const SYSTEM_TEMPLATE: &str = "You are an assistant for question-answering tasks about a movie catalog. \
Use the following pieces of context to answer the question. \
If you don't know the answer, say \"I don't know\". \
Use three sentences maximum and keep the answer concise. \
The context is strictly in JSON format with the fields title, year of release, genre, \
IMDb rating and a brief summary.\n\n\
{context}";

const CONTEXT_SEPARATOR: &str = "\n\n";

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptPayload {
    pub system_instruction: String,
    pub context: String,
    pub query: String,
}

impl PromptPayload {
    /// The system instruction with the context filled in.
    pub fn system_prompt(&self) -> String {
        self.system_instruction.replace("{context}", &self.context)
    }

    pub fn messages(&self) -> Vec<Message> {
        vec![
            Message {
                role: "system".to_string(),
                content: self.system_prompt(),
            },
            Message {
                role: "user".to_string(),
                content: self.query.clone(),
            },
        ]
    }
}

pub fn compose(query: &str, documents: &[String]) -> PromptPayload {
    PromptPayload {
        system_instruction: SYSTEM_TEMPLATE.to_string(),
        context: documents.join(CONTEXT_SEPARATOR),
        query: query.to_string(),
    }
}
