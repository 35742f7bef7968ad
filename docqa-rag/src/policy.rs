//! The context-only answering policy.
//!
//! [`AnswerPolicy`] holds the instructions sent with every generation request.
//! The rules whose outcome needs no model are also decided locally by
//! [`AnswerPolicy::precheck`], so those replies are exact and cost nothing:
//! greetings and other small talk, single-topic lookups with no match in the
//! retrieved context, abbreviation questions whose term never appears, and
//! questions for which nothing was retrieved.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::document::SearchResult;

/// Reply to a greeting.
pub const GREETING_REPLY: &str = "Hello, please ask your question.";
/// Reply to thanks.
pub const GRATITUDE_REPLY: &str =
    "You're welcome! Feel free to ask if you have any other questions.";
/// Reply to small talk.
pub const SMALL_TALK_REPLY: &str = "Please ask document related questions.";
/// No retrieved unit mentions the words of a short question.
pub const WORD_NOT_AVAILABLE: &str = "Specific word-related information not available.";
/// The expansion of an abbreviation is not in the context.
pub const ACRONYM_NOT_AVAILABLE: &str = "Information not available in given context.";
/// The answer is not explicitly stated in the context.
pub const NOT_AVAILABLE: &str = "Information is not available for this question.";
/// The concept of the question does not match the context.
pub const NOT_FOUND_MORE_INFO: &str =
    "Answer is not found in provided context. Provide more information.";
/// The question wording matched but its meaning did not.
pub const VARIATION_NOT_AVAILABLE: &str = "Answer for this question is not available.";
/// Extra phrasing pulls the question away from the context.
pub const ASK_FROM_DOCUMENT: &str = "Please ask questions from provided information.";
/// The question is unrelated, unclear or confusing.
pub const NEED_MORE_INFO: &str = "Please provide more information related to the question.";
/// A term in the question is not covered by the context.
pub const TERM_NOT_COVERED: &str = "Provide more information about the question.";

/// Fixed replies to questions about the assistant itself.
const META_REPLIES: [(&str, &str); 4] = [
    ("what can you do", "I provide guidance on topics based on the provided context."),
    ("are you a robot", "I am an AI designed to assist with inquiries."),
    ("where do you get your information", "I use specific data to generate answers."),
    (
        "can you give me an example",
        "Sure! You can ask about topics like 'What is my release code?'",
    ),
];

/// Lower-cased fragments that mark a reply as "not found in context".
const NO_ANSWER_MARKERS: [&str; 9] = [
    "information is not available",
    "information not available",
    "answer is not found",
    "answer for this question is not available",
    "please ask questions from provided information",
    "please provide more information related to the question",
    "provide more information about the question",
    "please ask document related questions",
    "i don't know",
];

/// Words ignored when deciding whether a short question matches the context.
const STOP_WORDS: [&str; 28] = [
    "a", "an", "the", "is", "are", "was", "were", "be", "what", "which", "who", "whom", "how",
    "why", "when", "where", "do", "does", "did", "of", "for", "to", "in", "on", "and", "or",
    "about", "me",
];

const POLICY_INSTRUCTIONS: &str = r#"You are a guide. Answer strictly from the context given below and from nothing else.

General requirements:
- If the answer is not explicitly stated in the context, reply exactly: "Information is not available for this question." Never use outside knowledge and never infer or guess an answer.
- Before answering, decide which of the rules below applies best to the question. When several apply, use the most specific one.
- Keep answers concise and brief.
- If the question confuses you, reply "Information not available please provide more information."

Rules, in priority order:

1. One-word questions. Treat the word as a topic. Find every entry in the context that mentions the word, list those entries separated by new lines, and give one answer synthesized from their combined context. If no entry mentions the word, reply exactly: "Specific word-related information not available."

2. Two- and three-word questions. First look for an entry whose question matches these words exactly or almost exactly and return its answer. If there is none, apply rule 1 to the words: list every entry mentioning them, separated by new lines, and synthesize an answer from their combined context. If no entry mentions them, reply exactly: "Specific word-related information not available."

3. Similar concepts. If the wording differs but the concept of the question clearly matches the context and you can answer confidently, answer. If the key term does not carry the intended meaning, or you are unsure, reply exactly: "Answer is not found in provided context. Provide more information."

4. Matching with small variations. Compare only against the questions in the context. A question still matches when phrases such as "related to" or "regarding" are added before or after it. Make sure the core question really aligns with the context; if it does not, reply exactly: "Answer for this question is not available."

5. Irrelevant or misleading variations. If extra phrases before or after the main question are unrelated to the context, reply exactly: "Please ask questions from provided information."

6. Unrelated or confusing questions. If the question is unrelated to the context, unclear, or partly confusing, reply exactly: "Please provide more information related to the question." If a term in the question is not covered by the context, reply exactly: "Provide more information about the question."

7. Abbreviations and full forms. For questions such as "what does ML stand for" or "what is the full form of DL", answer only if the expansion appears in the context. Otherwise reply exactly: "Information not available in given context."

8. Greetings and small talk. Do not search the context.
   - Greetings such as "Hello" or "Hi": "Hello, please ask your question."
   - Thanks: "You're welcome! Feel free to ask if you have any other questions."
   - Small talk such as "How are you?": "Please ask document related questions."
   - "What can you do?": "I provide guidance on topics based on the provided context."
   - "Are you a robot?": "I am an AI designed to assist with inquiries."
   - "Where do you get your information?": "I use specific data to generate answers."
   - "Can you give me an example?": "Sure! You can ask about topics like 'What is my release code?'"

Questions about tools or products that are not in the context (for example "how do I use ChatGPT?") must be answered with "I don't know"."#;

static GREETING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(hello|hi|hey|hiya|greetings|namaste|good (morning|afternoon|evening|day))( there| team| all)?$",
    )
    .expect("greeting pattern is valid")
});

static GRATITUDE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(ok(ay)? )?(thanks|thank you|thank u|thx|ty|many thanks)( (so|very) much| a lot)?( for .*)?$")
        .expect("gratitude pattern is valid")
});

static SMALL_TALK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(how are you( doing)?( today)?|how('s| is) it going|what'?s up|how do you do)$")
        .expect("small talk pattern is valid")
});

static ACRONYM_RES: LazyLock<[Regex; 4]> = LazyLock::new(|| {
    [
        r"(?:full ?form|expansion|abbreviation) of (?:the )?(?:word |term )?([a-z0-9][a-z0-9&.\-]*)$",
        r"what (?:does|do|is) ([a-z0-9][a-z0-9&.\-]*) stands? for",
        r"^([a-z0-9][a-z0-9&.\-]*) stands? for(?: what)?$",
        r"^expand ([a-z0-9][a-z0-9&.\-]*)$",
    ]
    .map(|pattern| Regex::new(pattern).expect("acronym pattern is valid"))
});

/// How an answer was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerKind {
    /// Generated from the retrieved context.
    Grounded,
    /// A canonical "not found in context" reply. Not an error.
    NoAnswer,
    /// A fixed reply to small talk that bypassed the context.
    Canned,
}

/// A reply decided without calling the generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// The exact reply text.
    pub text: &'static str,
    /// Whether the reply is canned or a "not found" answer.
    pub kind: AnswerKind,
}

impl Verdict {
    fn canned(text: &'static str) -> Self {
        Self { text, kind: AnswerKind::Canned }
    }

    fn no_answer(text: &'static str) -> Self {
        Self { text, kind: AnswerKind::NoAnswer }
    }
}

/// The behavioural policy sent with every generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerPolicy {
    instructions: String,
}

impl Default for AnswerPolicy {
    fn default() -> Self {
        Self { instructions: POLICY_INSTRUCTIONS.to_string() }
    }
}

impl AnswerPolicy {
    /// Use custom instructions instead of the built-in rules.
    pub fn with_instructions(instructions: impl Into<String>) -> Self {
        Self { instructions: instructions.into() }
    }

    /// The policy text given to the generator.
    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    /// Render the policy, context and question as a single prompt.
    pub fn render(&self, context: &str, question: &str) -> String {
        format!("{}\n\nContext:\n{context}\n\nQuestion:\n{question}\n", self.instructions)
    }

    /// Classify small talk that is answered without looking at any document.
    ///
    /// `question` must already be [normalized](normalize_question).
    pub fn small_talk(&self, question: &str) -> Option<Verdict> {
        let bare = question.trim_end_matches(['?', '!', '.', ',', ' ']);
        if GREETING_RE.is_match(bare) {
            return Some(Verdict::canned(GREETING_REPLY));
        }
        if GRATITUDE_RE.is_match(bare) {
            return Some(Verdict::canned(GRATITUDE_REPLY));
        }
        if SMALL_TALK_RE.is_match(bare) {
            return Some(Verdict::canned(SMALL_TALK_REPLY));
        }
        META_REPLIES.iter().find(|(q, _)| *q == bare).map(|(_, reply)| Verdict::canned(*reply))
    }

    /// Decide the reply locally when the retrieved context settles it.
    ///
    /// Returns `None` when the generator has to answer. `question` must
    /// already be [normalized](normalize_question).
    pub fn precheck(&self, question: &str, retrieved: &[SearchResult]) -> Option<Verdict> {
        if let Some(verdict) = self.small_talk(question) {
            return Some(verdict);
        }
        if retrieved.is_empty() {
            return Some(Verdict::no_answer(NOT_AVAILABLE));
        }

        let vocabulary = context_vocabulary(retrieved);

        if let Some(term) = abbreviation_term(question) {
            if !vocabulary.contains(&term) {
                return Some(Verdict::no_answer(ACRONYM_NOT_AVAILABLE));
            }
            return None;
        }

        let words = tokens(question);
        if (1..=3).contains(&words.len()) {
            let content: Vec<&String> =
                words.iter().filter(|w| !STOP_WORDS.contains(&w.as_str())).collect();
            if !content.is_empty() && !content.iter().any(|w| mentions(&vocabulary, w)) {
                return Some(Verdict::no_answer(WORD_NOT_AVAILABLE));
            }
        }

        None
    }

    /// Classify a generated reply.
    pub fn classify_reply(&self, reply: &str) -> AnswerKind {
        if is_no_answer(reply) { AnswerKind::NoAnswer } else { AnswerKind::Grounded }
    }
}

/// Whether `reply` is one of the canonical "not found in context" replies.
pub fn is_no_answer(reply: &str) -> bool {
    let lower = reply.to_lowercase();
    NO_ANSWER_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Trim, collapse internal whitespace and lower-case a question.
pub fn normalize_question(question: &str) -> String {
    question.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// The term an abbreviation question asks about, alphanumerics only.
fn abbreviation_term(question: &str) -> Option<String> {
    let bare = question.trim_end_matches(['?', '!', '.', ',', ' ']);
    ACRONYM_RES.iter().find_map(|re| re.captures(bare)).and_then(|caps| {
        let term: String =
            caps.get(1)?.as_str().chars().filter(|c| c.is_alphanumeric()).collect();
        (!term.is_empty()).then_some(term)
    })
}

/// Lower-cased alphanumeric words of `text`.
fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Whether `word` or an inflection of it, such as a plural, is in `vocabulary`.
fn mentions(vocabulary: &HashSet<String>, word: &str) -> bool {
    vocabulary.contains(word)
        || vocabulary.iter().any(|token| {
            token.starts_with(word)
                || (token.chars().count() >= 4 && word.starts_with(token.as_str()))
        })
}

/// Every word of the retrieved chunks, plus joined forms of punctuated
/// abbreviations such as `M.L.`, `R&D` or `E-KYC`.
fn context_vocabulary(retrieved: &[SearchResult]) -> HashSet<String> {
    let mut vocabulary = HashSet::new();
    for result in retrieved {
        vocabulary.extend(tokens(&result.chunk.text));
        for word in result.chunk.text.split_whitespace() {
            if word.chars().any(|c| !c.is_alphanumeric()) {
                let joined: String = word.chars().filter(|c| c.is_alphanumeric()).collect();
                if !joined.is_empty() {
                    vocabulary.insert(joined.to_lowercase());
                }
            }
        }
    }
    vocabulary
}
