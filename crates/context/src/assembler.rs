//! Context Assembler - Builds the outbound prompt
//!
//! Segments are emitted in a fixed order:
//! 1. User query
//! 2. Recent conversation history
//! 3. Knowledge (repositories, priority page, retrieval)
//! 4. Navigation instruction (page queries only)
//! 5. Behavioural instructions
//!
//! When the rendered prompt exceeds the budget, segments are cut in
//! [`TRUNCATION_ORDER`], so generic retrieval text always goes before the
//! priority page.

use crate::retrieval::{char_len, truncate_chars, Knowledge};
use genesis_common::config::{AssemblerConfig, HistoryConfig};
use genesis_common::metrics;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Separator placed between rendered segments
const SEGMENT_SEPARATOR: &str = "\n\n";

/// Marker appended to a history turn that was cut
const ELLIPSIS: &str = "...";

/// Order in which segments give up characters when over budget
pub const TRUNCATION_ORDER: [SegmentKind; 7] = [
    SegmentKind::Retrieval,
    SegmentKind::History,
    SegmentKind::Repository,
    SegmentKind::PriorityPage,
    SegmentKind::Query,
    SegmentKind::Navigation,
    SegmentKind::Instructions,
];

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    fn label(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Assistant => "ASSISTANT",
        }
    }
}

/// A prior turn of the active session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: Role,
    pub content: String,
}

impl HistoryTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Labels for prompt segments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Query,
    History,
    Repository,
    PriorityPage,
    Retrieval,
    Navigation,
    Instructions,
}

/// A labelled piece of the final prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub kind: SegmentKind,
    pub text: String,

    /// Whether budget enforcement shortened this segment
    pub truncated: bool,
}

impl Segment {
    fn new(kind: SegmentKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            truncated: false,
        }
    }
}

/// What the session can draw on, as seen by the instruction table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentPresence {
    Nothing,
    DocumentsOnly,
    RepositoriesOnly,
    DocumentsAndRepositories,
}

impl ContentPresence {
    pub fn from_flags(has_documents: bool, has_repositories: bool) -> Self {
        match (has_documents, has_repositories) {
            (false, false) => ContentPresence::Nothing,
            (true, false) => ContentPresence::DocumentsOnly,
            (false, true) => ContentPresence::RepositoriesOnly,
            (true, true) => ContentPresence::DocumentsAndRepositories,
        }
    }
}

/// Ordered prompt segments within a character budget
#[derive(Debug, Clone)]
pub struct AssembledContext {
    segments: Vec<Segment>,
    truncated: bool,
}

impl AssembledContext {
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn segment(&self, kind: SegmentKind) -> Option<&Segment> {
        self.segments.iter().find(|s| s.kind == kind)
    }

    /// True when any segment was shortened or dropped
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Character count of the rendered prompt
    pub fn char_count(&self) -> usize {
        rendered_len(&self.segments)
    }

    /// Final prompt text
    pub fn render(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(SEGMENT_SEPARATOR)
    }
}

/// Merges query, history and knowledge into one prompt
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    config: AssemblerConfig,
    history: HistoryConfig,
}

impl ContextAssembler {
    pub fn new(config: AssemblerConfig, history: HistoryConfig) -> Self {
        Self { config, history }
    }

    pub fn assemble(
        &self,
        query: &str,
        history: &[HistoryTurn],
        knowledge: &Knowledge,
        navigation_page: Option<u32>,
    ) -> AssembledContext {
        let mut segments = vec![Segment::new(SegmentKind::Query, query)];

        if let Some(block) = self.history_block(history) {
            segments.push(Segment::new(SegmentKind::History, block));
        }

        let knowledge_blocks = [
            (SegmentKind::Repository, &knowledge.repository_block),
            (SegmentKind::PriorityPage, &knowledge.priority_block),
            (SegmentKind::Retrieval, &knowledge.retrieval_block),
        ];
        for (kind, block) in knowledge_blocks {
            if let Some(text) = block.as_deref().map(str::trim_end) {
                if !text.is_empty() {
                    segments.push(Segment::new(kind, text));
                }
            }
        }

        if let Some(page) = navigation_page {
            segments.push(Segment::new(SegmentKind::Navigation, navigation_instruction(page)));
        }

        let presence = ContentPresence::from_flags(knowledge.has_documents, knowledge.has_repositories);
        segments.push(Segment::new(
            SegmentKind::Instructions,
            self.instruction_block(presence, !history.is_empty()),
        ));

        let truncated = enforce_budget(&mut segments, self.config.prompt_budget_chars);
        if truncated {
            metrics::record_prompt_truncation();
            warn!(
                budget = self.config.prompt_budget_chars,
                "Prompt exceeded budget and was truncated"
            );
        }

        let context = AssembledContext { segments, truncated };
        debug!(
            segments = context.segments.len(),
            chars = context.char_count(),
            "Prompt assembled"
        );
        context
    }

    /// Last `max_turns` turns, oldest first, each cut to `turn_max_chars`
    pub fn history_block(&self, history: &[HistoryTurn]) -> Option<String> {
        if history.is_empty() || self.history.max_turns == 0 {
            return None;
        }

        let start = history.len().saturating_sub(self.history.max_turns);
        let mut block = String::from("=== CONVERSATION HISTORY ===\n");
        for turn in &history[start..] {
            let content = if char_len(&turn.content) > self.history.turn_max_chars {
                format!("{}{}", truncate_chars(&turn.content, self.history.turn_max_chars), ELLIPSIS)
            } else {
                turn.content.clone()
            };
            block.push_str(&format!("{}: {}\n\n", turn.role.label(), content));
        }
        block.push_str("=== END OF HISTORY ===");
        Some(block)
    }

    pub fn instruction_block(&self, presence: ContentPresence, has_history: bool) -> String {
        let name = &self.config.assistant_name;
        let mut block = format!(
            "INSTRUCTIONS:\nLANGUAGE: Always answer in {}.\n\n",
            self.config.response_language
        );

        if has_history {
            block.push_str(
                "CONVERSATION FLOW:\n\
                 - You are already in the middle of a conversation with the user.\n\
                 - Do not greet the user or introduce yourself again.\n\
                 - Answer directly what the user is asking.\n\
                 - Use the history above for context but do not repeat it.\n\n",
            );
        }

        let role = match presence {
            ContentPresence::Nothing => format!(
                "You are {}, a friendly expert assistant.\n\
                 There is no content available in this conversation yet.\n\
                 The user can ingest a PDF document or attach a code repository for grounded answers.\n\
                 Until then, answer general questions as helpfully as you can.",
                name
            ),
            ContentPresence::DocumentsOnly => format!(
                "You are {}, an expert assistant for the documents provided above.\n\
                 Base your answers on that content and cite page numbers when they are known.\n\
                 If the documents do not contain the answer, say so.",
                name
            ),
            ContentPresence::RepositoriesOnly => format!(
                "You are {}, an expert software architect.\n\
                 You have access to the repository code provided above.\n\n\
                 CAPABILITIES:\n\
                 - Analyse and explain code\n\
                 - Suggest improvements and refactorings\n\
                 - Create new code files\n\n\
                 TO CREATE OR EDIT FILES, USE THIS FORMAT:\n\
                 *** WRITE_FILE: <relative_path> ***\n\
                 <content>\n\
                 *** END_WRITE ***",
                name
            ),
            ContentPresence::DocumentsAndRepositories => format!(
                "You are {}, an expert assistant with access to documents and code.\n\
                 You can analyse the documents and work with the code repositories.\n\n\
                 FOR FILES:\n\
                 *** WRITE_FILE: <path> ***\n\
                 <content>\n\
                 *** END_WRITE ***",
                name
            ),
        };
        block.push_str(&role);
        block
    }
}

/// Instruction that pins the answer to the requested page
pub fn navigation_instruction(page: u32) -> String {
    format!(
        "ACTIVE NAVIGATION INSTRUCTION:\n\
         The user is asking strictly about PAGE {page}.\n\
         Ignore any earlier conversation about other pages.\n\
         Use only the information under 'PRIORITY CONTEXT: PAGE {page}'.\n\
         If the answer is not in that section, consult the other fragments but give page {page} precedence.",
        page = page
    )
}

fn rendered_len(segments: &[Segment]) -> usize {
    let separators = segments.len().saturating_sub(1) * char_len(SEGMENT_SEPARATOR);
    segments.iter().map(|s| char_len(&s.text)).sum::<usize>() + separators
}

/// Cut segments in truncation order until the rendered prompt fits.
///
/// Returns whether anything was cut.
fn enforce_budget(segments: &mut Vec<Segment>, budget: usize) -> bool {
    let mut truncated = false;

    for kind in TRUNCATION_ORDER {
        let total = rendered_len(segments);
        if total <= budget {
            break;
        }
        let Some(idx) = segments.iter().position(|s| s.kind == kind) else {
            continue;
        };

        let over = total - budget;
        let len = char_len(&segments[idx].text);
        if over >= len {
            debug!(segment = ?kind, "Dropping prompt segment");
            segments.remove(idx);
        } else {
            let kept = truncate_chars(&segments[idx].text, len - over).to_string();
            segments[idx].text = kept;
            segments[idx].truncated = true;
        }
        truncated = true;
    }

    truncated
}
