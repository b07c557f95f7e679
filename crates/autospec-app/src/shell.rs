//! Interactive question loop over one session.
//!
//! Lines starting with `:` are commands; anything else is a question.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use autospec_chat::RagSession;
use autospec_core::types::SessionResponse;

/// Shown when a question arrives before any document is indexed.
pub const NOT_READY_MESSAGE: &str = "Please upload a document first.";

const HELP: &str = "\
Commands:
  :load PATH   index a document (PDF or form-feed paginated text)
  :reset       discard all documents and the conversation
  :history     show the conversation so far
  :status      show what is indexed
  :help        show this help
  :quit        exit
Anything else is asked as a question.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ask(String),
    Load(PathBuf),
    Reset,
    History,
    Status,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Command::Empty;
        }
        let Some(rest) = line.strip_prefix(':') else {
            return Command::Ask(line.to_string());
        };
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };
        match name {
            "load" | "l" if !arg.is_empty() => Command::Load(PathBuf::from(arg)),
            "reset" => Command::Reset,
            "history" | "h" => Command::History,
            "status" | "s" => Command::Status,
            "help" | "?" => Command::Help,
            "quit" | "q" | "exit" => Command::Quit,
            _ => Command::Unknown(line.to_string()),
        }
    }
}

pub enum Outcome {
    Continue(String),
    Quit,
}

/// Routes commands to the session, gating questions on readiness and
/// skipping documents whose file name was already indexed.
pub struct Shell {
    session: RagSession,
    loaded: HashSet<String>,
}

impl Shell {
    pub fn new(session: RagSession) -> Self {
        Self {
            session,
            loaded: HashSet::new(),
        }
    }

    pub fn session(&self) -> &RagSession {
        &self.session
    }

    /// Index a document unless one with the same file name is already loaded.
    pub async fn load(&mut self, path: &Path) -> String {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        if self.loaded.contains(&name) {
            info!(document = %name, "Already indexed, skipping");
            return format!("{name} is already indexed.");
        }
        match self.session.process_document_path(path).await {
            Ok(chunks) => {
                self.loaded.insert(name.clone());
                format!("Indexed {name}: {chunks} chunks.")
            }
            Err(e) => {
                warn!(document = %name, error = %e, "Failed to index document");
                format!("Could not index {name}: {e}")
            }
        }
    }

    pub async fn execute(&mut self, command: Command) -> Outcome {
        let text = match command {
            Command::Empty => String::new(),
            Command::Quit => return Outcome::Quit,
            Command::Help => HELP.to_string(),
            Command::Unknown(line) => format!("Unknown command: {line}\n{HELP}"),
            Command::Load(path) => self.load(&path).await,
            Command::Reset => match self.session.reset() {
                Ok(()) => {
                    self.loaded.clear();
                    "Session reset. Load a document to continue.".to_string()
                }
                Err(e) => format!("Reset failed: {e}"),
            },
            Command::History => self.render_history(),
            Command::Status => {
                let stats = self.session.stats();
                format!(
                    "{} documents, {} chunks, {} turns.",
                    stats.documents,
                    stats.chunks,
                    self.session.history().len()
                )
            }
            Command::Ask(question) => {
                if !self.session.is_ready() {
                    NOT_READY_MESSAGE.to_string()
                } else {
                    match self.session.get_response(&question).await {
                        Ok(response) => render_response(&response),
                        Err(e) if e.is_retryable() => format!("{e}\nPlease try again."),
                        Err(e) => e.to_string(),
                    }
                }
            }
        };
        Outcome::Continue(text)
    }

    fn render_history(&self) -> String {
        let history = self.session.history();
        if history.is_empty() {
            return "No questions asked yet.".to_string();
        }
        let mut out = String::new();
        for (i, turn) in history.iter().enumerate() {
            let _ = writeln!(out, "[{}] Q: {}", i + 1, turn.question);
            let _ = writeln!(out, "    A: {}", turn.answer);
        }
        out.trim_end().to_string()
    }
}

/// Format an answer followed by its numbered sources.
pub fn render_response(response: &SessionResponse) -> String {
    let mut out = response.answer.clone();
    if !response.source_documents.is_empty() {
        out.push_str("\n\nSources:");
        for (i, doc) in response.source_documents.iter().enumerate() {
            let _ = write!(
                out,
                "\n[{}] {}, page {}: {}",
                i + 1,
                doc.source,
                doc.page_number,
                doc.text_excerpt.replace('\n', " ")
            );
        }
    }
    out
}
