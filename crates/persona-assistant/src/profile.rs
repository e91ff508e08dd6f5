//! Profile Documents
//!
//! Loads the text the persona speaks from: a required `summary.txt` plus any
//! other `.txt`/`.md`/`.pdf` documents in the same directory (a LinkedIn
//! export, a CV), and renders them into the chat and evaluator system prompts.

use std::fs;
use std::io;
use std::panic;
use std::path::{Path, PathBuf};

use crate::error::{AssistantError, Result};

const SUMMARY_FILE: &str = "summary.txt";
const DOCUMENT_EXTENSIONS: &[&str] = &["txt", "md", "pdf"];

/// One supporting document
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProfileDocument {
    /// Heading derived from the file stem (`linkedin` -> `Linkedin`)
    pub title: String,

    pub content: String,
}

/// Everything the persona knows about the person it represents
#[derive(Clone, Debug)]
pub struct Profile {
    /// Person the assistant speaks for
    pub name: String,

    pub summary: String,

    /// Supporting documents, sorted by file name
    pub documents: Vec<ProfileDocument>,
}

impl Profile {
    pub fn new(name: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            summary: summary.into(),
            documents: Vec::new(),
        }
    }

    pub fn with_document(mut self, title: impl Into<String>, content: impl Into<String>) -> Self {
        self.documents.push(ProfileDocument {
            title: title.into(),
            content: content.into(),
        });
        self
    }

    /// Read a profile directory
    pub fn load(dir: impl AsRef<Path>, name: impl Into<String>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(AssistantError::ProfileNotFound(dir.to_path_buf()));
        }

        let summary_path = dir.join(SUMMARY_FILE);
        if !summary_path.is_file() {
            return Err(AssistantError::MissingSummary(summary_path));
        }
        let summary = read(&summary_path)?;

        let mut paths: Vec<PathBuf> = fs::read_dir(dir)
            .map_err(|source| AssistantError::Read {
                path: dir.to_path_buf(),
                source,
            })?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_document(path) && path != &summary_path)
            .collect();
        paths.sort();

        let documents = paths
            .iter()
            .map(|path| {
                Ok(ProfileDocument {
                    title: title_for(path),
                    content: read_document(path)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let profile = Self {
            name: name.into(),
            summary: summary.trim().to_string(),
            documents,
        };

        tracing::info!(
            name = %profile.name,
            documents = profile.documents.len(),
            "Loaded profile from {}",
            dir.display()
        );

        Ok(profile)
    }

    /// Summary and documents as markdown sections
    fn context(&self) -> String {
        let mut context = format!("## Summary:\n{}\n", self.summary);
        for doc in &self.documents {
            context.push_str(&format!("\n## {}:\n{}\n", doc.title, doc.content.trim()));
        }
        context
    }

    /// System prompt for the chat loop
    pub fn system_prompt(&self) -> String {
        let name = &self.name;
        format!(
            "You are acting as {name}. You are answering questions on {name}'s website, \
             particularly questions related to {name}'s career, background, skills and experience. \
             Your responsibility is to represent {name} for interactions on the website as faithfully as possible. \
             You are given a summary of {name}'s background and profile documents which you can use to answer questions. \
             Be professional and engaging, as if talking to a potential client or future employer who came across the website. \
             If you don't know the answer to any question, use your record_unknown_question tool to record the question \
             that you couldn't answer, even if it's about something trivial or unrelated to career. \
             If the user is engaging in discussion, try to steer them towards getting in touch via email; \
             ask for their email and record it using your record_user_details tool.\n\n\
             {context}\n\
             With this context, please chat with the user, always staying in character as {name}.",
            context = self.context(),
        )
    }

    /// System prompt for the reply evaluator
    pub fn evaluator_prompt(&self) -> String {
        let name = &self.name;
        format!(
            "You are an evaluator that decides whether a response to a question is acceptable. \
             You are provided with a conversation between a User and an Agent. Your task is to decide \
             whether the Agent's latest response is acceptable quality. \
             The Agent is playing the role of {name} and is representing {name} on their website. \
             The Agent has been instructed to be professional and engaging, as if talking to a potential \
             client or future employer who came across the website. \
             The Agent has been provided with context on {name} in the form of their summary and profile documents. \
             Here's the information:\n\n\
             {context}\n\
             With this context, please evaluate the latest response. \
             Answer with a JSON object {{\"is_acceptable\": true|false, \"feedback\": \"...\"}}.",
            context = self.context(),
        )
    }
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| AssistantError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn read_document(path: &Path) -> Result<String> {
    let is_pdf = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

    if is_pdf { read_pdf(path) } else { read(path) }
}

/// Text layer of a PDF, in page order
fn read_pdf(path: &Path) -> Result<String> {
    // pdf-extract panics on some malformed files instead of returning an error
    let extracted = panic::catch_unwind(|| pdf_extract::extract_text(path))
        .map_err(|_| "PDF parser panicked".to_string())
        .and_then(|result| result.map_err(|e| e.to_string()));

    extracted.map_err(|reason| {
        tracing::warn!("Could not extract text from {}: {}", path.display(), reason);
        AssistantError::Read {
            path: path.to_path_buf(),
            source: io::Error::other(reason),
        }
    })
}

fn is_document(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| DOCUMENT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

fn title_for(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Document")
        .replace(['_', '-'], " ");

    let mut chars = stem.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => stem,
    }
}
