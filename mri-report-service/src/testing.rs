//! Deterministic collaborators and fixtures shared by the unit tests.

use async_trait::async_trait;
use axum::Router;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use std::collections::HashSet;
use std::sync::Mutex;

use crate::error::ReportError;
use crate::extract::TextExtractor;
use crate::generator::ReportGenerator;

/// Answers by prompt prefix and records every prompt it was given.
pub struct ScriptedGenerator {
    replies: Vec<(&'static str, &'static str)>,
    fail_on: HashSet<&'static str>,
    auth_fail: bool,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(replies: Vec<(&'static str, &'static str)>) -> Self {
        Self {
            replies,
            fail_on: HashSet::new(),
            auth_fail: false,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// `"SUMMARY"`, `"PATIENT"` and `"RECS"` for the three MRI prompts.
    pub fn mri_defaults() -> Self {
        Self::new(vec![
            ("Summarize this MRI report", "SUMMARY"),
            ("Explain this MRI report", "PATIENT"),
            ("Based on this MRI report", "RECS"),
        ])
    }

    /// Fail with an upstream error for prompts starting with `prefix`.
    pub fn failing_on(mut self, prefix: &'static str) -> Self {
        self.fail_on.insert(prefix);
        self
    }

    pub fn rejecting_keys(mut self) -> Self {
        self.auth_fail = true;
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReportGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str, credential: &str) -> Result<String, ReportError> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        if self.auth_fail {
            return Err(ReportError::Auth(format!("key {} rejected", credential)));
        }
        if self.fail_on.iter().any(|prefix| prompt.starts_with(prefix)) {
            return Err(ReportError::Upstream("LLM API request failed: 503".to_string()));
        }

        self.replies
            .iter()
            .find(|(prefix, _)| prompt.starts_with(prefix))
            .map(|(_, reply)| reply.to_string())
            .ok_or_else(|| ReportError::Upstream(format!("no scripted reply for: {}", prompt)))
    }
}

/// Ignores the bytes and returns a fixed text.
pub struct FixedExtractor(pub String);

impl TextExtractor for FixedExtractor {
    fn extract(&self, _pdf: &[u8]) -> Result<String, ReportError> {
        Ok(self.0.clone())
    }
}

/// Builds a PDF with one page per entry; empty entries produce pages without text.
pub fn text_pdf(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let operations = if text.is_empty() {
            Vec::new()
        } else {
            vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ]
        };
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Count" => kids.len() as i64,
        "Kids" => kids,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

/// Serves `router` on an ephemeral local port and returns its base URL.
pub async fn spawn_stub(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}
