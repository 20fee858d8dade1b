//! Placeholder templates for family identifiers, display names and descriptions.
//!
//! Only a fixed set of placeholders is recognised (see [`Placeholder`]).
//! `{{` and `}}` produce literal braces. Anything else inside braces is a
//! parse error, so a typo in the config fails at load time rather than
//! leaking into the published manifest.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::TemplateError;

/// The recognised placeholder names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placeholder {
    /// The platform tag of the cell, e.g. `linux`.
    Platform,
    /// The raw upstream release tag.
    CommitHash,
    /// The release publish date, `YYYY-MM-DD`.
    ReleaseDate,
}

impl Placeholder {
    /// Every placeholder in a stable order.
    pub fn all() -> &'static [Placeholder] {
        &[
            Placeholder::Platform,
            Placeholder::CommitHash,
            Placeholder::ReleaseDate,
        ]
    }

    /// The name written between braces.
    pub fn name(&self) -> &'static str {
        match self {
            Placeholder::Platform => "platform",
            Placeholder::CommitHash => "commit_hash",
            Placeholder::ReleaseDate => "release_date",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Placeholder::all().iter().copied().find(|p| p.name() == name)
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Slot(Placeholder),
}

/// A parsed template. Serialises back to its source string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

/// Values available when applying a template.
///
/// Identifier and display-name templates are applied before a release is
/// known, so only `platform` is set at that point.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateVars<'a> {
    pub platform: Option<&'a str>,
    pub commit_hash: Option<&'a str>,
    pub release_date: Option<NaiveDate>,
}

impl<'a> TemplateVars<'a> {
    /// Vars with only the platform set.
    pub fn for_platform(platform: &'a str) -> Self {
        Self {
            platform: Some(platform),
            ..Self::default()
        }
    }

    /// Add the release-derived values.
    pub fn with_release(mut self, commit_hash: &'a str, release_date: NaiveDate) -> Self {
        self.commit_hash = Some(commit_hash);
        self.release_date = Some(release_date);
        self
    }

    fn value(&self, placeholder: Placeholder) -> Option<String> {
        match placeholder {
            Placeholder::Platform => self.platform.map(str::to_owned),
            Placeholder::CommitHash => self.commit_hash.map(str::to_owned),
            Placeholder::ReleaseDate => self
                .release_date
                .map(|d| d.format("%Y-%m-%d").to_string()),
        }
    }
}

impl Template {
    /// Parse `source`, rejecting unknown placeholders and unbalanced braces.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(ch) => name.push(ch),
                            None => {
                                return Err(TemplateError::Unterminated {
                                    template: source.to_owned(),
                                })
                            }
                        }
                    }
                    let placeholder = Placeholder::from_name(name.trim()).ok_or_else(|| {
                        TemplateError::UnknownPlaceholder {
                            name: name.trim().to_owned(),
                            template: source.to_owned(),
                        }
                    })?;
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Slot(placeholder));
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '}' => {
                    return Err(TemplateError::UnmatchedClose {
                        template: source.to_owned(),
                    })
                }
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Template {
            source: source.to_owned(),
            segments,
        })
    }

    /// The original template text.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Placeholders referenced by this template, in order of appearance.
    pub fn placeholders(&self) -> Vec<Placeholder> {
        let mut found = Vec::new();
        for segment in &self.segments {
            if let Segment::Slot(p) = segment {
                if !found.contains(p) {
                    found.push(*p);
                }
            }
        }
        found
    }

    /// Substitute every placeholder from `vars`.
    pub fn apply(&self, vars: &TemplateVars<'_>) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Slot(p) => {
                    let value = vars.value(*p).ok_or_else(|| TemplateError::Unavailable {
                        name: p.name(),
                        template: self.source.clone(),
                    })?;
                    out.push_str(&value);
                }
            }
        }
        Ok(out)
    }
}

impl TryFrom<String> for Template {
    type Error = TemplateError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Template::parse(&s)
    }
}

impl From<Template> for String {
    fn from(t: Template) -> Self {
        t.source
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.source.fmt(f)
    }
}
