use crate::review::{Manifest, ValidationResult};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// What the sidebar currently highlights. Groups and flags are exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "index", rename_all = "camelCase")]
pub enum Selection {
    #[default]
    None,
    Group(usize),
    Flag(usize),
}

impl Selection {
    pub fn group(&self) -> Option<usize> {
        match self {
            Selection::Group(i) => Some(*i),
            _ => None,
        }
    }

    #[cfg(test)]
    pub fn flag(&self) -> Option<usize> {
        match self {
            Selection::Flag(i) => Some(*i),
            _ => None,
        }
    }
}

/// Intents sent by the sidebar surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Inbound {
    /// The surface was (re)created and needs the full state
    Ready,
    OpenGroup {
        #[serde(rename = "groupIndex")]
        index: usize,
    },
    OpenFlag {
        #[serde(default)]
        index: Option<usize>,
        file: String,
        line: u32,
        #[serde(rename = "clipText")]
        clip_text: String,
    },
    OpenExplanation,
    SelectFile,
    UnloadReview,
    OpenFile {
        #[serde(rename = "file")]
        path: String,
    },
}

/// State pushed to the sidebar surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Outbound {
    Update {
        review: Manifest,
        mtime: Option<SystemTime>,
        validation: ValidationResult,
        selection: Selection,
    },
    SelectGroup {
        index: usize,
    },
    SelectFlag {
        index: usize,
    },
    ClearSelection,
    Reset,
}

impl Outbound {
    /// Selection carried by this message, if it says anything about one
    #[cfg(test)]
    pub fn selection(&self) -> Option<Selection> {
        match self {
            Outbound::Update { selection, .. } => Some(*selection),
            Outbound::SelectGroup { index } => Some(Selection::Group(*index)),
            Outbound::SelectFlag { index } => Some(Selection::Flag(*index)),
            Outbound::ClearSelection | Outbound::Reset => Some(Selection::None),
        }
    }
}
