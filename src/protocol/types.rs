//! Protocol Types

use serde::{Deserialize, Serialize};

/// Messages exchanged with the browser extension, tagged by `type`.
///
/// Field names follow the extension's wire format (camelCase).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BridgeMessage {
    /// Greeting sent right after the extension attaches; no reply expected
    #[serde(rename = "WELCOME")]
    Welcome { message: String },

    /// Extraction request forwarded to the extension
    #[serde(rename = "GET_SUBTITLE")]
    #[serde(rename_all = "camelCase")]
    GetSubtitle {
        video_url: String,
        request_id: String,
    },

    /// Extraction result reported by the extension
    #[serde(rename = "SUBTITLE_RESULT")]
    SubtitleResult(SubtitleResult),
}

impl BridgeMessage {
    /// Decode a raw text frame
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Result payload for a single extraction request.
///
/// Exactly one of `data` or `error` is expected; a payload carrying
/// neither is a protocol violation surfaced to the one affected caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtitleResult {
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<SubtitleData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Extracted video metadata and transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleData {
    pub title: String,
    pub author: String,
    pub url: String,
    pub ctime: u64,
    pub subtitles: Vec<TranscriptItem>,
}

/// One transcript line with its time range in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptItem {
    pub from: f64,
    pub to: f64,
    pub content: String,
}
