// ============================================================================
// AI ENHANCEMENT — generative image rework of the composed thumbnail
// ============================================================================
//
// One blocking POST to the streaming generate-content endpoint; the response
// body is a JSON array of fragments that is folded in order. Stop reasons
// (safety, copyright, token limit) are advisory diagnostics: the scan keeps
// going and a later fragment carrying an image still succeeds. The first
// non-empty inline image wins. The client is cheap to clone and is handed to
// a worker thread so the UI never blocks on the network.

use serde::{Deserialize, Serialize};

const MODEL: &str = "gemini-2.5-flash-image-preview";
const ENDPOINT_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Safety,
    Copyright,
    TokenLimit,
    Unspecified,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnhanceError {
    /// No API key configured; the UI should re-prompt for one.
    NotConfigured,
    MissingField(&'static str),
    /// Guided mode was requested without an instruction.
    PromptRequired,
    /// The model stopped without producing an image.
    Blocked(StopReason),
    Transport(String),
    /// Non-success HTTP status from the API.
    Api { status: u16, message: String },
    /// The stream ended with no image; carries any text the model returned.
    NoImage(Option<String>),
}

impl std::fmt::Display for EnhanceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnhanceError::NotConfigured => {
                write!(f, "API not initialized. Please set your API key.")
            }
            EnhanceError::MissingField(field) => write!(f, "Missing {}", field),
            EnhanceError::PromptRequired => {
                write!(f, "Enter an enhancement instruction or use Feeling Lucky.")
            }
            EnhanceError::Blocked(StopReason::Safety) => write!(
                f,
                "Content was blocked due to safety concerns. Try modifying your prompt to be less sensitive."
            ),
            EnhanceError::Blocked(StopReason::Copyright) => {
                write!(f, "Content was blocked due to copyright concerns.")
            }
            EnhanceError::Blocked(StopReason::TokenLimit) => {
                write!(f, "Generation ran out of output tokens. Please try again.")
            }
            EnhanceError::Blocked(StopReason::Unspecified) => {
                write!(f, "Generation was stopped for unspecified reasons. Please try again.")
            }
            EnhanceError::Transport(e) => write!(f, "Network error: {}", e),
            EnhanceError::Api { status, message } => {
                write!(f, "API error ({}): {}", status, message)
            }
            EnhanceError::NoImage(Some(text)) => {
                write!(f, "API returned text instead of image: {}", text)
            }
            EnhanceError::NoImage(None) => {
                write!(f, "No image was generated. Please try again.")
            }
        }
    }
}

/// One enhancement request. `scene_png` is the composed scene as a PNG data
/// URL (the prefix is stripped on the wire and reattached on the way back).
pub struct EnhanceRequest {
    pub scene_png: String,
    pub video_context: String,
    pub user_prompt: Option<String>,
    pub is_lucky: bool,
}

// ---------------------------------------------------------------------------
//  Wire format
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<RequestContent>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct RequestContent {
    role: &'static str,
    parts: Vec<RequestPart>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(skip_serializing_if = "Option::is_none")]
    mime_type: Option<String>,
    data: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<&'static str>,
}

#[derive(Deserialize, Default)]
struct Fragment {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    finish_reason: Option<String>,
    content: Option<CandidateContent>,
}

#[derive(Deserialize, Default)]
struct CandidateContent {
    parts: Option<Vec<ResponsePart>>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

// ---------------------------------------------------------------------------
//  Client
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct EnhanceClient {
    api_key: Option<String>,
    http: reqwest::blocking::Client,
}

impl EnhanceClient {
    pub fn new() -> Self {
        let http = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());
        Self {
            api_key: None,
            http,
        }
    }

    pub fn configure(&mut self, api_key: &str) {
        let trimmed = api_key.trim();
        self.api_key = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        };
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Run one enhancement request to completion. Blocking; call from a
    /// worker thread. Returns the enhanced image as a PNG data URL.
    pub fn enhance(&self, req: &EnhanceRequest) -> Result<String, EnhanceError> {
        let key = self.api_key.as_ref().ok_or(EnhanceError::NotConfigured)?;
        if req.scene_png.is_empty() {
            return Err(EnhanceError::MissingField("scene image"));
        }
        if req.video_context.trim().is_empty() {
            return Err(EnhanceError::MissingField("video context"));
        }
        let prompt = build_prompt(req)?;

        let payload = GenerateRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![
                    RequestPart {
                        text: Some(prompt),
                        inline_data: None,
                    },
                    RequestPart {
                        text: None,
                        inline_data: Some(InlineData {
                            mime_type: Some("image/png".to_string()),
                            data: Some(strip_data_url(&req.scene_png).to_string()),
                        }),
                    },
                ],
            }],
            generation_config: GenerationConfig {
                response_modalities: vec!["IMAGE", "TEXT"],
            },
        };

        let url = format!(
            "{}/{}:streamGenerateContent?key={}",
            ENDPOINT_BASE, MODEL, key
        );
        let response = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .map_err(|e| EnhanceError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            crate::log_err!("Enhance request failed: HTTP {} {}", status.as_u16(), message);
            return Err(EnhanceError::Api {
                status: status.as_u16(),
                message,
            });
        }

        // Without SSE the stream endpoint returns the fragments as one JSON
        // array, consumed here in arrival order.
        let fragments: Vec<Fragment> = response
            .json()
            .map_err(|e| EnhanceError::Transport(e.to_string()))?;

        let data = fold_fragments(&fragments)?;
        Ok(format!("data:image/png;base64,{}", data))
    }
}

impl Default for EnhanceClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Lucky mode gets the autonomous redesign brief; guided mode interpolates
/// the user's literal instruction. Both embed the video context and tell the
/// model to return only the image.
fn build_prompt(req: &EnhanceRequest) -> Result<String, EnhanceError> {
    if req.is_lucky {
        return Ok(format!(
            "You are an expert YouTube thumbnail designer. Take the following base image, \
             which is for a video about {}.\n\n\
             Objective: Enhance the provided YouTube thumbnail image to dramatically increase \
             its Click-Through Rate (CTR) while preserving its core design elements, text, and \
             overall layout. The goal is to make it look professional, highly engaging, and \
             visually \"pop\", as if meticulously refined by an expert graphic designer.\n\n\
             Instructions for Enhancement (Apply Subtly to Dramatically, as needed):\n\n\
             1. Preserve All Text and Key Elements: Absolutely do not remove or alter any \
             existing text, logos, or crucial graphic elements. Your task is to enhance them, \
             not replace them.\n\
             2. Subject Enhancement: If there is a main subject, make it stand out with \
             increased sharpness, a subtle glow or outline, and improved lighting.\n\
             3. Color & Contrast Refinement: Make the palette more vibrant without drastic hue \
             shifts, boost contrast for depth, and apply a professional color grade.\n\
             4. Lighting & Shadows: Enhance or introduce subtle dynamic lighting and refine \
             shadows to separate elements without obscuring details.\n\
             5. Background Integration: Keep the background supporting the foreground without \
             distracting from it.\n\
             6. Overall Polish & Impact: Aim for a clean but impactful aesthetic, optimized \
             for small-screen viewing.\n\n\
             Your primary directive is to elevate the existing design without altering its \
             fundamental structure or content. Think of yourself as a master retoucher, not a \
             re-designer.\n\n\
             Return only the final image.",
            req.video_context
        ));
    }

    let user_prompt = req
        .user_prompt
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or(EnhanceError::PromptRequired)?;
    Ok(format!(
        "You are an expert YouTube thumbnail designer. Take the following base image, which \
         is for a video about {}. Apply these instructions to transform it into a high-impact \
         thumbnail: {}. Return only the final image.",
        req.video_context, user_prompt
    ))
}

/// Drop a leading `data:image/png;base64,` style prefix if present.
fn strip_data_url(data_url: &str) -> &str {
    match data_url.split_once(',') {
        Some((head, body)) if head.starts_with("data:") => body,
        _ => data_url,
    }
}

/// Fold the fragment sequence into either base64 image data or the most
/// recent diagnostic. Stop reasons do not terminate the scan; a later image
/// fragment still wins.
fn fold_fragments(fragments: &[Fragment]) -> Result<String, EnhanceError> {
    let mut diagnostic: Option<EnhanceError> = None;

    for fragment in fragments {
        let Some(candidate) = fragment.candidates.as_ref().and_then(|c| c.first()) else {
            continue;
        };

        match candidate.finish_reason.as_deref() {
            Some("SAFETY") => {
                diagnostic = Some(EnhanceError::Blocked(StopReason::Safety));
                continue;
            }
            Some("RECITATION") => {
                diagnostic = Some(EnhanceError::Blocked(StopReason::Copyright));
                continue;
            }
            Some("MAX_TOKENS") => {
                diagnostic = Some(EnhanceError::Blocked(StopReason::TokenLimit));
                continue;
            }
            Some("OTHER") => {
                diagnostic = Some(EnhanceError::Blocked(StopReason::Unspecified));
                continue;
            }
            _ => {}
        }

        let Some(part) = candidate
            .content
            .as_ref()
            .and_then(|c| c.parts.as_ref())
            .and_then(|p| p.first())
        else {
            continue;
        };

        if let Some(data) = part.inline_data.as_ref().and_then(|d| d.data.as_deref()) {
            if !data.is_empty() {
                return Ok(data.to_string());
            }
        }

        if let Some(text) = part.text.as_deref() {
            if !text.is_empty() {
                diagnostic = Some(EnhanceError::NoImage(Some(text.to_string())));
            }
        }
    }

    Err(diagnostic.unwrap_or(EnhanceError::NoImage(None)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(lucky: bool, prompt: Option<&str>) -> EnhanceRequest {
        EnhanceRequest {
            scene_png: "data:image/png;base64,aGVsbG8=".to_string(),
            video_context: "a cooking tutorial".to_string(),
            user_prompt: prompt.map(String::from),
            is_lucky: lucky,
        }
    }

    fn image_fragment(data: &str) -> Fragment {
        Fragment {
            candidates: Some(vec![Candidate {
                finish_reason: None,
                content: Some(CandidateContent {
                    parts: Some(vec![ResponsePart {
                        text: None,
                        inline_data: Some(InlineData {
                            mime_type: Some("image/png".to_string()),
                            data: Some(data.to_string()),
                        }),
                    }]),
                }),
            }]),
        }
    }

    fn stop_fragment(reason: &str) -> Fragment {
        Fragment {
            candidates: Some(vec![Candidate {
                finish_reason: Some(reason.to_string()),
                content: None,
            }]),
        }
    }

    fn text_fragment(text: &str) -> Fragment {
        Fragment {
            candidates: Some(vec![Candidate {
                finish_reason: None,
                content: Some(CandidateContent {
                    parts: Some(vec![ResponsePart {
                        text: Some(text.to_string()),
                        inline_data: None,
                    }]),
                }),
            }]),
        }
    }

    #[test]
    fn unconfigured_client_fails_before_network() {
        let client = EnhanceClient::new();
        assert_eq!(
            client.enhance(&req(true, None)),
            Err(EnhanceError::NotConfigured)
        );
    }

    #[test]
    fn validation_rejects_missing_inputs() {
        let mut client = EnhanceClient::new();
        client.configure("key");

        let mut r = req(true, None);
        r.scene_png = String::new();
        assert_eq!(
            client.enhance(&r),
            Err(EnhanceError::MissingField("scene image"))
        );

        let mut r = req(true, None);
        r.video_context = "  ".to_string();
        assert_eq!(
            client.enhance(&r),
            Err(EnhanceError::MissingField("video context"))
        );
    }

    #[test]
    fn guided_mode_requires_a_prompt() {
        assert_eq!(
            build_prompt(&req(false, None)),
            Err(EnhanceError::PromptRequired)
        );
        assert_eq!(
            build_prompt(&req(false, Some("   "))),
            Err(EnhanceError::PromptRequired)
        );
        // Lucky mode never needs one.
        assert!(build_prompt(&req(true, None)).is_ok());
    }

    #[test]
    fn prompt_templates_embed_context_and_instruction() {
        let lucky = build_prompt(&req(true, None)).unwrap();
        assert!(lucky.contains("a cooking tutorial"));
        assert!(lucky.contains("Click-Through Rate"));

        let guided = build_prompt(&req(false, Some("add neon glow"))).unwrap();
        assert!(guided.contains("a cooking tutorial"));
        assert!(guided.contains("add neon glow"));
        assert!(!guided.contains("Click-Through Rate"));
    }

    #[test]
    fn strip_data_url_handles_both_shapes() {
        assert_eq!(strip_data_url("data:image/png;base64,QUJD"), "QUJD");
        assert_eq!(strip_data_url("QUJD"), "QUJD");
    }

    #[test]
    fn first_nonempty_image_wins() {
        let frags = vec![
            text_fragment("working on it"),
            image_fragment("SU1BR0Ux"),
            image_fragment("SU1BR0Uy"),
        ];
        assert_eq!(fold_fragments(&frags).unwrap(), "SU1BR0Ux");
    }

    #[test]
    fn stop_reason_is_advisory_when_an_image_follows() {
        let frags = vec![stop_fragment("SAFETY"), image_fragment("SU1BR0U=")];
        assert_eq!(fold_fragments(&frags).unwrap(), "SU1BR0U=");
    }

    #[test]
    fn exhausted_stream_reports_most_recent_diagnostic() {
        let frags = vec![stop_fragment("SAFETY"), stop_fragment("RECITATION")];
        assert_eq!(
            fold_fragments(&frags),
            Err(EnhanceError::Blocked(StopReason::Copyright))
        );

        let frags = vec![text_fragment("cannot comply")];
        assert_eq!(
            fold_fragments(&frags),
            Err(EnhanceError::NoImage(Some("cannot comply".to_string())))
        );

        assert_eq!(fold_fragments(&[]), Err(EnhanceError::NoImage(None)));
    }

    #[test]
    fn token_limit_and_other_map_to_distinct_failures() {
        assert_eq!(
            fold_fragments(&[stop_fragment("MAX_TOKENS")]),
            Err(EnhanceError::Blocked(StopReason::TokenLimit))
        );
        assert_eq!(
            fold_fragments(&[stop_fragment("OTHER")]),
            Err(EnhanceError::Blocked(StopReason::Unspecified))
        );
    }

    #[test]
    fn empty_inline_data_does_not_count_as_an_image() {
        let frags = vec![image_fragment(""), text_fragment("nothing yet")];
        assert_eq!(
            fold_fragments(&frags),
            Err(EnhanceError::NoImage(Some("nothing yet".to_string())))
        );
    }
}
