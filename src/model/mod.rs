//! Model invocation paths that do not go through the full agent CLI:
//! lightweight classification endpoints and the structured generation
//! path.

pub mod json_extract;
pub mod light;
pub mod structured;

pub use json_extract::{extract_json, extract_json_array, extract_json_object};
pub use light::{
    ChatReply, ChatRequest, IntentResponse, LightModel, PublishInfo, SkillsResponse,
};
pub use structured::{
    GEMINI_MODEL, GenerationPlan, MAX_IMAGES, PlannedFile, PlannedImage, fetch_plan, parse_plan,
};
