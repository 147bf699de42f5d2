//! System Instructions
//!
//! Static policy text, kept under `prompts/` and embedded at build time.

/// General operational assistant
pub const GENERAL: &str = include_str!("../prompts/general.md");

/// Category taxonomy and response envelope for screening
pub const SCREENING: &str = include_str!("../prompts/screening.md");

/// Directory listing assistant
pub const LIST_FILES: &str = include_str!("../prompts/list_files.md");

/// Instructions for an execution round offering `capability_names`
pub fn for_capabilities<S: AsRef<str>>(capability_names: &[S]) -> &'static str {
    match capability_names {
        [only] if only.as_ref() == "list_files" => LIST_FILES,
        _ => GENERAL,
    }
}
