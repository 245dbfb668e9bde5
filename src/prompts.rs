//! Prompts for the page-summary stage.
//!
//! Every prompt lives here so that wording changes touch exactly one place
//! and tests can inspect prompts without a live model.

/// System prompt for summarising one page image.
pub const SUMMARY_SYSTEM_PROMPT: &str = r#"You read photographed or screenshotted book pages and write short, factual summaries of them.

Rules:
- Read only the text visible in the image
- Ignore page numbers, running headers and footers
- Never invent content that is not on the page
- Output only the summary, with no introduction or closing remarks"#;

/// Per-page instruction sent together with the page image.
///
/// `language` is the natural-language name the summary is written in
/// (for example `Japanese` or `English`).
pub fn summary_request(page_number: usize, language: &str) -> String {
    format!(
        "This image is page {page_number} of a book. Read the text in the image and summarise it as bullet points.

Requirements:
- 3 to 5 bullet points, each an independent unit of meaning
- Only content that is complete within this page
- Leave out sentences that are cut off at the start or end of the page
- Only the important points
- Keep each point concise (about 50 to 100 characters)
- Write the summary in {language}
- Optimise the wording for retrieval (RAG) use

Output format:
- first point
- second point
- third point

Output only the bullet lines, each starting with \"- \"."
    )
}

/// Natural-language name for a Tesseract language tag, used in prompts.
pub fn language_name(tag: &str) -> &'static str {
    match tag.split('+').next().unwrap_or("").trim() {
        t if t.starts_with("jpn") => "Japanese",
        "chi_sim" | "chi_tra" | "chi_sim_vert" | "chi_tra_vert" => "Chinese",
        "kor" | "kor_vert" => "Korean",
        "fra" => "French",
        "deu" => "German",
        "spa" => "Spanish",
        _ => "English",
    }
}

/// Text placed in the document when a page could not be summarised.
pub fn summary_failed_placeholder(page_number: usize, detail: &str) -> String {
    format!("(Summary of page {page_number} could not be generated: {detail})")
}
