//! Processing stages applied to a captured session.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own and swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//!                 ┌─▶ transcribe ──────────────┐
//! page images ────┤   (cache → OCR → normalise)├──▶ document ──▶ upload
//!                 └─▶ encode ──▶ summarize ────┘
//!                     (base64)   (vision model)
//! ```
//!
//! 1. [`transcribe`]: cache lookup, recognition on a miss, normalisation
//! 2. [`encode`]    : PNG-encode and base64-wrap a page image for the model
//! 3. [`summarize`] : one vision-model call per page with retry/backoff
//! 4. [`upload`]    : publish the assembled document; the only stage that
//!    needs stored credentials

pub mod encode;
pub mod summarize;
pub mod transcribe;
pub mod upload;
