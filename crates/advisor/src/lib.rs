pub mod gemini;
pub mod service;

pub use gemini::{parse_analysis, GeminiAdvisor};
pub use service::{AdvisoryReport, AdvisoryService};
