//! Default collaborator implementations

pub mod acoustid_client;
pub mod file_analyzer;
pub mod file_scanner;
pub mod fingerprinter;
pub mod metadata_extractor;
pub mod submission_log;

pub use acoustid_client::AcoustIdClient;
pub use file_analyzer::FileAnalyzer;
pub use file_scanner::FileScanner;
pub use fingerprinter::Fingerprinter;
pub use metadata_extractor::MetadataExtractor;
pub use submission_log::SubmissionLog;
