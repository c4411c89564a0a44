pub mod credential;
pub mod export_report;
pub mod generate_reports;
pub mod pdf_extract;
pub mod review;
pub mod types;

pub use credential::CredentialTask;
pub use export_report::{ExportReportTask, ExportSettings};
pub use generate_reports::GenerateReportsTask;
pub use pdf_extract::PdfExtractTask;
pub use review::ReviewTask;

pub use types::session_keys;
