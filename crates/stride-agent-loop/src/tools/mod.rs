//! Built-in protocol tools: terminate, form input, error reporting.

pub mod error_report;
pub mod form_input;
pub mod terminate;

pub use error_report::{
    ErrorReportTool, SystemErrorReportTool, ERROR_REPORT_TOOL_NAME, SYSTEM_ERROR_REPORT_TOOL_NAME,
};
pub use form_input::{FormInputTool, FORM_INPUT_TOOL_NAME};
pub use terminate::{TerminateTool, TERMINATE_TOOL_NAME};
