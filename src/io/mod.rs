pub mod report;

pub use report::{ReportLink, ReportWriter};
