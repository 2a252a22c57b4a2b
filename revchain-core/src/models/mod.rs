mod history;
mod operation;
mod plan;
mod report;
mod revision;

pub use history::*;
pub use operation::*;
pub use plan::*;
pub use report::*;
pub use revision::*;
