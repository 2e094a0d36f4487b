pub mod executor;
pub mod read_files;
pub mod registry;
pub mod run_command;
pub mod schema;
pub mod write_files;

pub use executor::ToolExecutor;
pub use read_files::ReadFilesTool;
pub use registry::{Tool, ToolContext, ToolOutcome, ToolRegistry};
pub use run_command::RunCommandTool;
pub use schema::{args_schema, ReadFilesArgs, RunCommandArgs, WriteFilesArgs};
pub use write_files::WriteFilesTool;
