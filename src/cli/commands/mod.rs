//! CLI command implementations

pub mod build;
pub mod create;
pub mod fetch;
pub mod package;
pub mod populate;
pub mod publish;
pub mod versions;

pub use build::execute as build;
pub use create::execute as create;
pub use fetch::execute as fetch;
pub use package::execute as package;
pub use populate::execute as populate;
pub use publish::execute as publish;
pub use versions::execute as versions;
