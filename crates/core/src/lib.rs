pub mod config;
pub mod domain;
pub mod errors;

pub use domain::conversation::{ContentPart, ConversationHistory, MessageItem, Role};
pub use domain::workflow::{WorkflowInput, WorkflowResult};
pub use errors::{InterfaceError, WorkflowError};
