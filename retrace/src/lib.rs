// Client side of Retrace: change tree, selection and batched restore

pub mod dbus_client;
pub mod orchestrator;
pub mod selection;
pub mod tree;

pub use dbus_client::HelperClient;
pub use orchestrator::{
    CancelToken, RestoreEvent, RestoreOrchestrator, RestoreSession, RestoreSummary, RestoreTarget,
    RestoreTransport,
};
pub use selection::SelectionModel;
pub use tree::{ChangeSetTree, NodeId, TreeError, TreeNode};
