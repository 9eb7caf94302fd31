mod controller;
mod host;
mod message;
mod picker;
mod tree;
mod workspace;

pub use controller::{NavigationController, NavigationOptions};
pub use host::{DiffRequest, Host, NoticeLevel, PickItem, Sidebar, ViewKind};
pub use message::{Inbound, Outbound, Selection};
pub use tree::{build_tree, TreeNode};
