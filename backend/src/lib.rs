//! Host process of the Alva designer: the message router, the bridge to
//! the UI and the websocket transport carrying it.

pub mod collaborators;
pub mod config;
pub mod dialogs;
pub mod pipeline;
pub mod router;
pub mod sender;
pub mod server;

pub use router::{Collaborators, Router, RouterSettings};
pub use sender::{Sender, SenderError};
