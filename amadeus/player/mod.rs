pub mod controller;
pub mod gst_logic;
pub mod state;
pub mod transport;

pub use controller::{Action, Controller};
pub use gst_logic::GstEngine;
pub use transport::{FileFilter, Notifier};
