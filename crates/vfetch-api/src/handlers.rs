//! Request handlers.

pub mod download;
pub mod health;
pub mod jobs;
pub mod scene_detection;
pub mod search;

pub use download::*;
pub use health::*;
pub use jobs::*;
pub use scene_detection::*;
pub use search::*;
