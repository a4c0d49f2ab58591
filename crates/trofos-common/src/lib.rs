//! Domain types shared by the Trofos tracker, plus the burndown derivation.
//!
//! Nothing here touches storage or the network.

pub mod burndown;
pub mod models;

pub use burndown::{Burndown, StoryPointSample};
