//! SafeStory engine: branching safety-education stories.
//!
//! Repairs loosely structured, model-generated story trees into canonical
//! story graphs with exactly one decision point, then drives a learner
//! through them one slide at a time, classifying how the story ended.

pub mod core;
pub mod schema;
