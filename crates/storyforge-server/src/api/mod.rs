// ABOUTME: API handler modules for the storyforge HTTP server.
// ABOUTME: optimize handles single stories; tracker drives the batch run over the issue tracker.

pub mod optimize;
pub mod tracker;
