//! End-to-end test support for Tessera
//!
//! - `harness`: an in-process server plus scripted clients
//! - `mocks`: fixture tools, resources and prompts

pub mod harness;

pub use harness::{TestClient, TestHarness};
pub use mocks::fixtures;
