mod client;

pub use client::{TestClient, TestHarness};
