//! Cross-module tests: pipeline scenarios, retrieval over a real index and
//! corpus import.

mod fakes;
mod pipeline_scenarios;
